//! Reply text for the chat front-end.

use std::collections::BTreeMap;

use crate::{catalog::Product, ledger::TransactionRecord};

/// Currency prefix used for every amount shown to users.
pub const CURRENCY_PREFIX: &str = "Rp";

/// `Rp100000` — plain integer, no grouping, as users type amounts back.
pub fn format_amount(amount: u64) -> String {
    format!("{CURRENCY_PREFIX}{amount}")
}

pub fn help_text() -> String {
    "🌟 Selamat datang di Bot PT Putra Bungsu! 🌟\n\n\
Kami siap membantu Anda dengan transaksi pulsa dengan mudah.\n\n\
🔑 Login:\n\
/login <username> <password>\n\
Contoh: /login markaz 123456\n\n\
💰 Cek Saldo:\n\
/balance <username>\n\n\
🎟 Top-up:\n\
/topup <token>\n\n\
💸 Transaksi:\n\
<produk>.<nomor>.<pin>\n\
Contoh: dana10.081234567890.123456\n\n\
🛒 Cek Produk:\n\
/products\n\n\
🚪 Logout:\n\
/logout"
        .to_string()
}

pub fn product_list(products: &[Product]) -> String {
    let mut out = String::from("Available products:\n");
    for p in products {
        out.push_str(&format!("{} - {} - {}\n", p.code, p.name, format_amount(p.price)));
    }
    out
}

pub fn balance_report(balances: &BTreeMap<String, u64>) -> String {
    if balances.is_empty() {
        return "No accounts.".to_string();
    }
    let mut out = String::from("Balance report:\n");
    for (user, balance) in balances {
        out.push_str(&format!("{user}: {}\n", format_amount(*balance)));
    }
    out
}

pub fn transaction_report(history: &[TransactionRecord]) -> String {
    if history.is_empty() {
        return "No transactions yet.".to_string();
    }
    let mut out = String::from("Transaction report:\n");
    for r in history {
        out.push_str(&format!(
            "#{} {} {} {} {} ({}) → {}\n",
            r.seq,
            r.at.format("%Y-%m-%d %H:%M:%S"),
            r.actor,
            r.kind,
            format_amount(r.amount),
            r.memo,
            format_amount(r.balance_after),
        ));
    }
    out
}

/// Mask all but the last four characters (PINs, phone numbers in admin notices).
pub fn mask_tail(s: &str) -> String {
    let len = s.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let visible: String = s.chars().skip(len - 4).collect();
    format!("{}{visible}", "*".repeat(len - 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn amount_has_prefix_and_no_grouping() {
        assert_eq!(format_amount(100_000), "Rp100000");
        assert_eq!(format_amount(0), "Rp0");
    }

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_tail("081234567890"), "********7890");
        assert_eq!(mask_tail("123"), "***");
    }

    #[test]
    fn transaction_report_lists_records_in_order() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let history = vec![
            TransactionRecord {
                seq: 1,
                actor: "markaz".to_string(),
                kind: TransactionKind::Credit,
                amount: 5_000,
                balance_after: 105_000,
                memo: "top-up".to_string(),
                at,
            },
            TransactionRecord {
                seq: 2,
                actor: "markaz".to_string(),
                kind: TransactionKind::Debit,
                amount: 10_000,
                balance_after: 95_000,
                memo: "purchase dana10".to_string(),
                at,
            },
        ];
        let report = transaction_report(&history);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "Transaction report:");
        assert_eq!(
            lines[1],
            "#1 2026-01-02 03:04:05 markaz credit Rp5000 (top-up) → Rp105000"
        );
        assert!(lines[2].starts_with("#2 ") && lines[2].contains("debit Rp10000"));
    }

    #[test]
    fn empty_reports() {
        assert_eq!(transaction_report(&[]), "No transactions yet.");
        assert_eq!(balance_report(&BTreeMap::new()), "No accounts.");
    }
}
