//! In-memory balance ledger with an append-only transaction history.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Credit => f.write_str("credit"),
            TransactionKind::Debit => f.write_str("debit"),
        }
    }
}

/// One balance mutation. Records are never edited or removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    pub seq: u64,
    pub actor: String,
    pub kind: TransactionKind,
    pub amount: u64,
    pub balance_after: u64,
    pub memo: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, u64>,
    history: Vec<TransactionRecord>,
}

impl LedgerState {
    fn append(
        &mut self,
        actor: &str,
        kind: TransactionKind,
        amount: u64,
        balance_after: u64,
        memo: &str,
    ) {
        let seq = self.history.len() as u64 + 1;
        self.history.push(TransactionRecord {
            seq,
            actor: actor.to_string(),
            kind,
            amount,
            balance_after,
            memo: memo.to_string(),
            at: Utc::now(),
        });
    }
}

/// Balances keyed by username.
///
/// Each mutation updates the balance and appends its record under one lock, so the
/// history always has exactly one entry per change.
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Build a ledger from `(username, opening balance)` pairs. Opening balances are not
    /// transactions and produce no history.
    pub fn new(opening: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                balances: opening.into_iter().collect(),
                history: Vec::new(),
            }),
        }
    }

    pub async fn credit(&self, identity: &str, amount: u64, memo: &str) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        let mut st = self.state.lock().await;
        let balance = st
            .balances
            .get_mut(identity)
            .ok_or_else(|| Error::UnknownUser(identity.to_string()))?;
        let next = balance
            .checked_add(amount)
            .ok_or_else(|| Error::External(format!("balance overflow for {identity}")))?;
        *balance = next;
        st.append(identity, TransactionKind::Credit, amount, next, memo);
        tracing::info!(user = identity, amount, balance = next, "ledger credit");
        Ok(next)
    }

    pub async fn debit(&self, identity: &str, amount: u64, memo: &str) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        let mut st = self.state.lock().await;
        let balance = st
            .balances
            .get_mut(identity)
            .ok_or_else(|| Error::UnknownUser(identity.to_string()))?;
        if *balance < amount {
            return Err(Error::InsufficientFunds {
                balance: *balance,
                required: amount,
            });
        }
        *balance -= amount;
        let next = *balance;
        st.append(identity, TransactionKind::Debit, amount, next, memo);
        tracing::info!(user = identity, amount, balance = next, "ledger debit");
        Ok(next)
    }

    pub async fn balance_of(&self, identity: &str) -> Result<u64> {
        self.state
            .lock()
            .await
            .balances
            .get(identity)
            .copied()
            .ok_or_else(|| Error::UnknownUser(identity.to_string()))
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.state.lock().await.balances.contains_key(identity)
    }

    /// Snapshot of every balance, ordered by username.
    pub async fn balances(&self) -> BTreeMap<String, u64> {
        self.state
            .lock()
            .await
            .balances
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Snapshot of the full history in insertion (chronological) order.
    pub async fn history(&self) -> Vec<TransactionRecord> {
        self.state.lock().await.history.clone()
    }
}
