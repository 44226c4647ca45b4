//! Chat command grammar and dispatch.
//!
//! Every inbound text is parsed independently into a [`Command`] and executed against
//! the ledger, token issuer and session registry. Dispatch always yields a reply; errors
//! never escape this module.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::{
    accounts::AccountBook,
    catalog::Catalog,
    domain::{ChatId, Role},
    errors::Error,
    formatting::{
        balance_report, format_amount, help_text, mask_tail, product_list, transaction_report,
    },
    ledger::Ledger,
    messaging::port::MessagingPort,
    session::SessionRegistry,
    tokens::TokenIssuer,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Login { username: String, password: String },
    Logout,
    Balance { username: String },
    AdminLogin { admin_id: String, password: String },
    AdminLogout,
    ViewBalanceReport,
    ViewTransactionReport,
    Products,
    CreateToken { username: String, amount: i64 },
    TopUp { token: String },
    Purchase { product: String, destination: String, pin: String },
}

fn purchase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:transaksi:\s*)?([^.\s]+)\.([^.\s]+)\.([^.\s]+)$")
            .expect("valid regex")
    })
}

/// Parse one chat message.
///
/// Command names are case-insensitive and may carry a `@botname` suffix (group chats).
pub fn parse_command(text: &str) -> Result<Command> {
    let text = text.trim();

    if !text.starts_with('/') {
        let caps = purchase_re().captures(text).ok_or(Error::InvalidCommand)?;
        return Ok(Command::Purchase {
            product: caps[1].to_string(),
            destination: caps[2].to_string(),
            pin: caps[3].to_string(),
        });
    }

    let mut parts = text.split_whitespace();
    let head = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();
    let name = head
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    let expect = |n: usize, usage: &'static str| {
        if args.len() == n {
            Ok(())
        } else {
            Err(Error::Usage(usage))
        }
    };

    let cmd = match name.as_str() {
        "start" | "help" => Command::Start,
        "login" => {
            expect(2, "/login <username> <password>")?;
            Command::Login {
                username: args[0].to_string(),
                password: args[1].to_string(),
            }
        }
        "logout" => {
            expect(0, "/logout")?;
            Command::Logout
        }
        "balance" => {
            expect(1, "/balance <username>")?;
            Command::Balance {
                username: args[0].to_string(),
            }
        }
        "adminlogin" => {
            expect(2, "/adminLogin <adminId> <password>")?;
            Command::AdminLogin {
                admin_id: args[0].to_string(),
                password: args[1].to_string(),
            }
        }
        "adminlogout" => {
            expect(0, "/adminLogout")?;
            Command::AdminLogout
        }
        "viewbalancereport" => {
            expect(0, "/viewBalanceReport")?;
            Command::ViewBalanceReport
        }
        "viewtransactionreport" => {
            expect(0, "/viewTransactionReport")?;
            Command::ViewTransactionReport
        }
        "products" => {
            expect(0, "/products")?;
            Command::Products
        }
        "createtoken" => {
            const USAGE: &str = "/createToken <username> <amount>";
            expect(2, USAGE)?;
            let amount = args[1].parse::<i64>().map_err(|_| Error::Usage(USAGE))?;
            Command::CreateToken {
                username: args[0].to_string(),
                amount,
            }
        }
        "topup" => {
            expect(1, "/topup <token>")?;
            Command::TopUp {
                token: args[0].to_lowercase(),
            }
        }
        _ => return Err(Error::InvalidCommand),
    };
    Ok(cmd)
}

/// Executes parsed commands against the relay services.
pub struct Dispatcher {
    accounts: Arc<AccountBook>,
    ledger: Arc<Ledger>,
    tokens: Arc<TokenIssuer>,
    sessions: Arc<SessionRegistry>,
    catalog: Arc<Catalog>,
    messenger: Arc<dyn MessagingPort>,
}

impl Dispatcher {
    pub fn new(
        accounts: Arc<AccountBook>,
        ledger: Arc<Ledger>,
        tokens: Arc<TokenIssuer>,
        sessions: Arc<SessionRegistry>,
        catalog: Arc<Catalog>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            tokens,
            sessions,
            catalog,
            messenger,
        }
    }

    /// Handle one inbound message and produce the reply text.
    pub async fn dispatch(&self, chat_id: ChatId, text: &str) -> String {
        let outcome = match parse_command(text) {
            Ok(cmd) => self.execute(chat_id, cmd).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(reply) => reply,
            Err(e) => render_error(chat_id, &e),
        }
    }

    pub async fn execute(&self, chat_id: ChatId, cmd: Command) -> Result<String> {
        match cmd {
            Command::Start => Ok(help_text()),

            Command::Login { username, password } => {
                self.sessions
                    .login(chat_id, &username, &password, Role::User)
                    .await?;
                Ok(format!("Logged in as {username}."))
            }

            Command::Logout => {
                let info = self.sessions.logout_as(chat_id, Role::User).await?;
                Ok(format!("Logged out {}.", info.identity))
            }

            // Public lookup: any chat may query any username.
            Command::Balance { username } => {
                let balance = self.ledger.balance_of(&username).await?;
                Ok(format!(
                    "The balance for {username} is {}.",
                    format_amount(balance)
                ))
            }

            Command::AdminLogin { admin_id, password } => {
                self.sessions
                    .login(chat_id, &admin_id, &password, Role::Admin)
                    .await?;
                Ok(format!("Admin {admin_id} logged in."))
            }

            Command::AdminLogout => {
                let info = self
                    .sessions
                    .logout_as(chat_id, Role::Admin)
                    .await
                    .map_err(|_| Error::PermissionDenied)?;
                Ok(format!("Admin {} logged out.", info.identity))
            }

            Command::ViewBalanceReport => {
                self.require_admin(chat_id).await?;
                Ok(balance_report(&self.ledger.balances().await))
            }

            Command::ViewTransactionReport => {
                self.require_admin(chat_id).await?;
                Ok(transaction_report(&self.ledger.history().await))
            }

            Command::Products => Ok(product_list(self.catalog.products())),

            Command::CreateToken { username, amount } => {
                let admin = self.require_admin(chat_id).await?;
                let token = self.tokens.issue(&username, amount).await?;
                tracing::info!(admin = %admin, user = %username, amount, "admin issued top-up token");
                Ok(format!(
                    "Top-up token for {username} ({}):\n{token}\nRedeem with /topup <token> within the validity window.",
                    format_amount(amount.unsigned_abs())
                ))
            }

            Command::TopUp { token } => {
                self.require_user(chat_id).await?;
                let receipt = self.tokens.redeem(&token).await?;
                self.notify_admins(&format!(
                    "🎟 {} redeemed a top-up of {}. Balance: {}.",
                    receipt.identity,
                    format_amount(receipt.amount),
                    format_amount(receipt.balance)
                ))
                .await;
                Ok(format!(
                    "Top-up successful. Added {} to {}. New balance: {}.",
                    format_amount(receipt.amount),
                    receipt.identity,
                    format_amount(receipt.balance)
                ))
            }

            Command::Purchase {
                product,
                destination,
                pin: _,
            } => {
                let user = self.require_user(chat_id).await?;
                let item = self
                    .catalog
                    .get(&product)
                    .ok_or_else(|| Error::UnknownProduct(product.clone()))?;
                let masked = mask_tail(&destination);
                let memo = format!("purchase {} -> {masked}", item.code);
                let balance = self.ledger.debit(&user, item.price, &memo).await?;

                self.notify_admins(&format!(
                    "🧾 {user} bought {} for {masked} ({}). Balance: {}.",
                    item.code,
                    format_amount(item.price),
                    format_amount(balance)
                ))
                .await;
                Ok(format!(
                    "Purchase {} for {destination} successful. Charged {}. Remaining balance: {}.",
                    item.name,
                    format_amount(item.price),
                    format_amount(balance)
                ))
            }
        }
    }

    async fn require_admin(&self, chat_id: ChatId) -> Result<String> {
        self.sessions
            .require(chat_id, Role::Admin)
            .await
            .map(|s| s.identity)
            .map_err(|_| Error::PermissionDenied)
    }

    async fn require_user(&self, chat_id: ChatId) -> Result<String> {
        self.sessions
            .require(chat_id, Role::User)
            .await
            .map(|s| s.identity)
            .map_err(|_| Error::NotLoggedIn)
    }

    async fn notify_admins(&self, text: &str) {
        for chat in self.accounts.admin_chats() {
            if let Err(e) = self.messenger.send_text(chat, text).await {
                tracing::warn!(chat_id = %chat, error = %e, "admin notification failed");
            }
        }
    }
}

fn render_error(chat_id: ChatId, e: &Error) -> String {
    match e {
        Error::UnknownUser(_) => "User not found.".to_string(),
        Error::InvalidAmount => "Amount must be a positive number.".to_string(),
        Error::InsufficientFunds { balance, required } => format!(
            "Insufficient balance: {} available, {} required.",
            format_amount(*balance),
            format_amount(*required)
        ),
        Error::InvalidToken => "Invalid token.".to_string(),
        Error::TokenAlreadyUsed => "Token has already been used.".to_string(),
        Error::TokenExpired => "Token has expired.".to_string(),
        Error::InvalidCredentials => "Invalid username or password.".to_string(),
        Error::AlreadyLoggedIn => "You are already logged in.".to_string(),
        Error::NotLoggedIn => {
            "You are not logged in. Use /login <username> <password>.".to_string()
        }
        Error::PermissionDenied => "This command requires an admin login.".to_string(),
        Error::UnknownProduct(code) => {
            format!("Unknown product: {code}. Use /products to see the list.")
        }
        Error::InvalidCommand => "Invalid command.".to_string(),
        Error::Usage(usage) => format!("Usage: {usage}"),
        other => {
            tracing::error!(%chat_id, error = %other, "command failed");
            "Something went wrong. Please try again later.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{AdminAccount, UserAccount};
    use crate::bridge::{BridgeConnector, BridgeEvent};
    use crate::ledger::TransactionKind;
    use crate::test_support::{wait_until, FakeMessenger, FakeTransport};
    use crate::tokens::DEFAULT_TOKEN_TTL;

    const USER_CHAT: ChatId = ChatId(100);
    const ADMIN_CHAT: ChatId = ChatId(200);
    const ADMIN_NOTIFY: ChatId = ChatId(900);

    struct Harness {
        dispatcher: Dispatcher,
        ledger: Arc<Ledger>,
        messenger: Arc<FakeMessenger>,
        transport: Arc<FakeTransport>,
    }

    impl Harness {
        async fn send(&self, chat_id: ChatId, text: &str) -> String {
            self.dispatcher.dispatch(chat_id, text).await
        }
    }

    fn harness() -> Harness {
        let accounts = Arc::new(AccountBook::new(
            vec![
                UserAccount {
                    username: "markaz".to_string(),
                    password: "123456".to_string(),
                    jabber_jid: "markaz@xmpp.cz".to_string(),
                    jabber_password: "jpass".to_string(),
                    opening_balance: 100_000,
                },
                UserAccount {
                    username: "admin".to_string(),
                    password: "adminpw".to_string(),
                    jabber_jid: "admin@xmpp.cz".to_string(),
                    jabber_password: "jpass2".to_string(),
                    opening_balance: 50_000,
                },
            ],
            vec![AdminAccount {
                admin_id: "udin123".to_string(),
                password: "root".to_string(),
                notify_chat: ADMIN_NOTIFY,
            }],
        ));
        let ledger = Arc::new(Ledger::new(accounts.opening_balances()));
        let tokens = Arc::new(TokenIssuer::new(ledger.clone(), DEFAULT_TOKEN_TTL));
        let messenger = Arc::new(FakeMessenger::default());
        let transport = Arc::new(FakeTransport::default());
        let connector = Arc::new(BridgeConnector::new(
            transport.clone(),
            messenger.clone(),
            "xmpp.cz",
            5222,
        ));
        let sessions = Arc::new(SessionRegistry::new(accounts.clone(), connector));
        let dispatcher = Dispatcher::new(
            accounts,
            ledger.clone(),
            tokens,
            sessions,
            Arc::new(Catalog::default()),
            messenger.clone(),
        );
        Harness {
            dispatcher,
            ledger,
            messenger,
            transport,
        }
    }

    #[test]
    fn parses_fixed_grammar() {
        assert_eq!(parse_command("/start").unwrap(), Command::Start);
        assert_eq!(
            parse_command("/login markaz 123456").unwrap(),
            Command::Login {
                username: "markaz".to_string(),
                password: "123456".to_string()
            }
        );
        assert_eq!(
            parse_command("/adminLogin@PutraBot udin123 root").unwrap(),
            Command::AdminLogin {
                admin_id: "udin123".to_string(),
                password: "root".to_string()
            }
        );
        assert_eq!(
            parse_command("  /viewTransactionReport ").unwrap(),
            Command::ViewTransactionReport
        );
        assert_eq!(
            parse_command("dana10.081234567890.1234").unwrap(),
            Command::Purchase {
                product: "dana10".to_string(),
                destination: "081234567890".to_string(),
                pin: "1234".to_string()
            }
        );
        assert_eq!(
            parse_command("Transaksi: dana20.0812.99").unwrap(),
            Command::Purchase {
                product: "dana20".to_string(),
                destination: "0812".to_string(),
                pin: "99".to_string()
            }
        );
    }

    #[test]
    fn argument_mismatches_are_usage_errors() {
        assert!(matches!(
            parse_command("/login markaz"),
            Err(Error::Usage("/login <username> <password>"))
        ));
        assert!(matches!(
            parse_command("/balance"),
            Err(Error::Usage("/balance <username>"))
        ));
        assert!(matches!(
            parse_command("/logout now"),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            parse_command("/createToken markaz lots"),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn unknown_input_is_invalid_command() {
        for text in ["/register a b c d", "hello there", "dana10.0812", "a.b.c.d", ""] {
            assert!(
                matches!(parse_command(text), Err(Error::InvalidCommand)),
                "{text:?}"
            );
        }
    }

    #[tokio::test]
    async fn balance_lookup_is_public_and_formatted() {
        let h = harness();
        assert_eq!(
            h.send(ChatId(1), "/balance markaz").await,
            "The balance for markaz is Rp100000."
        );
        assert_eq!(h.send(ChatId(1), "/balance nobody").await, "User not found.");
        assert_eq!(
            h.send(ChatId(1), "/balance").await,
            "Usage: /balance <username>"
        );
    }

    #[tokio::test]
    async fn purchase_debits_price_and_records_once() {
        let h = harness();
        assert_eq!(
            h.send(USER_CHAT, "dana10.081234567890.1234").await,
            "You are not logged in. Use /login <username> <password>."
        );

        assert_eq!(
            h.send(USER_CHAT, "/login markaz 123456").await,
            "Logged in as markaz."
        );
        let reply = h.send(USER_CHAT, "dana10.081234567890.1234").await;
        assert!(reply.contains("Remaining balance: Rp90000"), "{reply}");
        assert_eq!(h.ledger.balance_of("markaz").await.unwrap(), 90_000);

        let history = h.ledger.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Debit);
        assert_eq!(history[0].amount, 10_000);
        assert!(!history[0].memo.contains("1234567890"));

        let notices = h.messenger.sent_to(ADMIN_NOTIFY);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("markaz bought dana10"), "{}", notices[0]);
    }

    #[tokio::test]
    async fn unknown_product_leaves_balance_unchanged() {
        let h = harness();
        h.send(USER_CHAT, "/login markaz 123456").await;
        assert_eq!(
            h.send(USER_CHAT, "foo99.0812.1").await,
            "Unknown product: foo99. Use /products to see the list."
        );
        assert_eq!(h.ledger.balance_of("markaz").await.unwrap(), 100_000);
        assert!(h.ledger.history().await.is_empty());
    }

    #[tokio::test]
    async fn purchase_beyond_balance_is_rejected() {
        let h = harness();
        h.send(USER_CHAT, "/login admin adminpw").await;
        assert_eq!(
            h.send(USER_CHAT, "dana100.0812.1").await,
            "Insufficient balance: Rp50000 available, Rp100000 required."
        );
        assert_eq!(h.ledger.balance_of("admin").await.unwrap(), 50_000);
        assert!(h.ledger.history().await.is_empty());
    }

    #[tokio::test]
    async fn token_scenario_end_to_end() {
        let h = harness();

        assert_eq!(
            h.send(ADMIN_CHAT, "/createToken markaz 5000").await,
            "This command requires an admin login."
        );
        assert_eq!(
            h.send(ADMIN_CHAT, "/adminLogin udin123 root").await,
            "Admin udin123 logged in."
        );
        let reply = h.send(ADMIN_CHAT, "/createToken markaz 5000").await;
        let token = reply
            .lines()
            .nth(1)
            .expect("token line")
            .trim()
            .to_string();
        assert_eq!(token.len(), 32);

        assert_eq!(
            h.send(ADMIN_CHAT, "/createToken markaz 0").await,
            "Amount must be a positive number."
        );
        assert_eq!(
            h.send(ADMIN_CHAT, "/createToken ghost 10").await,
            "User not found."
        );

        h.send(USER_CHAT, "/login markaz 123456").await;
        assert_eq!(
            h.send(USER_CHAT, &format!("/topup {token}")).await,
            "Top-up successful. Added Rp5000 to markaz. New balance: Rp105000."
        );
        assert_eq!(
            h.send(USER_CHAT, &format!("/topup {token}")).await,
            "Token has already been used."
        );
        assert_eq!(
            h.send(ChatId(5), "/balance markaz").await,
            "The balance for markaz is Rp105000."
        );
        assert_eq!(
            h.send(USER_CHAT, "/topup deadbeef").await,
            "Invalid token."
        );
    }

    #[tokio::test]
    async fn admin_reports_require_admin_session() {
        let h = harness();
        h.send(USER_CHAT, "/login markaz 123456").await;
        assert_eq!(
            h.send(USER_CHAT, "/viewBalanceReport").await,
            "This command requires an admin login."
        );

        h.send(ADMIN_CHAT, "/adminLogin udin123 root").await;
        assert_eq!(
            h.send(ADMIN_CHAT, "/viewBalanceReport").await,
            "Balance report:\nadmin: Rp50000\nmarkaz: Rp100000\n"
        );
        assert_eq!(
            h.send(ADMIN_CHAT, "/viewTransactionReport").await,
            "No transactions yet."
        );

        h.send(USER_CHAT, "dana20.0812.1").await;
        let report = h.send(ADMIN_CHAT, "/viewTransactionReport").await;
        assert!(report.contains("markaz debit Rp20000"), "{report}");

        assert_eq!(
            h.send(ADMIN_CHAT, "/adminLogout").await,
            "Admin udin123 logged out."
        );
        assert_eq!(
            h.send(ADMIN_CHAT, "/viewBalanceReport").await,
            "This command requires an admin login."
        );
    }

    #[tokio::test]
    async fn login_logout_lifecycle() {
        let h = harness();
        assert_eq!(
            h.send(USER_CHAT, "/login markaz wrong").await,
            "Invalid username or password."
        );
        assert_eq!(
            h.send(USER_CHAT, "/logout").await,
            "You are not logged in. Use /login <username> <password>."
        );
        h.send(USER_CHAT, "/login markaz 123456").await;
        assert_eq!(
            h.send(USER_CHAT, "/login markaz 123456").await,
            "You are already logged in."
        );
        assert_eq!(
            h.send(USER_CHAT, "/adminLogin udin123 root").await,
            "You are already logged in."
        );
        assert_eq!(
            h.send(USER_CHAT, "/adminLogout").await,
            "This command requires an admin login."
        );

        wait_until(|| h.transport.connects() == 1).await;
        assert_eq!(h.send(USER_CHAT, "/logout").await, "Logged out markaz.");
        assert_eq!(h.transport.closes(), 1);
    }

    #[tokio::test]
    async fn jabber_messages_reach_the_logged_in_chat() {
        let h = harness();
        h.send(USER_CHAT, "/login markaz 123456").await;
        wait_until(|| h.transport.connects() == 1).await;

        h.transport.emit(BridgeEvent::Online);
        h.transport.emit(BridgeEvent::Message {
            from: Some("h2h@xmpp.cz".to_string()),
            body: "SUKSES dana10".to_string(),
        });
        wait_until(|| !h.messenger.sent_to(USER_CHAT).is_empty()).await;
        assert_eq!(h.messenger.sent_to(USER_CHAT), vec!["SUKSES dana10".to_string()]);
    }

    #[tokio::test]
    async fn products_and_invalid_input() {
        let h = harness();
        let list = h.send(ChatId(1), "/products").await;
        assert!(list.starts_with("Available products:\n"));
        assert!(list.contains("dana10 - dana10 - Rp10000"));
        assert_eq!(h.send(ChatId(1), "what?").await, "Invalid command.");
        assert!(h.send(ChatId(1), "/start").await.contains("/login"));
    }
}
