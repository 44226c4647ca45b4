use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    accounts::{AdminAccount, UserAccount},
    catalog::Catalog,
    domain::ChatId,
    errors::Error,
    tokens::DEFAULT_TOKEN_TTL,
    Result,
};

const DEFAULT_USERS: &str = "markaz:100000,admin:50000";
const DEFAULT_ADMINS: &str = "udin123";
const DEFAULT_XMPP_HOST: &str = "xmpp.cz";
const DEFAULT_XMPP_PORT: u16 = 5222;

/// Typed configuration for the relay.
///
/// Every required credential is checked up front; `load` fails with a single
/// [`Error::Config`] naming all missing variables before any traffic is accepted.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,

    // Accounts
    pub users: Vec<UserAccount>,
    pub admins: Vec<AdminAccount>,

    // Jabber
    pub xmpp_host: String,
    pub xmpp_port: u16,

    // Ledger
    pub token_ttl: Duration,
    pub catalog: Catalog,

    // Logging
    pub log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build the configuration from an arbitrary key lookup (the process env in `load`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);
        let mut missing: Vec<String> = Vec::new();

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_else(|| {
            missing.push("TELEGRAM_BOT_TOKEN".to_string());
            String::new()
        });

        // Users: RELAY_USERS=name:opening_balance,...
        let mut users = Vec::new();
        let user_specs = get("RELAY_USERS").unwrap_or_else(|| DEFAULT_USERS.to_string());
        for (username, opening) in parse_user_specs(&user_specs)? {
            let mut required = |suffix: &str| {
                let key = account_key(&username, suffix);
                get(&key).unwrap_or_else(|| {
                    missing.push(key);
                    String::new()
                })
            };
            let jabber_jid = required("JID");
            let jabber_password = required("JABBERPASSWORD");
            let password = required("PASSWORD");
            users.push(UserAccount {
                username,
                password,
                jabber_jid,
                jabber_password,
                opening_balance: opening,
            });
        }

        // Admins: RELAY_ADMINS=id,...
        let mut admins = Vec::new();
        let admin_specs = get("RELAY_ADMINS").unwrap_or_else(|| DEFAULT_ADMINS.to_string());
        for admin_id in parse_csv(&admin_specs) {
            let password_key = account_key(&admin_id, "PASSWORD");
            let password = get(&password_key).unwrap_or_else(|| {
                missing.push(password_key);
                String::new()
            });

            let chat_key = account_key(&admin_id, "CHAT_ID");
            let notify_chat = match get(&chat_key) {
                Some(raw) => ChatId(raw.trim().parse::<i64>().map_err(|_| {
                    Error::Config(format!("{chat_key} must be a numeric chat id, got {raw:?}"))
                })?),
                None => {
                    missing.push(chat_key);
                    ChatId(0)
                }
            };

            admins.push(AdminAccount {
                admin_id,
                password,
                notify_chat,
            });
        }

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let xmpp_host = get("XMPP_HOST").unwrap_or_else(|| DEFAULT_XMPP_HOST.to_string());
        let xmpp_port = match get("XMPP_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("XMPP_PORT must be a port number, got {raw:?}")))?,
            None => DEFAULT_XMPP_PORT,
        };

        let token_ttl = get("TOKEN_TTL_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        let catalog = match get("PRODUCTS_FILE") {
            Some(path) => Catalog::from_json_file(&PathBuf::from(path))?,
            None => Catalog::default(),
        };

        let log_json = get("LOG_JSON").map(|s| parse_bool(&s)).unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            users,
            admins,
            xmpp_host,
            xmpp_port,
            token_ttl,
            catalog,
            log_json,
        })
    }
}

/// `USER_<NAME>_<SUFFIX>`, e.g. `USER_MARKAZ_JID`.
fn account_key(name: &str, suffix: &str) -> String {
    format!("USER_{}_{suffix}", name.to_uppercase())
}

fn parse_user_specs(raw: &str) -> Result<Vec<(String, u64)>> {
    parse_csv(raw)
        .into_iter()
        .map(|spec| {
            let Some((name, balance)) = spec.split_once(':') else {
                return Ok((spec.trim().to_string(), 0));
            };
            let balance = balance.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("invalid opening balance in RELAY_USERS entry {spec:?}"))
            })?;
            Ok((name.trim().to_string(), balance))
        })
        .collect()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
