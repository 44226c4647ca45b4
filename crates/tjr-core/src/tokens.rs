//! Single-use, time-limited top-up tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use tokio::sync::Mutex;

use crate::{errors::Error, ledger::Ledger, Result};

/// Entropy per token, in bytes (128 bits).
const TOKEN_BYTES: usize = 16;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopUpToken {
    pub identity: String,
    pub amount: u64,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful redemption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopUpReceipt {
    pub identity: String,
    pub amount: u64,
    pub balance: u64,
}

/// Issues tokens and redeems them against the [`Ledger`].
///
/// The token table lock is held across the used/expiry checks, the ledger credit and
/// the used flip, so two redemptions of the same token can never both succeed.
pub struct TokenIssuer {
    ledger: Arc<Ledger>,
    ttl: chrono::Duration,
    tokens: Mutex<HashMap<String, TopUpToken>>,
}

impl TokenIssuer {
    pub fn new(ledger: Arc<Ledger>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        Self {
            ledger,
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub async fn issue(&self, identity: &str, amount: i64) -> Result<String> {
        self.issue_at(identity, amount, Utc::now()).await
    }

    pub async fn issue_at(&self, identity: &str, amount: i64, now: DateTime<Utc>) -> Result<String> {
        if !self.ledger.contains(identity).await {
            return Err(Error::UnknownUser(identity.to_string()));
        }
        let amount = u64::try_from(amount)
            .ok()
            .filter(|a| *a > 0)
            .ok_or(Error::InvalidAmount)?;

        let mut tokens = self.tokens.lock().await;
        let mut token = generate_token();
        while tokens.contains_key(&token) {
            token = generate_token();
        }
        tokens.insert(
            token.clone(),
            TopUpToken {
                identity: identity.to_string(),
                amount,
                used: false,
                created_at: now,
            },
        );
        tracing::info!(user = identity, amount, "top-up token issued");
        Ok(token)
    }

    pub async fn redeem(&self, token: &str) -> Result<TopUpReceipt> {
        self.redeem_at(token, Utc::now()).await
    }

    pub async fn redeem_at(&self, token: &str, now: DateTime<Utc>) -> Result<TopUpReceipt> {
        let mut tokens = self.tokens.lock().await;
        let entry = tokens.get_mut(token).ok_or(Error::InvalidToken)?;
        if entry.used {
            return Err(Error::TokenAlreadyUsed);
        }
        if now.signed_duration_since(entry.created_at) > self.ttl {
            return Err(Error::TokenExpired);
        }

        let balance = self
            .ledger
            .credit(&entry.identity, entry.amount, "top-up")
            .await?;
        entry.used = true;

        tracing::info!(user = %entry.identity, amount = entry.amount, "top-up token redeemed");
        Ok(TopUpReceipt {
            identity: entry.identity.clone(),
            amount: entry.amount,
            balance,
        })
    }

    /// Snapshot of a token's state, used or not.
    pub async fn lookup(&self, token: &str) -> Option<TopUpToken> {
        self.tokens.lock().await.get(token).cloned()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
