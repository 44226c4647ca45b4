//! Credentials for users and admins, loaded once at startup.

use std::collections::HashMap;

use crate::{domain::ChatId, domain::Role};

/// A relay user: chat login plus the Jabber identity the bridge connects as.
#[derive(Clone, Debug)]
pub struct UserAccount {
    pub username: String,
    pub password: String,
    pub jabber_jid: String,
    pub jabber_password: String,
    pub opening_balance: u64,
}

#[derive(Clone, Debug)]
pub struct AdminAccount {
    pub admin_id: String,
    pub password: String,
    /// Chat that receives purchase / top-up notifications.
    pub notify_chat: ChatId,
}

/// Read-only account directory.
///
/// Passwords are compared as plain strings.
#[derive(Clone, Debug, Default)]
pub struct AccountBook {
    users: HashMap<String, UserAccount>,
    admins: HashMap<String, AdminAccount>,
}

impl AccountBook {
    pub fn new(users: Vec<UserAccount>, admins: Vec<AdminAccount>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.username.clone(), u)).collect(),
            admins: admins.into_iter().map(|a| (a.admin_id.clone(), a)).collect(),
        }
    }

    pub fn user(&self, username: &str) -> Option<&UserAccount> {
        self.users.get(username)
    }

    pub fn admin(&self, admin_id: &str) -> Option<&AdminAccount> {
        self.admins.get(admin_id)
    }

    /// Opening balances for the ledger.
    pub fn opening_balances(&self) -> Vec<(String, u64)> {
        self.users
            .values()
            .map(|u| (u.username.clone(), u.opening_balance))
            .collect()
    }

    /// Chats to notify about ledger activity, sorted for stable delivery order.
    pub fn admin_chats(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self.admins.values().map(|a| a.notify_chat).collect();
        chats.sort();
        chats.dedup();
        chats
    }

    pub fn verify(&self, role: Role, identity: &str, password: &str) -> bool {
        match role {
            Role::User => self.users.get(identity).map(|u| u.password == password),
            Role::Admin => self.admins.get(identity).map(|a| a.password == password),
        }
        .unwrap_or(false)
    }
}
