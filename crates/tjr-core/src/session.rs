use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    accounts::AccountBook,
    bridge::{BridgeConnector, BridgeHandle},
    domain::{ChatId, Role},
    errors::Error,
    Result,
};

struct Session {
    identity: String,
    role: Role,
    bridge: Option<BridgeHandle>,
}

impl Session {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            identity: self.identity.clone(),
            role: self.role,
            bridged: self.bridge.is_some(),
        }
    }
}

/// Read-only view of a live session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub identity: String,
    pub role: Role,
    pub bridged: bool,
}

/// Login sessions keyed by chat.
///
/// - one session per chat; a second login is rejected, never replaced
/// - user sessions own their Jabber bridge, admin sessions have none
/// - removing a session closes its bridge
pub struct SessionRegistry {
    accounts: Arc<AccountBook>,
    connector: Arc<BridgeConnector>,
    sessions: Mutex<HashMap<ChatId, Session>>,
}

impl SessionRegistry {
    pub fn new(accounts: Arc<AccountBook>, connector: Arc<BridgeConnector>) -> Self {
        Self {
            accounts,
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn login(
        &self,
        chat_id: ChatId,
        identity: &str,
        password: &str,
        role: Role,
    ) -> Result<Role> {
        if !self.accounts.verify(role, identity, password) {
            tracing::warn!(%chat_id, identity, %role, "login rejected: bad credentials");
            return Err(Error::InvalidCredentials);
        }

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&chat_id) {
            return Err(Error::AlreadyLoggedIn);
        }

        let bridge = match role {
            Role::User => {
                let account = self
                    .accounts
                    .user(identity)
                    .ok_or(Error::InvalidCredentials)?;
                Some(self.connector.open(account, chat_id))
            }
            Role::Admin => None,
        };

        sessions.insert(
            chat_id,
            Session {
                identity: identity.to_string(),
                role,
                bridge,
            },
        );
        tracing::info!(%chat_id, identity, %role, "logged in");
        Ok(role)
    }

    /// End whatever session `chat_id` has.
    pub async fn logout(&self, chat_id: ChatId) -> Result<SessionInfo> {
        self.remove(chat_id, None).await
    }

    /// End the session only if it has `role`; otherwise `NotLoggedIn` and nothing changes.
    pub async fn logout_as(&self, chat_id: ChatId, role: Role) -> Result<SessionInfo> {
        self.remove(chat_id, Some(role)).await
    }

    pub async fn session_of(&self, chat_id: ChatId) -> Result<SessionInfo> {
        self.sessions
            .lock()
            .await
            .get(&chat_id)
            .map(Session::info)
            .ok_or(Error::NotLoggedIn)
    }

    /// The chat's session, provided it carries `role`.
    pub async fn require(&self, chat_id: ChatId, role: Role) -> Result<SessionInfo> {
        let info = self.session_of(chat_id).await?;
        if info.role != role {
            return Err(Error::PermissionDenied);
        }
        Ok(info)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Close every bridge and drop all sessions.
    pub async fn shutdown(&self) {
        let drained: Vec<(ChatId, Session)> = self.sessions.lock().await.drain().collect();
        for (chat_id, mut session) in drained {
            if let Some(bridge) = session.bridge.as_mut() {
                bridge.close().await;
            }
            tracing::info!(%chat_id, identity = %session.identity, "session closed on shutdown");
        }
    }

    async fn remove(&self, chat_id: ChatId, role: Option<Role>) -> Result<SessionInfo> {
        let mut session = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(&chat_id) {
                None => return Err(Error::NotLoggedIn),
                Some(s) if role.is_some_and(|r| r != s.role) => return Err(Error::NotLoggedIn),
                Some(_) => {}
            }
            sessions.remove(&chat_id).ok_or(Error::NotLoggedIn)?
        };

        let info = session.info();
        if let Some(bridge) = session.bridge.as_mut() {
            bridge.close().await;
        }
        tracing::info!(%chat_id, identity = %info.identity, role = %info.role, "logged out");
        Ok(info)
    }
}
