//! Per-user bridge to the Jabber side.
//!
//! A bridge is a background task owning one messaging-protocol connection. It announces
//! presence once online and relays every inbound message body to the owning chat.
//! The task lives exactly as long as its [`BridgeHandle`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    accounts::UserAccount, domain::ChatId, messaging::port::MessagingPort, Result,
};

/// Credentials and endpoint for one messaging-protocol login.
#[derive(Clone, Debug)]
pub struct BridgeCredentials {
    pub jid: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

/// Events surfaced by a live connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    Online,
    Message { from: Option<String>, body: String },
    Error(String),
}

/// Opens messaging-protocol connections (XMPP in production).
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn connect(&self, creds: &BridgeCredentials) -> Result<Box<dyn BridgeConnection>>;
}

#[async_trait]
pub trait BridgeConnection: Send {
    /// Next event, or `None` once the stream has ended.
    async fn next_event(&mut self) -> Option<BridgeEvent>;

    /// Announce availability (`<presence><show>chat</show></presence>`).
    async fn send_presence(&mut self) -> Result<()>;

    /// Terminate the stream.
    async fn close(&mut self) -> Result<()>;
}

/// Spawns bridge tasks for logged-in users.
pub struct BridgeConnector {
    transport: Arc<dyn BridgeTransport>,
    messenger: Arc<dyn MessagingPort>,
    host: String,
    port: u16,
}

impl BridgeConnector {
    pub fn new(
        transport: Arc<dyn BridgeTransport>,
        messenger: Arc<dyn MessagingPort>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            transport,
            messenger,
            host: host.into(),
            port,
        }
    }

    /// Start a bridge for `account`, relaying into `chat_id`.
    ///
    /// Returns immediately; connecting happens on the spawned task.
    pub fn open(&self, account: &UserAccount, chat_id: ChatId) -> BridgeHandle {
        let creds = BridgeCredentials {
            jid: account.jabber_jid.clone(),
            password: account.jabber_password.clone(),
            host: self.host.clone(),
            port: self.port,
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_bridge(
            self.transport.clone(),
            self.messenger.clone(),
            creds,
            chat_id,
            cancel.clone(),
        ));

        BridgeHandle {
            jid: account.jabber_jid.clone(),
            cancel,
            task: Some(task),
        }
    }
}

/// Owned handle to a running bridge.
///
/// `close` terminates the connection and waits for the task; dropping the handle
/// without closing still cancels the task.
pub struct BridgeHandle {
    jid: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    pub fn jid(&self) -> &str {
        &self.jid
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Close the bridge. Calling this on a closed bridge does nothing.
    pub async fn close(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.cancel.cancel();
        if let Err(e) = task.await {
            tracing::warn!(jid = %self.jid, error = %e, "bridge task ended abnormally");
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_bridge(
    transport: Arc<dyn BridgeTransport>,
    messenger: Arc<dyn MessagingPort>,
    creds: BridgeCredentials,
    chat_id: ChatId,
    cancel: CancellationToken,
) {
    let jid = creds.jid.clone();

    let mut conn = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(%jid, "bridge cancelled before connecting");
            return;
        }
        res = transport.connect(&creds) => match res {
            Ok(conn) => conn,
            Err(e) => {
                // The session stays logged in; the user has to /logout to retry.
                tracing::error!(%jid, %chat_id, error = %e, "jabber connect failed");
                return;
            }
        },
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = conn.close().await {
                    tracing::warn!(%jid, error = %e, "jabber close failed");
                }
                tracing::info!(%jid, %chat_id, "jabber bridge closed");
                return;
            }
            event = conn.next_event() => match event {
                Some(BridgeEvent::Online) => {
                    tracing::info!(%jid, "connected to jabber");
                    if let Err(e) = conn.send_presence().await {
                        tracing::warn!(%jid, error = %e, "failed to announce presence");
                    }
                }
                Some(BridgeEvent::Message { from, body }) => {
                    match messenger.send_text(chat_id, &body).await {
                        Ok(_) => tracing::info!(%jid, %chat_id, from = ?from, "relayed jabber message"),
                        Err(e) => tracing::warn!(%jid, %chat_id, error = %e, "failed to relay jabber message"),
                    }
                }
                Some(BridgeEvent::Error(e)) => {
                    tracing::error!(%jid, error = %e, "jabber client error");
                }
                None => {
                    tracing::info!(%jid, "jabber stream ended");
                    return;
                }
            },
        }
    }
}
