//! Jabber adapter (tokio-xmpp).
//!
//! Implements the `tjr-core` bridge ports. Each connection owns one XMPP client on a
//! dedicated task; the core side talks to it over channels.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_xmpp::{AsyncClient, AsyncConfig, AsyncServerConfig, Event};
use xmpp_parsers::{
    message::{Message, MessageType},
    presence::{Presence, Show, Type as PresenceType},
    Element, Jid,
};

use tjr_core::{
    bridge::{BridgeConnection, BridgeCredentials, BridgeEvent, BridgeTransport},
    errors::Error,
    Result,
};

const EVENT_BUFFER: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects bridges with STARTTLS to a fixed host/port (no SRV lookup).
#[derive(Clone, Debug, Default)]
pub struct XmppTransport;

impl XmppTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BridgeTransport for XmppTransport {
    async fn connect(&self, creds: &BridgeCredentials) -> Result<Box<dyn BridgeConnection>> {
        let jid = Jid::from_str(&creds.jid)
            .map_err(|e| Error::External(format!("invalid jid {}: {e}", creds.jid)))?;

        let mut client = AsyncClient::new_with_config(AsyncConfig {
            jid,
            password: creds.password.clone(),
            server: AsyncServerConfig::Manual {
                host: creds.host.clone(),
                port: creds.port,
            },
        });
        // A dropped stream ends the bridge; the user logs in again to reconnect.
        client.set_reconnect(false);

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let jid = creds.jid.clone();

        let task = tokio::spawn(async move {
            let mut client = client;
            let mut commands = cmd_rx;
            loop {
                tokio::select! {
                    cmd = commands.recv() => match cmd {
                        Some(Outbound::Presence(ack)) => {
                            let res = client
                                .send_stanza(presence_stanza())
                                .await
                                .map_err(|e| Error::External(format!("send presence: {e}")));
                            let _ = ack.send(res);
                        }
                        Some(Outbound::Close(ack)) => {
                            if let Err(e) = client.send_end().await {
                                tracing::debug!(%jid, error = %e, "stream end failed");
                            }
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            let _ = client.send_end().await;
                            break;
                        }
                    },
                    event = client.next() => {
                        let Some(event) = event else { break };
                        let Some(mapped) = map_event(event) else { continue };
                        if event_tx.send(mapped).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(%jid, "xmpp client task finished");
        });

        Ok(Box::new(XmppConnection {
            events: event_rx,
            commands: cmd_tx,
            task: Some(task),
        }))
    }
}

enum Outbound {
    Presence(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<()>),
}

pub struct XmppConnection {
    events: mpsc::Receiver<BridgeEvent>,
    commands: mpsc::UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl BridgeConnection for XmppConnection {
    async fn next_event(&mut self) -> Option<BridgeEvent> {
        self.events.recv().await
    }

    async fn send_presence(&mut self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Outbound::Presence(tx))
            .map_err(|_| Error::External("xmpp client is gone".to_string()))?;
        rx.await
            .map_err(|_| Error::External("xmpp client is gone".to_string()))?
    }

    async fn close(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        let (tx, rx) = oneshot::channel();
        if self.commands.send(Outbound::Close(tx)).is_ok() {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, rx).await;
        }
        task.abort();
        Ok(())
    }
}

impl Drop for XmppConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn map_event(event: Event) -> Option<BridgeEvent> {
    match event {
        Event::Online { .. } => Some(BridgeEvent::Online),
        Event::Disconnected(e) => Some(BridgeEvent::Error(e.to_string())),
        Event::Stanza(stanza) => {
            let (from, body) = message_body(stanza)?;
            Some(BridgeEvent::Message { from, body })
        }
    }
}

/// Sender and text of a chat message stanza; `None` for anything without a body.
pub fn message_body(stanza: Element) -> Option<(Option<String>, String)> {
    let message = Message::try_from(stanza).ok()?;
    if message.type_ == MessageType::Error {
        return None;
    }
    let body = message
        .bodies
        .get("")
        .or_else(|| message.bodies.values().next())?;
    Some((message.from.map(|jid| jid.to_string()), body.0.clone()))
}

/// Available presence with `<show>chat</show>`.
pub fn presence_stanza() -> Element {
    Presence::new(PresenceType::None).with_show(Show::Chat).into()
}
