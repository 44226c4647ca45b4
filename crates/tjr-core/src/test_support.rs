//! Port fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    bridge::{BridgeConnection, BridgeCredentials, BridgeEvent, BridgeTransport},
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

/// Poll `cond` until it holds; panics after two seconds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<(ChatId, String)>>,
}

impl FakeMessenger {
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, t)| t)
            .collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.sends.lock().unwrap().push((chat_id, text.to_string()));
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(*id),
        })
    }
}

#[derive(Default)]
pub struct FakeTransport {
    fail: bool,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    presences: Arc<AtomicUsize>,
    last: Mutex<Option<BridgeCredentials>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<BridgeEvent>>>,
}

impl FakeTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn presences(&self) -> usize {
        self.presences.load(Ordering::SeqCst)
    }

    pub fn last_credentials(&self) -> Option<BridgeCredentials> {
        self.last.lock().unwrap().clone()
    }

    /// Push an event into every live fake connection.
    pub fn emit(&self, event: BridgeEvent) {
        for tx in self.feeds.lock().unwrap().iter() {
            let _ = tx.send(event.clone());
        }
    }
}

#[async_trait]
impl BridgeTransport for FakeTransport {
    async fn connect(&self, creds: &BridgeCredentials) -> Result<Box<dyn BridgeConnection>> {
        *self.last.lock().unwrap() = Some(creds.clone());
        if self.fail {
            self.connects.fetch_add(1, Ordering::SeqCst);
            return Err(Error::External("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            rx,
            closes: self.closes.clone(),
            presences: self.presences.clone(),
        }))
    }
}

struct FakeConnection {
    rx: mpsc::UnboundedReceiver<BridgeEvent>,
    closes: Arc<AtomicUsize>,
    presences: Arc<AtomicUsize>,
}

#[async_trait]
impl BridgeConnection for FakeConnection {
    async fn next_event(&mut self) -> Option<BridgeEvent> {
        self.rx.recv().await
    }

    async fn send_presence(&mut self) -> Result<()> {
        self.presences.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
