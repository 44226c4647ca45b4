use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher as TgDispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use tjr_core::{dispatcher::Dispatcher, domain::ChatId, messaging::port::MessagingPort};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub messenger: Arc<dyn MessagingPort>,
    pub chat_locks: Arc<ChatLocks>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            dispatcher,
            messenger,
            chat_locks: Arc::new(ChatLocks::default()),
        }
    }
}

/// Per-chat mutexes so one chat's commands run in arrival order while
/// different chats proceed concurrently.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<ChatId, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: ChatId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Long-poll Telegram until Ctrl-C.
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), "telegram bot started"),
        Err(e) => tracing::warn!(error = %e, "could not fetch bot identity"),
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    TgDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("telegram polling stopped");
    Ok(())
}
