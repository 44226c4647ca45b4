//! Telegram update handlers.
//!
//! Only text messages carry commands; everything else is ignored.

use std::sync::Arc;

use teloxide::prelude::*;

use tjr_core::{domain::ChatId, messaging::types::TextMessage};

use crate::router::AppState;

mod text;

pub use text::handle_text;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);

    let Some(text) = msg.text() else {
        tracing::debug!(%chat_id, "ignoring non-text message");
        return Ok(());
    };

    let inbound = TextMessage {
        chat_id,
        username: msg.from().and_then(|u| u.username.clone()),
        text: text.to_string(),
    };

    // Reply failures are logged inside; polling must keep going.
    handle_text(&state, inbound).await;
    Ok(())
}
