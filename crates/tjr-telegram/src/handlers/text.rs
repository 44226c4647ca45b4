use tjr_core::messaging::{port::send_text_split, types::TextMessage};

use crate::router::AppState;

/// Dispatch one text message and send the reply back to its chat.
pub async fn handle_text(state: &AppState, msg: TextMessage) {
    if msg.text.trim().is_empty() {
        return;
    }

    // Sequentialize commands per chat.
    let _guard = state.chat_locks.lock_chat(msg.chat_id).await;

    tracing::debug!(
        chat_id = %msg.chat_id,
        username = msg.username.as_deref().unwrap_or("unknown"),
        "inbound command"
    );
    let reply = state.dispatcher.dispatch(msg.chat_id, &msg.text).await;

    if let Err(e) = send_text_split(state.messenger.as_ref(), msg.chat_id, &reply).await {
        tracing::warn!(chat_id = %msg.chat_id, error = %e, "failed to send reply");
    }
}
