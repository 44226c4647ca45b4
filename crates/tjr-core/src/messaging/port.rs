use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Outbound side of the chat front-end.
///
/// Sends return a `Result`; callers decide whether to log and continue or propagate.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
}

/// Send `text`, splitting it into chunks that fit the messenger's length limit.
pub async fn send_text_split(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    text: &str,
) -> Result<()> {
    let limit = messenger.capabilities().max_message_len.max(1);
    for chunk in split_text_chunks(text, limit) {
        messenger.send_text(chat_id, &chunk).await?;
    }
    Ok(())
}

/// Split on line boundaries where possible; hard-split lines longer than `limit` chars.
pub fn split_text_chunks(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut chunk = String::new();
    let mut chunk_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if chunk_len + line_len > limit && !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
            chunk_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                out.push(piece.iter().collect());
            }
            continue;
        }
        chunk.push_str(line);
        chunk_len += line_len;
    }
    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}
