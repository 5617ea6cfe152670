//! Best-effort transport helpers.
//!
//! Transport failures are never fatal for the bot: they are logged as
//! warnings and the operation is treated as a no-op.

use tracing::warn;

use crate::{
    domain::{ChatId, MessageId},
    transport::{port::Transport, types::CommandEvent},
};

pub async fn safe_send(
    transport: &dyn Transport,
    chat_id: ChatId,
    text: &str,
) -> Option<MessageId> {
    match transport.send(chat_id, text).await {
        Ok(message_id) => Some(message_id),
        Err(e) => {
            warn!("sending message error: {e}");
            None
        }
    }
}

pub async fn safe_respond(
    transport: &dyn Transport,
    event: &CommandEvent,
    text: &str,
) -> Option<MessageId> {
    match transport.respond(event, text).await {
        Ok(message_id) => Some(message_id),
        Err(e) => {
            warn!("response error: {e}");
            None
        }
    }
}

pub async fn safe_delete(transport: &dyn Transport, chat_id: ChatId, message_ids: &[MessageId]) {
    if message_ids.is_empty() {
        return;
    }
    if let Err(e) = transport.delete(chat_id, message_ids).await {
        warn!("deleting message error: {e}");
    }
}

pub async fn safe_delete_event(transport: &dyn Transport, event: &CommandEvent) {
    if let Err(e) = transport.delete_event(event).await {
        warn!("deleting event error: {e}");
    }
}
