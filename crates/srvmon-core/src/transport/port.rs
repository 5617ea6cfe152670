use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    transport::types::CommandEvent,
    Result,
};

/// Cross-messenger transport port.
///
/// Telegram is the first implementation; the shape is kept narrow so future
/// adapters can fit behind the same interface. The adapter owns only the
/// physical connection; all bot-level message bookkeeping stays in the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection and start delivering inbound command events.
    /// Failures are retryable by the supervisor.
    async fn connect(&self) -> Result<()>;

    /// Close the connection and stop delivering events.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Block until the connection reports lost (or `disconnect` is called).
    async fn wait_disconnected(&self);

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<MessageId>;

    /// Reply into the chat the event came from.
    async fn respond(&self, event: &CommandEvent, text: &str) -> Result<MessageId>;

    async fn edit(&self, msg: MessageRef, text: &str) -> Result<()>;

    async fn delete(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<()>;

    /// Delete the inbound message that carried the event.
    async fn delete_event(&self, event: &CommandEvent) -> Result<()>;
}
