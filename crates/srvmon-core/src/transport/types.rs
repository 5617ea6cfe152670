use crate::domain::{ChatId, MessageId, UserId};

/// Inbound command message as delivered by the transport.
#[derive(Clone, Debug)]
pub struct CommandEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    /// Id of the inbound message itself (for command auto-delete).
    pub message_id: MessageId,
    pub text: String,
}
