use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::Mutex;

use crate::domain::{ChatId, MessageId};

/// Sole owner of bot-level message-id bookkeeping.
///
/// Tracks the per-chat status slot (at most one live status message per chat)
/// and the per-chat set of live messages eligible for timed auto-delete.
/// Every operation is a single step under one lock, which keeps racing expiry
/// timers and bulk cleans idempotent; multi-step drains take a snapshot and
/// clear in that same step, so registrations arriving during a fan-out land
/// in a fresh map instead of the one being drained.
#[derive(Clone, Default)]
pub struct MessageLedger {
    inner: Arc<Mutex<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    status: HashMap<ChatId, MessageId>,
    live: HashMap<ChatId, HashSet<MessageId>>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message_id` as the chat's current status message, returning
    /// the replaced one if any.
    pub async fn set_status(&self, chat_id: ChatId, message_id: MessageId) -> Option<MessageId> {
        self.inner.lock().await.status.insert(chat_id, message_id)
    }

    /// Remove and return the chat's current status message id.
    pub async fn take_status(&self, chat_id: ChatId) -> Option<MessageId> {
        self.inner.lock().await.status.remove(&chat_id)
    }

    /// Snapshot-and-clear the whole status slot map.
    pub async fn take_all_status(&self) -> HashMap<ChatId, MessageId> {
        std::mem::take(&mut self.inner.lock().await.status)
    }

    /// Register a live message for timed auto-delete.
    pub async fn track(&self, chat_id: ChatId, message_id: MessageId) {
        self.inner
            .lock()
            .await
            .live
            .entry(chat_id)
            .or_default()
            .insert(message_id);
    }

    /// Remove a live message if it is still tracked, reporting whether it
    /// was. Callers delete only on `true`; set membership is the single
    /// source of truth, so an expiry timer and a bulk clean can never both
    /// delete the same message.
    pub async fn untrack(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        let mut state = self.inner.lock().await;
        let Some(set) = state.live.get_mut(&chat_id) else {
            return false;
        };
        let removed = set.remove(&message_id);
        if set.is_empty() {
            state.live.remove(&chat_id);
        }
        removed
    }

    /// Snapshot-and-clear one chat's live set.
    pub async fn drain_chat(&self, chat_id: ChatId) -> Vec<MessageId> {
        self.inner
            .lock()
            .await
            .live
            .remove(&chat_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Snapshot-and-clear the whole live map.
    pub async fn take_all_live(&self) -> HashMap<ChatId, Vec<MessageId>> {
        std::mem::take(&mut self.inner.lock().await.live)
            .into_iter()
            .map(|(chat_id, set)| (chat_id, set.into_iter().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: ChatId = ChatId(7);

    #[tokio::test]
    async fn status_slot_holds_at_most_one_entry() {
        let ledger = MessageLedger::new();

        assert_eq!(ledger.set_status(CHAT, MessageId(1)).await, None);
        assert_eq!(ledger.set_status(CHAT, MessageId(2)).await, Some(MessageId(1)));

        assert_eq!(ledger.take_status(CHAT).await, Some(MessageId(2)));
        assert_eq!(ledger.take_status(CHAT).await, None);
    }

    #[tokio::test]
    async fn untrack_is_idempotent() {
        let ledger = MessageLedger::new();
        ledger.track(CHAT, MessageId(5)).await;

        assert!(ledger.untrack(CHAT, MessageId(5)).await);
        assert!(!ledger.untrack(CHAT, MessageId(5)).await);
        assert!(!ledger.untrack(ChatId(99), MessageId(5)).await);
    }

    #[tokio::test]
    async fn drain_chat_snapshots_and_clears() {
        let ledger = MessageLedger::new();
        ledger.track(CHAT, MessageId(1)).await;
        ledger.track(CHAT, MessageId(2)).await;

        let mut drained = ledger.drain_chat(CHAT).await;
        drained.sort_by_key(|id| id.0);
        assert_eq!(drained, vec![MessageId(1), MessageId(2)]);

        assert!(ledger.drain_chat(CHAT).await.is_empty());

        // Registrations after a drain land in a fresh set.
        ledger.track(CHAT, MessageId(3)).await;
        assert_eq!(ledger.drain_chat(CHAT).await, vec![MessageId(3)]);
    }

    #[tokio::test]
    async fn take_all_clears_both_maps() {
        let ledger = MessageLedger::new();
        ledger.set_status(ChatId(1), MessageId(10)).await;
        ledger.set_status(ChatId(2), MessageId(20)).await;
        ledger.track(ChatId(1), MessageId(11)).await;

        let status = ledger.take_all_status().await;
        assert_eq!(status.len(), 2);
        assert!(ledger.take_all_status().await.is_empty());

        let live = ledger.take_all_live().await;
        assert_eq!(live[&ChatId(1)], vec![MessageId(11)]);
        assert!(ledger.take_all_live().await.is_empty());
    }
}
