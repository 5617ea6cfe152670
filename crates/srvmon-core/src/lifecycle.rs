//! Timed expiry and bulk cleanup of bot-originated messages.

use std::{collections::HashMap, sync::Arc};

use tokio::time::sleep;
use tokio_util::task::TaskTracker;

use crate::{
    config::Config,
    domain::ChatId,
    ledger::MessageLedger,
    state::RunFlag,
    transport::{util, CommandEvent, Transport},
};

/// Schedules deletions for bot messages and runs the bulk-clean paths.
///
/// There is no timer-cancellation primitive here: every wakeup re-validates
/// its precondition (run flag, then set membership in the ledger) before
/// acting, so a bulk clean that fires first simply wins the race.
#[derive(Clone)]
pub struct Lifecycle {
    cfg: Arc<Config>,
    transport: Arc<dyn Transport>,
    ledger: MessageLedger,
    run: RunFlag,
    tasks: TaskTracker,
}

impl Lifecycle {
    pub fn new(
        cfg: Arc<Config>,
        transport: Arc<dyn Transport>,
        ledger: MessageLedger,
        run: RunFlag,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            cfg,
            transport,
            ledger,
            run,
            tasks,
        }
    }

    /// Reply to `event` and arm the delayed deletion for the reply.
    ///
    /// On send failure nothing is tracked and no deletion is scheduled. On
    /// expiry the id is deleted only if it is still in the chat's live set,
    /// so a concurrent bulk clean can never lead to a double delete.
    pub async fn publish_reply(&self, event: &CommandEvent, text: &str) {
        let Some(message_id) = util::safe_respond(self.transport.as_ref(), event, text).await
        else {
            return;
        };
        if !self.cfg.delete_reply_messages {
            return;
        }

        let chat_id = event.chat_id;
        self.ledger.track(chat_id, message_id).await;
        sleep(self.cfg.message_lifetime).await;

        if !self.run.is_running() {
            return; // shutdown purge owns whatever is still tracked
        }
        if self.ledger.untrack(chat_id, message_id).await {
            util::safe_delete(self.transport.as_ref(), chat_id, &[message_id]).await;
        }
    }

    /// Discard the chat's previous status message before a replacement is
    /// published. The slot is cleared immediately; the delete itself is
    /// fire-and-forget. Skipped entirely when status messages are persistent.
    pub async fn discard_status(&self, chat_id: ChatId) {
        if !self.cfg.delete_status_messages {
            return;
        }
        let Some(message_id) = self.ledger.take_status(chat_id).await else {
            return;
        };
        let this = self.clone();
        self.tasks.spawn(async move {
            util::safe_delete(this.transport.as_ref(), chat_id, &[message_id]).await;
        });
    }

    /// Delete the inbound command message, fire-and-forget.
    pub fn discard_command(&self, event: &CommandEvent) {
        if !self.cfg.delete_command_messages {
            return;
        }
        let this = self.clone();
        let event = event.clone();
        self.tasks.spawn(async move {
            util::safe_delete_event(this.transport.as_ref(), &event).await;
        });
    }

    /// Force-expire the chat now: its status message (regardless of the
    /// persistence flag) and every tracked live message.
    pub async fn clean_chat(&self, chat_id: ChatId) {
        if let Some(message_id) = self.ledger.take_status(chat_id).await {
            util::safe_delete(self.transport.as_ref(), chat_id, &[message_id]).await;
        }

        let message_ids = self.ledger.drain_chat(chat_id).await;
        if message_ids.is_empty() {
            return;
        }
        util::safe_delete(self.transport.as_ref(), chat_id, &message_ids).await;
    }

    /// Shutdown sequence: flip the run flag, then delete all status
    /// messages, all live messages (when reply auto-delete is on) and the
    /// triggering command event (when command auto-delete is on). The three
    /// branches touch disjoint resources and run concurrently; each deletion
    /// is best-effort and independent.
    pub async fn shutdown(&self, event: &CommandEvent) {
        self.run.request_stop();

        let status = self.ledger.take_all_status().await;
        let live = if self.cfg.delete_reply_messages {
            self.ledger.take_all_live().await
        } else {
            HashMap::new()
        };

        let delete_status = async {
            for (chat_id, message_id) in status {
                util::safe_delete(self.transport.as_ref(), chat_id, &[message_id]).await;
            }
        };
        let delete_live = async {
            for (chat_id, message_ids) in live {
                util::safe_delete(self.transport.as_ref(), chat_id, &message_ids).await;
            }
        };
        let delete_event = async {
            if self.cfg.delete_command_messages {
                util::safe_delete_event(self.transport.as_ref(), event).await;
            }
        };

        tokio::join!(delete_status, delete_live, delete_event);
    }
}
