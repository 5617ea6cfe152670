//! Periodic status publishing.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::{
    config::Config,
    domain::ChatId,
    ledger::MessageLedger,
    lifecycle::Lifecycle,
    metrics::{MetricsSource, StatusTag},
    state::RunFlag,
    transport::{util, Transport},
};

/// Poll cadence while the connection is down, so recovery is picked up
/// without consuming a full update interval.
const DOWN_POLL_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct StatusPublisher {
    cfg: Arc<Config>,
    transport: Arc<dyn Transport>,
    metrics: Arc<dyn MetricsSource>,
    ledger: MessageLedger,
    lifecycle: Lifecycle,
    run: RunFlag,
}

impl StatusPublisher {
    pub fn new(
        cfg: Arc<Config>,
        transport: Arc<dyn Transport>,
        metrics: Arc<dyn MetricsSource>,
        ledger: MessageLedger,
        lifecycle: Lifecycle,
        run: RunFlag,
    ) -> Self {
        Self {
            cfg,
            transport,
            metrics,
            ledger,
            lifecycle,
            run,
        }
    }

    /// Long-lived loop: after the initial delay, publish a fresh snapshot to
    /// every recipient chat each interval.
    pub async fn run(&self) {
        sleep(self.cfg.status_update_start_delay).await;

        while self.run.is_running() {
            if !self.transport.is_connected() {
                sleep(DOWN_POLL_DELAY).await;
                continue;
            }

            for &chat_id in &self.cfg.status_chats {
                self.publish_to(ChatId(chat_id)).await;
            }

            sleep(self.cfg.status_update_interval).await;
        }
    }

    /// One auto-tagged publish: discard the previous status message
    /// (best-effort, a failed removal never blocks the replacement) and
    /// record the new slot only if the send succeeds.
    pub async fn publish_to(&self, chat_id: ChatId) {
        self.lifecycle.discard_status(chat_id).await;

        let report = match self.metrics.status().await {
            Ok(report) => report,
            Err(e) => {
                warn!("status snapshot error: {e}");
                return;
            }
        };
        let text = format!("{report}\n{}", StatusTag::Auto);

        let Some(message_id) = util::safe_send(self.transport.as_ref(), chat_id, &text).await
        else {
            return;
        };
        // Last write wins on the slot if a manual status raced us.
        let _ = self.ledger.set_status(chat_id, message_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_config, RecordingTransport, StaticMetrics};
    use tokio_util::task::TaskTracker;

    const CHAT: ChatId = ChatId(42);

    fn publisher(
        transport: Arc<RecordingTransport>,
        metrics: Arc<StaticMetrics>,
    ) -> (MessageLedger, StatusPublisher) {
        let cfg = Arc::new(test_config());
        let ledger = MessageLedger::new();
        let run = RunFlag::new();
        let lifecycle = Lifecycle::new(
            cfg.clone(),
            transport.clone(),
            ledger.clone(),
            run.clone(),
            TaskTracker::new(),
        );
        let publisher = StatusPublisher::new(cfg, transport, metrics, ledger.clone(), lifecycle, run);
        (ledger, publisher)
    }

    #[tokio::test]
    async fn publish_records_slot_and_tags_auto() {
        let transport = Arc::new(RecordingTransport::new());
        let metrics = Arc::new(StaticMetrics::new("CPU - 1.0%"));
        let (ledger, publisher) = publisher(transport.clone(), metrics);

        publisher.publish_to(CHAT).await;

        let recorded = ledger.take_status(CHAT).await;
        assert_eq!(recorded, transport.last_sent_id());
        assert!(transport.sent_texts()[0].ends_with("Auto"));
    }

    #[tokio::test]
    async fn failed_removal_still_records_the_new_slot() {
        let transport = Arc::new(RecordingTransport::new());
        let metrics = Arc::new(StaticMetrics::new("CPU - 1.0%"));
        let (ledger, publisher) = publisher(transport.clone(), metrics);

        ledger.set_status(CHAT, crate::domain::MessageId(9000)).await;
        transport.fail_deletes(true);

        publisher.publish_to(CHAT).await;

        // Give the fire-and-forget removal a chance to fail.
        sleep(Duration::from_millis(20)).await;
        let new_id = transport.last_sent_id().expect("status sent");
        assert_eq!(ledger.take_status(CHAT).await, Some(new_id));
    }

    #[tokio::test]
    async fn failed_send_leaves_the_slot_empty() {
        let transport = Arc::new(RecordingTransport::new());
        let metrics = Arc::new(StaticMetrics::new("CPU - 1.0%"));
        let (ledger, publisher) = publisher(transport.clone(), metrics);
        transport.fail_sends(true);

        publisher.publish_to(CHAT).await;

        assert_eq!(ledger.take_status(CHAT).await, None);
    }

    #[tokio::test]
    async fn snapshot_failure_publishes_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let metrics = Arc::new(StaticMetrics::failing("probe offline"));
        let (ledger, publisher) = publisher(transport.clone(), metrics);

        publisher.publish_to(CHAT).await;

        assert_eq!(transport.send_calls(), 0);
        assert_eq!(ledger.take_status(CHAT).await, None);
    }
}
