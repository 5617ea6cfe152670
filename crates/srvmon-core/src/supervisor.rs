//! Connection supervision.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{config::Config, state::RunFlag, transport::Transport};

/// Owns the physical connection state: connects, blocks until the connection
/// drops, and retries with a fixed delay until told to stop.
pub struct ReconnectSupervisor {
    cfg: Arc<Config>,
    transport: Arc<dyn Transport>,
    run: RunFlag,
}

impl ReconnectSupervisor {
    pub fn new(cfg: Arc<Config>, transport: Arc<dyn Transport>, run: RunFlag) -> Self {
        Self {
            cfg,
            transport,
            run,
        }
    }

    /// Connect errors are swallowed and treated like a disconnect. The run
    /// flag is re-checked after every block, so a stop request observed after
    /// the disconnect wait or the retry sleep exits without another connect.
    pub async fn run(&self) {
        while self.run.is_running() {
            match self.transport.connect().await {
                Ok(()) => {
                    info!("connected successfully");
                    self.transport.wait_disconnected().await;
                    if !self.run.is_running() {
                        return;
                    }
                    warn!("connection lost");
                }
                Err(e) => {
                    warn!("connect failed: {e}");
                }
            }

            sleep(self.cfg.connection_retry_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::{test_config, RecordingTransport};

    fn supervisor(
        transport: Arc<RecordingTransport>,
        retry_delay: Duration,
    ) -> (RunFlag, ReconnectSupervisor) {
        let mut cfg = test_config();
        cfg.connection_retry_delay = retry_delay;
        let run = RunFlag::new();
        let supervisor = ReconnectSupervisor::new(Arc::new(cfg), transport, run.clone());
        (run, supervisor)
    }

    #[tokio::test]
    async fn reconnects_after_the_retry_delay() {
        let transport = Arc::new(RecordingTransport::new());
        let (run, supervisor) = supervisor(transport.clone(), Duration::from_millis(40));

        let task = tokio::spawn(async move { supervisor.run().await });

        sleep(Duration::from_millis(15)).await;
        assert_eq!(transport.connect_calls(), 1);
        assert!(transport.is_connected_now());

        transport.drop_connection();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.connect_calls(), 2);

        run.request_stop();
        transport.drop_connection();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_during_the_retry_wait_prevents_reconnect() {
        let transport = Arc::new(RecordingTransport::new());
        let (run, supervisor) = supervisor(transport.clone(), Duration::from_millis(60));

        let task = tokio::spawn(async move { supervisor.run().await });

        sleep(Duration::from_millis(15)).await;
        transport.drop_connection();

        // Stop lands inside the retry sleep.
        sleep(Duration::from_millis(20)).await;
        run.request_stop();

        task.await.unwrap();
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn connect_errors_are_swallowed_and_retried() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_connects(true);
        let (run, supervisor) = supervisor(transport.clone(), Duration::from_millis(30));

        let task = tokio::spawn(async move { supervisor.run().await });

        sleep(Duration::from_millis(100)).await;
        assert!(transport.connect_calls() >= 2);

        run.request_stop();
        task.await.unwrap();
    }
}
