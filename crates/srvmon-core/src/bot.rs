//! Bot wiring: the run loop, the command handlers and the restart marker.

use std::{
    fs,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    dispatcher::{self, Command},
    domain::{ChatId, MessageId, MessageRef},
    ledger::MessageLedger,
    lifecycle::Lifecycle,
    logs,
    metrics::{MetricsSource, StatusTag},
    state::RunFlag,
    status::StatusPublisher,
    supervisor::ReconnectSupervisor,
    transport::{util, CommandEvent, Transport},
    vcs,
};

const HELP_TEXT: &str = "\
Commands
/status - show status
/clean - clean messages
/help - show help
/version - show version

Admin commands
/logs - show logs
/update - update bot
/restart - restart bot
/stop - stop the bot";

const VERSION_TEXT: &str = concat!("Server Monitor Bot v", env!("CARGO_PKG_VERSION"));

/// Grace period for joining tracked fire-and-forget deletions on the way
/// out; expiry sleepers are already disarmed by the shutdown purge.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const RESTART_MARKER_MAX_AGE_MS: i64 = 30_000;

/// How the run loop ended. `Restart` leaves relaunching to the external
/// supervisor; `Stop` is permanent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitMode {
    Restart,
    Stop,
}

#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    cfg: Arc<Config>,
    transport: Arc<dyn Transport>,
    metrics: Arc<dyn MetricsSource>,
    ledger: MessageLedger,
    lifecycle: Lifecycle,
    run: RunFlag,
    tasks: TaskTracker,
    halt: CancellationToken,
    stop_permanent: AtomicBool,
}

/// Written by the restart handler and consumed (best-effort) by the next
/// process start to flip the "Restarting..." notice to a confirmation.
#[derive(Debug, Serialize, Deserialize)]
struct RestartMarker {
    chat_id: i64,
    message_id: i32,
    timestamp: i64,
}

impl Bot {
    pub fn new(
        cfg: Arc<Config>,
        transport: Arc<dyn Transport>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        let ledger = MessageLedger::new();
        let run = RunFlag::new();
        let tasks = TaskTracker::new();
        let lifecycle = Lifecycle::new(
            cfg.clone(),
            transport.clone(),
            ledger.clone(),
            run.clone(),
            tasks.clone(),
        );

        Self {
            inner: Arc::new(BotInner {
                cfg,
                transport,
                metrics,
                ledger,
                lifecycle,
                run,
                tasks,
                halt: CancellationToken::new(),
                stop_permanent: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    pub(crate) fn tasks(&self) -> &TaskTracker {
        &self.inner.tasks
    }

    fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    /// Run until a restart or stop command (or a dead event channel) ends the
    /// dispatch loop. The supervisor and the status publisher run as
    /// independent tasks gated by the shared run flag.
    pub async fn run(&self, events: mpsc::Receiver<CommandEvent>) -> ExitMode {
        self.confirm_restart().await;

        let supervisor = ReconnectSupervisor::new(
            self.inner.cfg.clone(),
            self.inner.transport.clone(),
            self.inner.run.clone(),
        );
        tokio::spawn(async move { supervisor.run().await });

        let publisher = StatusPublisher::new(
            self.inner.cfg.clone(),
            self.inner.transport.clone(),
            self.inner.metrics.clone(),
            self.inner.ledger.clone(),
            self.inner.lifecycle.clone(),
            self.inner.run.clone(),
        );
        tokio::spawn(async move { publisher.run().await });

        dispatcher::run(self.clone(), events, self.inner.halt.clone()).await;

        self.inner.tasks.close();
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.inner.tasks.wait()).await;

        if self.inner.stop_permanent.load(Ordering::SeqCst) {
            ExitMode::Stop
        } else {
            ExitMode::Restart
        }
    }

    pub(crate) async fn handle(&self, cmd: Command, event: CommandEvent) {
        match cmd {
            Command::Status => self.handle_status(event).await,
            Command::Clean => self.handle_clean(event).await,
            Command::Help => self.handle_help(event).await,
            Command::Version => self.handle_version(event).await,
            Command::Logs => self.handle_logs(event).await,
            Command::Update => self.handle_update(event).await,
            Command::Restart => self.handle_restart(event).await,
            Command::Stop => self.handle_stop(event).await,
        }
    }

    /// Manual status: replaces the chat's status message like the periodic
    /// publisher does, and is itself a status message (slot, not live set).
    async fn handle_status(&self, event: CommandEvent) {
        self.inner.lifecycle.discard_command(&event);
        self.inner.lifecycle.discard_status(event.chat_id).await;

        let report = match self.inner.metrics.status().await {
            Ok(report) => report,
            Err(e) => {
                error!("status snapshot error: {e}");
                self.inner
                    .lifecycle
                    .publish_reply(&event, &format!("Status error: {e}"))
                    .await;
                return;
            }
        };
        let text = format!("{report}\n{}", StatusTag::Manual);

        let Some(message_id) = util::safe_respond(self.transport(), &event, &text).await else {
            return;
        };
        let _ = self.inner.ledger.set_status(event.chat_id, message_id).await;
    }

    async fn handle_clean(&self, event: CommandEvent) {
        self.inner.lifecycle.discard_command(&event);
        self.inner.lifecycle.clean_chat(event.chat_id).await;
    }

    async fn handle_help(&self, event: CommandEvent) {
        self.inner.lifecycle.discard_command(&event);
        self.inner.lifecycle.publish_reply(&event, HELP_TEXT).await;
    }

    async fn handle_version(&self, event: CommandEvent) {
        self.inner.lifecycle.discard_command(&event);
        self.inner.lifecycle.publish_reply(&event, VERSION_TEXT).await;
    }

    async fn handle_logs(&self, event: CommandEvent) {
        self.inner.lifecycle.discard_command(&event);

        let cfg = &self.inner.cfg;
        let reply = match logs::read_tail(&cfg.log_path, cfg.log_tail_limit).await {
            Ok(tail) => format!("{}:\n{tail}", cfg.log_path.display()),
            Err(e) => {
                error!("logs reading error: {e}");
                format!("Logs reading error: {e}")
            }
        };
        self.inner.lifecycle.publish_reply(&event, &reply).await;
    }

    async fn handle_update(&self, event: CommandEvent) {
        self.inner.lifecycle.discard_command(&event);

        let reply = match vcs::pull(&self.inner.cfg.repo_dir).await {
            Ok(()) => "Updated".to_string(),
            Err(e) => {
                error!("update error: {e}");
                format!("Update error: {e}")
            }
        };
        self.inner.lifecycle.publish_reply(&event, &reply).await;
    }

    async fn handle_restart(&self, event: CommandEvent) {
        let notice = util::safe_respond(self.transport(), &event, "Restarting...").await;

        self.inner.lifecycle.shutdown(&event).await;

        if let Some(message_id) = notice {
            self.write_restart_marker(event.chat_id, message_id);
        }
        info!("restart");
        self.inner.halt.cancel();
    }

    async fn handle_stop(&self, event: CommandEvent) {
        self.inner.lifecycle.shutdown(&event).await;

        self.inner.stop_permanent.store(true, Ordering::SeqCst);
        self.inner.transport.disconnect().await;
        info!("bot has been stopped");
        self.inner.halt.cancel();
    }

    fn write_restart_marker(&self, chat_id: ChatId, message_id: MessageId) {
        let marker = RestartMarker {
            chat_id: chat_id.0,
            message_id: message_id.0,
            timestamp: Utc::now().timestamp_millis(),
        };
        match serde_json::to_string(&marker) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.inner.cfg.restart_file, json) {
                    warn!("writing restart marker failed: {e}");
                }
            }
            Err(e) => warn!("encoding restart marker failed: {e}"),
        }
    }

    /// If the previous process left a fresh restart marker, flip its
    /// "Restarting..." notice to a confirmation. Best-effort.
    async fn confirm_restart(&self) {
        let path = &self.inner.cfg.restart_file;
        if !path.exists() {
            return;
        }

        let marker = fs::read_to_string(path)
            .ok()
            .and_then(|txt| serde_json::from_str::<RestartMarker>(&txt).ok());
        let _ = fs::remove_file(path);

        let Some(marker) = marker else {
            return;
        };
        let age = Utc::now().timestamp_millis().saturating_sub(marker.timestamp);
        if age >= RESTART_MARKER_MAX_AGE_MS {
            return;
        }

        let msg = MessageRef {
            chat_id: ChatId(marker.chat_id),
            message_id: MessageId(marker.message_id),
        };
        if let Err(e) = self.inner.transport.edit(msg, "Bot restarted").await {
            warn!("restart confirmation failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::Config;
    use crate::testutil::{command_event, test_config, RecordingTransport, StaticMetrics};

    fn marker_path(name: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/srvmon-marker-{}-{name}.json", std::process::id()))
    }

    fn bot_with(cfg: Config) -> (Arc<RecordingTransport>, Bot) {
        let transport = Arc::new(RecordingTransport::new());
        let metrics = Arc::new(StaticMetrics::new("CPU - 1.0%"));
        let bot = Bot::new(Arc::new(cfg), transport.clone(), metrics);
        (transport, bot)
    }

    #[tokio::test]
    async fn manual_status_replaces_the_slot() {
        let (transport, bot) = bot_with(test_config());
        let chat = ChatId(7);

        bot.inner.ledger.set_status(chat, MessageId(9000)).await;
        bot.handle(Command::Status, command_event(chat, 1, "/status"))
            .await;

        let sent = transport.sent_texts();
        assert!(sent.iter().any(|t| t.ends_with("Manual")));

        let new_id = transport.last_sent_id().expect("status sent");
        assert_eq!(bot.inner.ledger.take_status(chat).await, Some(new_id));
    }

    #[tokio::test]
    async fn stop_disconnects_and_marks_the_exit_permanent() {
        let (transport, bot) = bot_with(test_config());
        transport.force_connected();

        bot.handle(Command::Stop, command_event(ChatId(7), 1, "/stop"))
            .await;

        assert!(!bot.inner.run.is_running());
        assert!(!transport.is_connected_now());
        assert!(bot.inner.stop_permanent.load(Ordering::SeqCst));
        assert!(bot.inner.halt.is_cancelled());
    }

    #[tokio::test]
    async fn restart_marker_round_trip_edits_the_notice() {
        let mut cfg = test_config();
        cfg.restart_file = marker_path("round-trip");
        let _ = fs::remove_file(&cfg.restart_file);

        let (transport, bot) = bot_with(cfg.clone());
        bot.handle(Command::Restart, command_event(ChatId(7), 1, "/restart"))
            .await;

        assert!(!bot.inner.run.is_running());
        assert!(bot.inner.halt.is_cancelled());
        assert!(cfg.restart_file.exists());

        // Next process start picks the marker up and edits the notice.
        let (transport2, bot2) = bot_with(cfg.clone());
        bot2.confirm_restart().await;

        assert!(!cfg.restart_file.exists());
        let edits = transport2.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].1, "Bot restarted");
        assert_eq!(
            Some(edits[0].0.message_id),
            transport.last_sent_id(),
            "the edited message is the restarting notice"
        );
    }

    #[tokio::test]
    async fn stale_restart_markers_are_discarded() {
        let mut cfg = test_config();
        cfg.restart_file = marker_path("stale");
        let marker = RestartMarker {
            chat_id: 7,
            message_id: 1,
            timestamp: Utc::now().timestamp_millis() - 60_000,
        };
        fs::write(&cfg.restart_file, serde_json::to_string(&marker).unwrap()).unwrap();

        let (transport, bot) = bot_with(cfg.clone());
        bot.confirm_restart().await;

        assert!(!cfg.restart_file.exists());
        assert!(transport.edits().is_empty());
    }
}
