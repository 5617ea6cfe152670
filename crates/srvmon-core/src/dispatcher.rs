//! Inbound command routing.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{bot::Bot, config::Config, transport::CommandEvent};

/// The command set, two tiers; tier membership comes from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Status,
    Clean,
    Help,
    Version,
    Logs,
    Update,
    Restart,
    Stop,
}

impl Command {
    /// Normalize inbound text into a command: trimmed, case-insensitive,
    /// optional leading `/`, optional `@botname` suffix. Anything with
    /// trailing arguments or an unknown name is not a command.
    pub fn parse(text: &str) -> Option<Command> {
        let mut parts = text.trim().split_whitespace();
        let first = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        match name.as_str() {
            "status" => Some(Self::Status),
            "clean" => Some(Self::Clean),
            "help" => Some(Self::Help),
            "version" => Some(Self::Version),
            "logs" => Some(Self::Logs),
            "update" => Some(Self::Update),
            "restart" => Some(Self::Restart),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Clean => "clean",
            Self::Help => "help",
            Self::Version => "version",
            Self::Logs => "logs",
            Self::Update => "update",
            Self::Restart => "restart",
            Self::Stop => "stop",
        }
    }
}

/// Resolves which command, if any, an inbound event dispatches to.
///
/// Admin-tier commands additionally require the sender to be in the admin
/// allow-list; an admin command from anyone else resolves to nothing at all
/// (no handler, no reply). Commands absent from both tiers are disabled.
pub struct CommandTable {
    general: HashSet<String>,
    admin: HashSet<String>,
    admin_users: HashSet<i64>,
    allowed_chats: HashSet<i64>,
}

impl CommandTable {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            general: cfg.general_commands.iter().cloned().collect(),
            admin: cfg.admin_commands.iter().cloned().collect(),
            admin_users: cfg.admin_users.iter().copied().collect(),
            allowed_chats: cfg.allowed_chats.iter().copied().collect(),
        }
    }

    pub fn resolve(&self, event: &CommandEvent) -> Option<Command> {
        if !self.allowed_chats.contains(&event.chat_id.0) {
            return None;
        }

        let cmd = Command::parse(&event.text)?;
        let name = cmd.name();

        if self.admin.contains(name) {
            return self.admin_users.contains(&event.user_id.0).then_some(cmd);
        }
        self.general.contains(name).then_some(cmd)
    }
}

/// Dispatch loop: exactly one handler fires per matched event, spawned as an
/// independent task so a handler sitting in its delayed-delete wait never
/// blocks the next inbound event.
pub async fn run(bot: Bot, mut events: mpsc::Receiver<CommandEvent>, halt: CancellationToken) {
    let table = CommandTable::from_config(bot.config());

    loop {
        let event = tokio::select! {
            _ = halt.cancelled() => break,
            maybe = events.recv() => match maybe {
                Some(event) => event,
                None => break, // transport side is gone
            },
        };

        let Some(cmd) = table.resolve(&event) else {
            continue;
        };
        debug!("dispatching {} for chat {}", cmd.name(), event.chat_id.0);

        let worker = bot.clone();
        bot.tasks()
            .spawn(async move { worker.handle(cmd, event).await });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::domain::ChatId;
    use crate::testutil::{command_event, test_config, RecordingTransport, StaticMetrics};

    #[test]
    fn parse_normalizes_case_slash_and_botname() {
        assert_eq!(Command::parse("status"), Some(Command::Status));
        assert_eq!(Command::parse("/STATUS"), Some(Command::Status));
        assert_eq!(Command::parse("/status@srvmon_bot"), Some(Command::Status));
        assert_eq!(Command::parse("  help  "), Some(Command::Help));
        assert_eq!(Command::parse("/stop"), Some(Command::Stop));

        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("nonsense"), None);
        assert_eq!(Command::parse("status now"), None);
        assert_eq!(Command::parse("/statusx"), None);
    }

    #[test]
    fn admin_command_from_non_admin_never_dispatches() {
        let cfg = test_config();
        let table = CommandTable::from_config(&cfg);

        let event = command_event(ChatId(7), 99, "/restart");
        assert_eq!(table.resolve(&event), None);

        let event = command_event(ChatId(7), 1, "/restart");
        assert_eq!(table.resolve(&event), Some(Command::Restart));
    }

    #[test]
    fn unknown_chats_and_disabled_commands_are_ignored() {
        let mut cfg = test_config();
        cfg.general_commands = vec!["help".to_string()];
        let table = CommandTable::from_config(&cfg);

        assert_eq!(table.resolve(&command_event(ChatId(999), 1, "/help")), None);
        assert_eq!(table.resolve(&command_event(ChatId(7), 99, "/help")), Some(Command::Help));
        // `version` is in neither tier in this config.
        assert_eq!(table.resolve(&command_event(ChatId(7), 99, "/version")), None);
    }

    #[test]
    fn tier_placement_follows_configuration() {
        let mut cfg = test_config();
        cfg.general_commands.push("logs".to_string());
        cfg.admin_commands.retain(|c| c != "logs");
        let table = CommandTable::from_config(&cfg);

        let event = command_event(ChatId(7), 99, "/logs");
        assert_eq!(table.resolve(&event), Some(Command::Logs));
    }

    #[tokio::test]
    async fn dispatch_loop_routes_matched_events_only() {
        let cfg = Arc::new(test_config());
        let transport = Arc::new(RecordingTransport::new());
        let metrics = Arc::new(StaticMetrics::new("CPU - 1.0%"));
        let bot = Bot::new(cfg, transport.clone(), metrics);

        let (tx, rx) = mpsc::channel(8);
        let halt = CancellationToken::new();
        let loop_task = tokio::spawn(run(bot, rx, halt.clone()));

        tx.send(command_event(ChatId(7), 99, "/version"))
            .await
            .unwrap();
        tx.send(command_event(ChatId(7), 99, "/restart"))
            .await
            .unwrap();
        tx.send(command_event(ChatId(7), 99, "gibberish"))
            .await
            .unwrap();

        sleep(Duration::from_millis(50)).await;
        let sent = transport.sent_texts();
        assert_eq!(sent.len(), 1, "only /version should have produced a reply");
        assert!(sent[0].contains("Server Monitor Bot"));

        halt.cancel();
        loop_task.await.unwrap();
    }
}
