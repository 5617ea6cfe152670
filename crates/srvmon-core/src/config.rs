use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration for the bot, loaded from the environment (with `.env`
/// support).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    /// Chats the bot listens to.
    pub allowed_chats: Vec<i64>,
    /// Senders allowed to use admin-tier commands.
    pub admin_users: Vec<i64>,
    /// Chats the periodic status publisher posts to.
    pub status_chats: Vec<i64>,

    // Timing
    pub connection_retry_delay: Duration,
    pub status_update_interval: Duration,
    pub status_update_start_delay: Duration,
    pub message_lifetime: Duration,

    // Log tailing
    pub log_path: PathBuf,
    pub log_tail_limit: usize,

    // Auto-delete flags
    /// False declares status messages persistent: they are never removed when
    /// a fresh one is published.
    pub delete_status_messages: bool,
    /// Delete the inbound command message itself after handling it.
    pub delete_command_messages: bool,
    /// Expire ordinary replies after `message_lifetime`.
    pub delete_reply_messages: bool,

    // Command tiers
    pub general_commands: Vec<String>,
    pub admin_commands: Vec<String>,

    // Source control
    pub repo_dir: PathBuf,

    // Restart marker
    pub restart_file: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let allowed_chats = parse_csv_i64(env_str("TELEGRAM_CHAT_IDS"));

        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        if allowed_chats.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_CHAT_IDS environment variable is required".to_string(),
            ));
        }

        let admin_users = parse_csv_i64(env_str("TELEGRAM_ADMIN_IDS"));

        // Status recipients default to every allowed chat.
        let mut status_chats = parse_csv_i64(env_str("STATUS_CHAT_IDS"));
        if status_chats.is_empty() {
            status_chats = allowed_chats.clone();
        }

        // Timing
        let connection_retry_delay =
            Duration::from_secs(env_u64("CONNECTION_RETRY_DELAY").unwrap_or(60));
        let status_update_interval =
            Duration::from_secs(env_u64("STATUS_UPDATE_INTERVAL").unwrap_or(600));
        let status_update_start_delay =
            Duration::from_secs(env_u64("STATUS_UPDATE_START_DELAY").unwrap_or(15));
        let message_lifetime = Duration::from_secs(env_u64("MESSAGE_LIFETIME").unwrap_or(30));

        // Log tailing
        let log_path = PathBuf::from(env_str("LOG_PATH").unwrap_or("logs/bot.log".to_string()));
        let log_tail_limit = env_usize("LOG_TAIL_LIMIT").unwrap_or(2048);

        // Auto-delete flags
        let delete_status_messages = env_bool("DELETE_STATUS_MESSAGES").unwrap_or(true);
        let delete_command_messages = env_bool("DELETE_COMMAND_MESSAGES").unwrap_or(true);
        let delete_reply_messages = env_bool("DELETE_REPLY_MESSAGES").unwrap_or(true);

        // Command tiers (admin placement of `logs` is a deployment choice).
        let general_commands = parse_csv_lower(
            env_str("GENERAL_COMMANDS").or_else(|| Some("status,clean,help,version".to_string())),
        );
        let admin_commands = parse_csv_lower(
            env_str("ADMIN_COMMANDS").or_else(|| Some("logs,update,restart,stop".to_string())),
        );

        let repo_dir = PathBuf::from(env_str("REPO_DIR").unwrap_or(".".to_string()));

        let restart_file = PathBuf::from(
            env_str("RESTART_FILE").unwrap_or("/tmp/srvmon-restart.json".to_string()),
        );

        Ok(Self {
            bot_token,
            allowed_chats,
            admin_users,
            status_chats,
            connection_retry_delay,
            status_update_interval,
            status_update_start_delay,
            message_lifetime,
            log_path,
            log_tail_limit,
            delete_status_messages,
            delete_command_messages,
            delete_reply_messages,
            general_commands,
            admin_commands,
            repo_dir,
            restart_file,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
