//! Recording transport and metrics fakes shared by the async tests.

use std::sync::{
    atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{
    config::Config,
    domain::{ChatId, MessageId, MessageRef, UserId},
    metrics::MetricsSource,
    transport::{CommandEvent, Transport},
    Error, Result,
};

pub(crate) fn test_config() -> Config {
    use std::time::Duration;
    Config {
        bot_token: "x".to_string(),
        allowed_chats: vec![7, 42],
        admin_users: vec![1],
        status_chats: vec![42],
        connection_retry_delay: Duration::from_millis(40),
        status_update_interval: Duration::from_millis(50),
        status_update_start_delay: Duration::from_millis(0),
        message_lifetime: Duration::from_millis(40),
        log_path: "/tmp/srvmon-test.log".into(),
        log_tail_limit: 2048,
        delete_status_messages: true,
        delete_command_messages: true,
        delete_reply_messages: true,
        general_commands: ["status", "clean", "help", "version"]
            .map(str::to_string)
            .to_vec(),
        admin_commands: ["logs", "update", "restart", "stop"]
            .map(str::to_string)
            .to_vec(),
        repo_dir: ".".into(),
        restart_file: "/tmp/srvmon-test-restart.json".into(),
    }
}

pub(crate) fn command_event(chat_id: ChatId, user_id: i64, text: &str) -> CommandEvent {
    CommandEvent {
        chat_id,
        user_id: UserId(user_id),
        message_id: MessageId(777),
        text: text.to_string(),
    }
}

pub(crate) struct RecordingTransport {
    next_id: AtomicI32,
    connects: AtomicUsize,
    deleted_events: AtomicUsize,
    fail_sends: AtomicBool,
    fail_deletes: AtomicBool,
    fail_connects: AtomicBool,
    sends: Mutex<Vec<(ChatId, MessageId, String)>>,
    deletes: Mutex<Vec<(ChatId, Vec<MessageId>)>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        let (connected_tx, connected_rx) = watch::channel(false);
        Self {
            next_id: AtomicI32::new(1),
            connects: AtomicUsize::new(0),
            deleted_events: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_connects: AtomicBool::new(false),
            sends: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            connected_tx,
            connected_rx,
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub fn force_connected(&self) {
        let _ = self.connected_tx.send(true);
    }

    pub fn drop_connection(&self) {
        let _ = self.connected_tx.send(false);
    }

    pub fn is_connected_now(&self) -> bool {
        *self.connected_rx.borrow()
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, text)| text.clone())
            .collect()
    }

    pub fn last_sent_id(&self) -> Option<MessageId> {
        self.sends.lock().unwrap().last().map(|(_, id, _)| *id)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    /// Number of delete calls that targeted `message_id` in `chat_id`.
    pub fn deletes_of(&self, chat_id: ChatId, message_id: MessageId) -> usize {
        self.deletes
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, ids)| *chat == chat_id && ids.contains(&message_id))
            .count()
    }

    pub fn deleted_events(&self) -> usize {
        self.deleted_events.load(Ordering::SeqCst)
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    fn alloc(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".to_string()));
        }
        let _ = self.connected_tx.send(true);
        Ok(())
    }

    async fn disconnect(&self) {
        let _ = self.connected_tx.send(false);
    }

    fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    async fn wait_disconnected(&self) {
        let mut rx = self.connected_rx.clone();
        let _ = rx.wait_for(|connected| !connected).await;
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("send failed".to_string()));
        }
        let message_id = self.alloc();
        self.sends
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(message_id)
    }

    async fn respond(&self, event: &CommandEvent, text: &str) -> Result<MessageId> {
        self.send(event.chat_id, text).await
    }

    async fn edit(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Transport("delete failed".to_string()));
        }
        self.deletes
            .lock()
            .unwrap()
            .push((chat_id, message_ids.to_vec()));
        Ok(())
    }

    async fn delete_event(&self, _event: &CommandEvent) -> Result<()> {
        self.deleted_events.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Deterministic metrics source for publisher and handler tests.
pub(crate) struct StaticMetrics {
    report: String,
    fail_with: Option<String>,
}

impl StaticMetrics {
    pub fn new(report: &str) -> Self {
        Self {
            report: report.to_string(),
            fail_with: None,
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            report: String::new(),
            fail_with: Some(error.to_string()),
        }
    }
}

#[async_trait]
impl MetricsSource for StaticMetrics {
    async fn status(&self) -> Result<String> {
        match &self.fail_with {
            Some(error) => Err(Error::Collaborator(error.clone())),
            None => Ok(self.report.clone()),
        }
    }
}
