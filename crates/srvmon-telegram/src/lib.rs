//! Telegram transport adapter (teloxide).
//!
//! Implements the srvmon-core transport port over the Telegram Bot API. The
//! Bot API speaks HTTP long polling, so "connected" here means a healthy
//! polling task: `connect` verifies credentials and starts the poll loop, and
//! a polling failure flips the connection state, which wakes the supervisor.

use async_trait::async_trait;

use teloxide::{prelude::*, requests::Request, types::UpdateKind};

use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use srvmon_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    transport::{CommandEvent, Transport},
    Result,
};

const POLL_TIMEOUT_SECS: u32 = 25;

pub struct TelegramTransport {
    bot: Bot,
    events: mpsc::Sender<CommandEvent>,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    poll: Mutex<PollState>,
}

#[derive(Default)]
struct PollState {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl TelegramTransport {
    pub fn new(token: &str, events: mpsc::Sender<CommandEvent>) -> Self {
        Self::with_bot(Bot::new(token.to_string()), events)
    }

    pub fn with_bot(bot: Bot, events: mpsc::Sender<CommandEvent>) -> Self {
        let (connected_tx, connected_rx) = watch::channel(false);
        Self {
            bot,
            events,
            connected_tx,
            connected_rx,
            poll: Mutex::new(PollState::default()),
        }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Transport(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    async fn stop_polling(&self) {
        let (cancel, task) = {
            let mut st = self.poll.lock().await;
            (st.cancel.take(), st.task.take())
        };
        if let Some(tok) = cancel {
            tok.cancel();
        }
        if let Some(handle) = task {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn connect(&self) -> Result<()> {
        self.stop_polling().await;

        let me = self.with_retry(|| self.bot.get_me()).await?;
        info!("authorized as @{}", me.username());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_updates(
            self.bot.clone(),
            self.events.clone(),
            self.connected_tx.clone(),
            cancel.clone(),
        ));

        let mut st = self.poll.lock().await;
        st.cancel = Some(cancel);
        st.task = Some(task);
        let _ = self.connected_tx.send(true);
        Ok(())
    }

    async fn disconnect(&self) {
        let _ = self.connected_tx.send(false);
        self.stop_polling().await;
    }

    fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    async fn wait_disconnected(&self) {
        let mut rx = self.connected_rx.clone();
        let _ = rx.wait_for(|connected| !connected).await;
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(MessageId(msg.id.0))
    }

    async fn respond(&self, event: &CommandEvent, text: &str) -> Result<MessageId> {
        self.send(event.chat_id, text).await
    }

    async fn edit(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<()> {
        // The Bot API has no bulk delete; issue one call per id and report
        // the first failure after trying them all.
        let mut first_err = None;
        for &message_id in message_ids {
            let res = self
                .with_retry(|| {
                    self.bot
                        .delete_message(Self::tg_chat(chat_id), Self::tg_msg_id(message_id))
                })
                .await;
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    async fn delete_event(&self, event: &CommandEvent) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(event.chat_id), Self::tg_msg_id(event.message_id))
        })
        .await?;
        Ok(())
    }
}

/// Long-poll loop: forwards text messages as command events until cancelled
/// or until the API errors, which counts as a connection loss.
async fn poll_updates(
    bot: Bot,
    events: mpsc::Sender<CommandEvent>,
    connected: watch::Sender<bool>,
    cancel: CancellationToken,
) {
    let mut offset: i32 = 0;

    loop {
        let request = bot.get_updates().offset(offset).timeout(POLL_TIMEOUT_SECS);
        let updates = tokio::select! {
            _ = cancel.cancelled() => return,
            res = request.send() => res,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                warn!("polling error: {e}");
                let _ = connected.send(false);
                return;
            }
        };

        for update in updates {
            offset = offset.max(update.id + 1);

            let UpdateKind::Message(msg) = update.kind else {
                continue;
            };
            let Some(text) = msg.text() else {
                continue;
            };
            let Some(user) = msg.from() else {
                continue;
            };

            let event = CommandEvent {
                chat_id: ChatId(msg.chat.id.0),
                user_id: UserId(user.id.0 as i64),
                message_id: MessageId(msg.id.0),
                text: text.to_string(),
            };
            tokio::select! {
                _ = cancel.cancelled() => return,
                res = events.send(event) => {
                    if res.is_err() {
                        // Receiver dropped: the dispatch loop is gone.
                        return;
                    }
                }
            }
        }
    }
}
