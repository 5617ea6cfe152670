use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

use srvmon_core::{
    bot::{Bot, ExitMode},
    config::Config,
    logging,
    metrics::SystemMetrics,
};
use srvmon_telegram::TelegramTransport;

const EVENT_QUEUE_SIZE: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Arc::new(Config::load().context("loading configuration")?);
    logging::init("srvmon", &cfg.log_path).context("initializing logging")?;

    info!("start");

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let transport = Arc::new(TelegramTransport::new(&cfg.bot_token, events_tx));
    let metrics = Arc::new(SystemMetrics::new());

    let bot = Bot::new(cfg, transport, metrics);
    match bot.run(events_rx).await {
        ExitMode::Restart => info!("exiting for restart"),
        ExitMode::Stop => info!("exit"),
    }

    Ok(())
}
