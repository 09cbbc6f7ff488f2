//! Digest bot binary entrypoint.
//! Loads credentials and settings, builds the single bot client, and hands it
//! to the scheduler and the interactive listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use digest_bot::config::{load_settings_default, Credentials};
use digest_bot::cycle::Aggregator;
use digest_bot::delivery::telegram::TelegramBot;
use digest_bot::delivery::ChatId;
use digest_bot::listener::{help_text, InteractiveListener};
use digest_bot::metrics::Metrics;
use digest_bot::scheduler::Scheduler;
use digest_bot::supervisor::Supervisor;
use digest_bot::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let creds = Credentials::from_env()?;
    let settings = load_settings_default()?;
    info!(
        token_len = creds.token.len(),
        chat_id = %creds.chat_id,
        sources = settings.sources.len(),
        schedule = ?settings.schedule.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "digest bot starting"
    );

    let bot = Arc::new(TelegramBot::new(creds.token.clone()));
    let http = reqwest::Client::builder()
        .timeout(settings.fetch_timeout())
        .build()
        .context("building source http client")?;

    let aggregator = Arc::new(Aggregator::from_settings(
        &settings,
        http,
        bot.clone(),
        ChatId::new(creds.chat_id.clone()),
    ));

    let scheduler = Scheduler::new(settings.schedule.clone(), aggregator.clone(), settings.tick());
    let listener = InteractiveListener::new(
        bot,
        aggregator,
        &settings.status_source,
        help_text(&settings.schedule),
    );

    let supervisor = Supervisor::new();

    if let Some(addr) = settings.metrics_addr.as_deref() {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid metrics address `{addr}`"))?;
        let metrics = Metrics::init()?;
        let token = supervisor.shutdown_token();
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(addr, token).await {
                error!(error = %e, "metrics endpoint stopped");
            }
        });
    }

    supervisor.run_until_signal(scheduler, listener).await
}
