mod config;
mod domain;
mod error;
mod fetch;
mod gemini;
mod logging;
mod mailer;
mod offers;
mod report;
mod runner;
mod scheduler;
mod watch;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load local .env if present (no-op in prod/systemd envs)
    let _ = dotenvy::dotenv();

    logging::init_tracing();

    let cfg = config::Config::from_env()?;
    info!(
        products = cfg.watched_products.len(),
        recipients = cfg.recipient_emails.len(),
        concurrency = cfg.concurrency,
        schedule_time = %cfg.schedule_time,
        timezone = %cfg.timezone,
        "boot"
    );

    let source = Arc::new(gemini::GeminiClient::new(
        cfg.gemini_api_key.clone(),
        cfg.model_name.clone(),
    ));
    let mailer = mailer::Mailer::new(
        &cfg.smtp_host,
        cfg.smtp_port,
        cfg.smtp_user.clone(),
        cfg.smtp_pass.clone(),
        &cfg.smtp_from,
    )?;

    if cfg.run_on_startup {
        watch::run_once(Arc::clone(&source), &mailer, &cfg).await?;
    }

    let schedule_time = cfg.schedule_time;
    let timezone = cfg.timezone;
    scheduler::run_forever(schedule_time, timezone, move || {
        let source = Arc::clone(&source);
        let mailer = mailer.clone();
        let cfg = cfg.clone();
        async move { watch::run_once(source, &mailer, &cfg).await }
    })
    .await
}
