use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::fetch::{OfferSource, RetryPolicy, BASE_BACKOFF};
use crate::mailer::ReportSink;
use crate::report;
use crate::runner::{self, BatchPolicy};

/// One full price-watch run: batch-fetch the watch-list, assemble the
/// report, deliver it.
pub async fn run_once<S, K>(source: Arc<S>, sink: &K, cfg: &Config) -> Result<()>
where
    S: OfferSource + ?Sized + 'static,
    K: ReportSink + ?Sized,
{
    let started = Instant::now();
    info!(
        products = cfg.watched_products.len(),
        recipients = cfg.recipient_emails.len(),
        "price watch run starting"
    );

    let policy = BatchPolicy {
        concurrency: cfg.concurrency,
        max_results: cfg.max_results_per_product,
        trusted_sellers: cfg.trusted_sellers.clone(),
        retry: RetryPolicy {
            timeout: cfg.request_timeout,
            retries: cfg.request_retries,
            base_backoff: BASE_BACKOFF,
        },
    };

    let results = runner::run_batch(source, &cfg.watched_products, &policy).await?;
    let report = report::build_report(&results);
    sink.deliver(&cfg.recipient_emails, &report).await?;

    let failures = results.iter().filter(|r| r.is_failed()).count();
    info!(
        duration_ms = started.elapsed().as_millis() as u64,
        products_processed = results.len(),
        failures,
        "price watch run completed"
    );
    Ok(())
}
