use std::sync::Arc;

use anyhow::{ensure, Result};
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::domain::{BatchResult, ProductOutcome};
use crate::fetch::{fetch_with_resilience, OfferSource, RetryPolicy};
use crate::offers;

/// Run-wide knobs for one batch.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    pub concurrency: usize,
    pub max_results: usize,
    pub trusted_sellers: Vec<String>,
    pub retry: RetryPolicy,
}

struct ProductTask {
    input_name: String,
    resolved_name: String,
    disambiguation_note: Option<String>,
}

/// Drives the fetch → normalize pipeline for the whole watch-list.
///
/// At most `policy.concurrency` fetches are in flight at once, gated by a
/// semaphore acquired per task. Outcomes come back in task order no matter
/// which finishes first, and a failing product only ever fails itself; the
/// batch completes once every product has a terminal outcome.
pub async fn run_batch<S>(
    source: Arc<S>,
    products: &[String],
    policy: &BatchPolicy,
) -> Result<BatchResult>
where
    S: OfferSource + ?Sized + 'static,
{
    ensure!(policy.concurrency >= 1, "concurrency cap must be >= 1");

    if products.is_empty() {
        return Ok(vec![]);
    }

    let tasks = resolve_tasks(source.as_ref(), products).await;

    let gate = Arc::new(Semaphore::new(policy.concurrency));
    let trusted = Arc::new(policy.trusted_sellers.clone());

    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        let source = Arc::clone(&source);
        let gate = Arc::clone(&gate);
        let trusted = Arc::clone(&trusted);
        let retry = policy.retry.clone();
        let max_results = policy.max_results;

        handles.push(tokio::spawn(async move {
            // The gate lives as long as every handle; acquire cannot fail.
            let _permit = gate.acquire_owned().await.expect("admission gate closed");
            process_product(source.as_ref(), task, &trusted, max_results, &retry).await
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await?);
    }
    Ok(outcomes)
}

async fn resolve_tasks<S: OfferSource + ?Sized>(
    source: &S,
    products: &[String],
) -> Vec<ProductTask> {
    let mut tasks = Vec::with_capacity(products.len());
    for input in products {
        let models = match source.resolve_models(input).await {
            Ok(models) => models,
            Err(err) => {
                warn!(product = %input, error = %err, "model resolution failed, using input name");
                vec![]
            }
        };

        if models.len() <= 1 {
            let resolved = models.into_iter().next().unwrap_or_else(|| input.clone());
            tasks.push(ProductTask {
                input_name: input.clone(),
                resolved_name: resolved,
                disambiguation_note: None,
            });
        } else {
            let note = format!(
                "Input product was ambiguous. Results are split into up to {} likely models.",
                models.len()
            );
            for model in models {
                tasks.push(ProductTask {
                    input_name: input.clone(),
                    resolved_name: model,
                    disambiguation_note: Some(note.clone()),
                });
            }
        }
    }
    tasks
}

async fn process_product<S: OfferSource + ?Sized>(
    source: &S,
    task: ProductTask,
    trusted_sellers: &[String],
    max_results: usize,
    retry: &RetryPolicy,
) -> ProductOutcome {
    let mut warnings: Vec<String> = task.disambiguation_note.into_iter().collect();

    match fetch_with_resilience(source, &task.resolved_name, retry).await {
        Ok(raw_offers) => {
            let normalized = offers::normalize_and_filter(raw_offers, trusted_sellers, max_results);
            warnings.extend(normalized.warnings);
            ProductOutcome::Ready {
                product_name: task.resolved_name,
                offers: normalized.offers,
                warnings,
            }
        }
        Err(err) => {
            error!(
                input = %task.input_name,
                product = %task.resolved_name,
                error = %err,
                "product processing failed"
            );
            ProductOutcome::Failed {
                product_name: task.resolved_name,
                warnings,
                error: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{RawOffer, TrustLevel};
    use crate::error::FetchError;
    use crate::fetch::BASE_BACKOFF;

    fn sample_offer(price: f64, shipping: f64, store: &str, url: &str) -> RawOffer {
        RawOffer {
            product_name: "p".into(),
            price_amount: price,
            shipping_amount: shipping,
            price_currency: "USD".into(),
            store_name: store.into(),
            product_url: url.into(),
            discount_text: String::new(),
            notes: String::new(),
            ships_to_us: true,
            source_trust_level: TrustLevel::Trusted,
        }
    }

    fn policy(concurrency: usize) -> BatchPolicy {
        BatchPolicy {
            concurrency,
            max_results: 5,
            trusted_sellers: vec!["target".into(), "best buy".into()],
            retry: RetryPolicy {
                timeout: Duration::from_millis(500),
                retries: 0,
                base_backoff: BASE_BACKOFF,
            },
        }
    }

    /// Succeeds for every product except those listed in `failing`; sleeps
    /// `delay` inside each fetch and tracks peak in-flight calls.
    struct FakeSource {
        failing: Vec<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(failing: Vec<String>, delay: Duration) -> Self {
            Self {
                failing,
                delay,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OfferSource for FakeSource {
        async fn fetch_offers(&self, product_name: &str) -> Result<Vec<RawOffer>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|f| f == product_name) {
                return Err(FetchError::MalformedPayload("scripted failure".into()));
            }
            Ok(vec![sample_offer(
                500.0,
                20.0,
                "Target",
                "https://target.com/a",
            )])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_watch_list_yields_empty_batch_without_fetches() {
        let source = Arc::new(FakeSource::new(vec![], Duration::ZERO));
        let result = run_batch(Arc::clone(&source), &[], &policy(3)).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_preserve_input_order() {
        let source = Arc::new(FakeSource::new(vec![], Duration::from_millis(10)));
        let products: Vec<String> = ["alpha", "beta", "gamma", "delta"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = run_batch(source, &products, &policy(4)).await.unwrap();

        assert_eq!(result.len(), products.len());
        for (outcome, product) in result.iter().zip(&products) {
            assert_eq!(outcome.product_name(), product);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_affect_siblings() {
        let source = Arc::new(FakeSource::new(
            vec!["beta".into()],
            Duration::from_millis(10),
        ));
        let products: Vec<String> = ["alpha", "beta", "gamma"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = run_batch(source, &products, &policy(2)).await.unwrap();

        assert_eq!(result.len(), 3);
        assert!(!result[0].is_failed());
        assert!(result[1].is_failed());
        assert!(!result[2].is_failed());

        match &result[1] {
            ProductOutcome::Failed { error, .. } => assert!(!error.is_empty()),
            other => panic!("expected failure for beta, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_cap_bounds_in_flight_fetches() {
        let source = Arc::new(FakeSource::new(vec![], Duration::from_millis(50)));
        let products: Vec<String> = (0..8).map(|i| format!("product-{i}")).collect();

        run_batch(Arc::clone(&source), &products, &policy(2)).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 8);
        assert!(source.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_success_and_failure_shapes() {
        let source = Arc::new(FakeSource::new(vec!["B".into()], Duration::ZERO));
        let products: Vec<String> = vec!["A".into(), "B".into()];

        let result = run_batch(source, &products, &policy(1)).await.unwrap();
        assert_eq!(result.len(), 2);

        match &result[0] {
            ProductOutcome::Ready {
                product_name,
                offers,
                warnings,
            } => {
                assert_eq!(product_name, "A");
                assert_eq!(offers.len(), 1);
                assert_eq!(offers[0].total_amount, 520.0);
                assert_eq!(warnings, &vec![offers::TOO_FEW_OFFERS_WARNING.to_string()]);
            }
            other => panic!("expected success for A, got {other:?}"),
        }

        match &result[1] {
            ProductOutcome::Failed {
                product_name,
                warnings,
                error,
            } => {
                assert_eq!(product_name, "B");
                assert!(warnings.is_empty());
                assert!(!error.is_empty());
            }
            other => panic!("expected failure for B, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_on_every_attempt_then_success_on_last_attempt() {
        // retries = 2 means three attempts; FakeSource fails every time for
        // "bad" so the outcome is terminal failure, not a partial state.
        let mut pol = policy(1);
        pol.retry.retries = 2;

        let source = Arc::new(FakeSource::new(vec!["bad".into()], Duration::ZERO));
        let result = run_batch(Arc::clone(&source), &["bad".to_string()], &pol)
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(result[0].is_failed());
    }

    struct AmbiguousSource;

    #[async_trait]
    impl OfferSource for AmbiguousSource {
        async fn fetch_offers(&self, _product_name: &str) -> Result<Vec<RawOffer>, FetchError> {
            Ok(vec![])
        }

        async fn resolve_models(&self, product_name: &str) -> Result<Vec<String>, FetchError> {
            Ok(vec![
                format!("{product_name} 256GB"),
                format!("{product_name} 512GB"),
            ])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_product_expands_with_note_first() {
        let result = run_batch(Arc::new(AmbiguousSource), &["phone".to_string()], &policy(2))
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        for outcome in &result {
            match outcome {
                ProductOutcome::Ready { warnings, .. } => {
                    assert!(warnings[0].starts_with("Input product was ambiguous."));
                }
                other => panic!("expected success, got {other:?}"),
            }
        }
        assert_eq!(result[0].product_name(), "phone 256GB");
        assert_eq!(result[1].product_name(), "phone 512GB");
    }
}
