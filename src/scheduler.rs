use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Days, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{error, info};

/// Time until the next daily run at `at` in `tz`, from `now`. If today's
/// slot already passed, the next one is tomorrow's.
pub fn next_run_delay(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> Duration {
    let today = now.with_timezone(&tz).date_naive();
    let mut target = resolve_local(tz, today.and_time(at));
    if target <= now {
        let tomorrow = today
            .checked_add_days(Days::new(1))
            .unwrap_or(today)
            .and_time(at);
        target = resolve_local(tz, tomorrow);
    }
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        // DST gap: the wall-clock time does not exist, shift one hour forward.
        LocalResult::None => match tz.from_local_datetime(&(naive + chrono::Duration::hours(1))) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            LocalResult::None => Utc.from_utc_datetime(&naive),
        },
    }
}

/// Daily run loop. A failed run is logged and the loop keeps going; only
/// process shutdown stops it.
pub async fn run_forever<F, Fut>(at: NaiveTime, tz: Tz, job: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        let delay = next_run_delay(Utc::now(), at, tz);
        info!(delay_secs = delay.as_secs(), "scheduler waiting for next run");
        tokio::time::sleep(delay).await;

        if let Err(err) = job().await {
            error!(error = %err, "scheduled run failed");
        }
    }
}
