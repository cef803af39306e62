use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Returned when a suspension point observes a cancellation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

/// RFC3339 timestamp in UTC (for job bookkeeping).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

/// Sleep for `dur` unless `cancel` fires first.
///
/// Every pipeline suspension point (pacing, throttle wait, cooldown) goes through here,
/// so a cancelled job never sleeps past the request.
pub async fn pause(cancel: &CancellationToken, dur: Duration) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    if dur.is_zero() {
        return Ok(());
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(Cancelled),
        _ = sleep(dur) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_full_duration() {
        let tok = CancellationToken::new();
        let start = Instant::now();
        pause(&tok, Duration::from_secs(30)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_interrupted_by_cancel() {
        let tok = CancellationToken::new();
        let child = tok.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            child.cancel();
        });

        let start = Instant::now();
        assert_eq!(pause(&tok, Duration::from_secs(1800)).await, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn pause_fails_fast_when_already_cancelled() {
        let tok = CancellationToken::new();
        tok.cancel();
        assert_eq!(pause(&tok, Duration::ZERO).await, Err(Cancelled));
    }
}
