use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    errors::TransportError,
    transport::port::TransportResult,
    utils::{pause, Cancelled},
};

/// How many consecutive throttle signals a single call site tolerates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// `None` retries for as long as the platform keeps asking us to wait.
    pub max_retries: Option<u32>,
}

/// Why a throttle-aware call did not produce a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallError {
    Cancelled,
    Failed(TransportError),
}

impl From<Cancelled> for CallError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Run `op`, absorbing `Throttled` signals by waiting and re-issuing the identical request.
///
/// A result that arrives after cancellation was requested is discarded.
pub async fn call_with_throttle<T, F, Fut>(
    cancel: &CancellationToken,
    policy: ThrottlePolicy,
    label: &str,
    mut op: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TransportResult<T>>,
{
    let mut throttled = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        let res = op().await;
        if cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        match res {
            Ok(v) => return Ok(v),
            Err(TransportError::Throttled { retry_after }) => {
                if policy.max_retries.is_some_and(|max| throttled >= max) {
                    return Err(CallError::Failed(TransportError::Throttled { retry_after }));
                }
                throttled += 1;
                warn!(
                    op = label,
                    retry_after_secs = retry_after.as_secs(),
                    attempt = throttled,
                    "throttled by platform, waiting before retry"
                );
                pause(cancel, retry_after).await?;
            }
            Err(e) => return Err(CallError::Failed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn throttled(secs: u64) -> TransportError {
        TransportError::Throttled {
            retry_after: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_exactly_retry_after_then_reissues() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let tok = CancellationToken::new();
        let start = Instant::now();

        let v = call_with_throttle(&tok, ThrottlePolicy::default(), "fetch", move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(throttled(17)),
                _ => Ok(42),
            }
        })
        .await
        .unwrap();

        assert_eq!(v, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(17));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_cap_turns_throttle_into_failure() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let tok = CancellationToken::new();
        let policy = ThrottlePolicy {
            max_retries: Some(2),
        };

        let res: Result<(), _> = call_with_throttle(&tok, policy, "send", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(throttled(1))
        })
        .await;

        assert_eq!(res, Err(CallError::Failed(throttled(1))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let tok = CancellationToken::new();

        let res: Result<(), _> = call_with_throttle(&tok, ThrottlePolicy::default(), "send", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Network("reset".to_string()))
        })
        .await;

        assert_eq!(
            res,
            Err(CallError::Failed(TransportError::Network("reset".to_string())))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn result_is_discarded_when_cancelled_in_flight() {
        let tok = CancellationToken::new();
        let t = &tok;
        let res = call_with_throttle(&tok, ThrottlePolicy::default(), "send", move || async move {
            t.cancel();
            Ok(1)
        })
        .await;
        assert_eq!(res, Err(CallError::Cancelled));
    }
}
