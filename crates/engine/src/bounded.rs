//! Remote calls raced against a fixed budget.

use std::{future::Future, time::Duration};

use crate::error::RemoteError;

/// How a bounded call settled.
#[derive(Debug, PartialEq, Eq)]
pub enum Settled<T> {
    Completed(T),
    /// The budget ran out first. The call's future has been dropped, so a
    /// late response can never be observed or applied.
    TimedOut,
}

pub async fn race<F>(budget: Duration, call: F) -> Settled<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(budget, call).await {
        Ok(output) => Settled::Completed(output),
        Err(_) => Settled::TimedOut,
    }
}

/// [`race`] for remote calls, with a timeout folded into [`RemoteError::Timeout`].
pub async fn call<F, T>(budget: Duration, request: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match race(budget, request).await {
        Settled::Completed(result) => result,
        Settled::TimedOut => Err(RemoteError::Timeout {
            millis: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_and_is_discarded() {
        let applied = Arc::new(AtomicBool::new(false));
        let flag = applied.clone();

        let outcome = race(Duration::from_secs(3), async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await;
        assert_eq!(outcome, Settled::TimedOut);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!applied.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_call_completes() {
        let outcome = call(Duration::from_secs(3), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, RemoteError>(7)
        })
        .await;
        assert_eq!(outcome, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_remote_error() {
        let outcome: Result<(), RemoteError> = call(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(outcome, Err(RemoteError::Timeout { millis: 1000 }));
    }
}
