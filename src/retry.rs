//! Exponential backoff for poll-until-nonempty semantics.
//!
//! A poll that lands exactly between the submit and the backend's
//! completion would otherwise return an empty page. Rather than push
//! that race onto every caller, `poll_until_nonempty` retries the given
//! fetch a bounded number of times with growing delay before giving up
//! and returning whatever it last saw (possibly empty).

use std::future::Future;
use std::time::Duration;

const INITIAL_DELAY: Duration = Duration::from_millis(1);
const BACKOFF_BASE: u32 = 2;
const MAX_DELAY: Duration = Duration::from_millis(100);
const MAX_ATTEMPTS: u32 = 10;

/// Retry `fetch` until `is_done` accepts its result, a fixed delay cap is
/// reached, or the attempt budget is exhausted. No jitter: callers are
/// already keyed by distinct subscription keys, so synchronized retries
/// across callers don't contend on a shared resource the way they would
/// for, say, a thundering-herd reconnect.
pub async fn poll_until<T, F, Fut, D>(mut fetch: F, mut is_done: D) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    D: FnMut(&T) -> bool,
{
    let mut delay = INITIAL_DELAY;
    let mut result = fetch().await;

    for _ in 1..MAX_ATTEMPTS {
        if is_done(&result) {
            return result;
        }
        tokio::time::sleep(delay).await;
        delay = (delay * BACKOFF_BASE).min(MAX_DELAY);
        result = fetch().await;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_returns_immediately_when_first_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let result = poll_until(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                vec![1]
            },
            |r: &Vec<i32>| !r.is_empty(),
        )
        .await;
        assert_eq!(result, vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_nonempty() {
        let calls = AtomicU32::new(0);
        let result = poll_until(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 3 { Vec::<i32>::new() } else { vec![42] }
            },
            |r: &Vec<i32>| !r.is_empty(),
        )
        .await;
        assert_eq!(result, vec![42]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = poll_until(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Vec::<i32>::new()
            },
            |r: &Vec<i32>| !r.is_empty(),
        )
        .await;
        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
