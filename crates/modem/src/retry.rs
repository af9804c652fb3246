//! Fixed-count, fixed-delay retry with an abort predicate.

use core::future::Future;

use embassy_time::Timer;

use crate::config::RetryPolicy;

/// Run `op` until it returns `true`, at most `policy.attempts` times.
///
/// `abort` is consulted before every attempt; once it returns `true` no
/// further attempt is made. Returns whether an attempt succeeded.
pub async fn retry<A, O, F>(policy: &RetryPolicy, mut abort: A, mut op: O) -> bool
where
    A: FnMut() -> bool,
    O: FnMut() -> F,
    F: Future<Output = bool>,
{
    let mut attempt = 0u32;
    while attempt < policy.attempts {
        if abort() {
            log_warn!("retry aborted after {} attempts", attempt);
            return false;
        }
        if op().await {
            return true;
        }
        attempt = attempt.saturating_add(1);
        if attempt < policy.attempts {
            log_debug!("attempt {} of {} failed", attempt, policy.attempts);
            Timer::after(policy.delay).await;
        }
    }
    false
}
