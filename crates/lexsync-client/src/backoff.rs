//! Exponential backoff with jitter

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based).
///
/// Doubles from `base_ms`, capped at `cap_ms`, then jittered into the upper
/// half of the capped value so concurrent retriers spread out instead of
/// hammering the remote in lockstep.
pub fn backoff_delay(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = exp.min(cap_ms).max(1);
    let half = capped / 2;
    let jittered = half + rand::thread_rng().gen_range(0..=capped - half);
    Duration::from_millis(jittered)
}
