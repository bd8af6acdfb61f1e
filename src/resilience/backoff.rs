//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Un-jittered delay before retry number `attempt` (1-indexed).
///
/// `min(initial * multiplier^(attempt - 1), max)`.
pub fn base_delay(attempt: u32, initial: Duration, multiplier: f64, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let nanos = initial.as_nanos() as f64 * multiplier.powi(exponent);
    let max_nanos = max.as_nanos() as f64;

    if !nanos.is_finite() || nanos >= max_nanos {
        return max;
    }
    Duration::from_nanos(nanos.round() as u64)
}

/// Add uniform jitter in `[0, ratio * delay]`.
pub fn with_jitter(delay: Duration, ratio: f64) -> Duration {
    let jitter_range = (delay.as_nanos() as f64 * ratio.clamp(0.0, 1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..=jitter_range)
    } else {
        0
    };

    delay + Duration::from_nanos(jitter)
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(
    attempt: u32,
    initial: Duration,
    multiplier: f64,
    max: Duration,
    jitter_ratio: f64,
) -> Duration {
    with_jitter(base_delay(attempt, initial, multiplier, max), jitter_ratio)
}
