use std::time::Duration;

pub const MAX_REPEAT_DELAY: Duration = Duration::from_secs(3600);

/// Delay before the next run in repeat mode. Consecutive failed runs double
/// the interval, up to an hour.
pub fn repeat_delay(interval: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return interval;
    }
    let base = interval.as_secs().max(1);
    let exp = failures.saturating_sub(1).min(5);
    let delay = base.saturating_mul(2u64.saturating_pow(exp));
    Duration::from_secs(delay).min(MAX_REPEAT_DELAY.max(interval))
}
