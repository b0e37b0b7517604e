use std::time::Duration;

/// Picks the delay to wait before reconnect attempt `attempt`.
///
/// The table is indexed by attempt count; attempts past the end reuse the
/// final entry, so retries plateau at the table's ceiling instead of
/// growing without bound.
pub fn delay_for_attempt(attempt: u32, delays_ms: &[u64]) -> Duration {
    let Some(last) = delays_ms.len().checked_sub(1) else {
        // Config loading substitutes empty tables; stay sane if one slips in.
        return Duration::from_secs(5);
    };
    let index = (attempt as usize).min(last);
    Duration::from_millis(delays_ms[index])
}
