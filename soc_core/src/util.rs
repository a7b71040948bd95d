//! Common time/period helpers for soc_core.
use std::time::Duration;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Loop period from a millisecond setting.
/// - Clamps `ms` to at least 1 so the scheduler never spins.
#[inline]
pub fn period_from_ms(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

/// Loop rate in Hz for a period, for display.
#[inline]
pub fn rate_hz(period: Duration) -> f64 {
    let s = period.as_secs_f64();
    if s > 0.0 { 1.0 / s } else { 0.0 }
}

/// Duration in fractional milliseconds, for display.
#[inline]
pub fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * MILLIS_PER_SEC as f64
}
