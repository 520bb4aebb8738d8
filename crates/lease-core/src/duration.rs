//! Human duration strings ("500ms", "30s", "5m", "1h").

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ProvisioningError, ProvisioningResult};

/// Parse a duration string like "5s", "500ms", "20m" or "1h".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> ProvisioningResult<Duration> {
    let s = s.trim();
    let invalid = || ProvisioningError::Duration(s.to_string());

    // Multiplier in milliseconds.
    let (digits, unit_ms) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    value
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

/// Seconds since the Unix epoch, used to timestamp status lines.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
