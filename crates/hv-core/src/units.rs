//! Human-readable units and clock helpers

use std::time::{SystemTime, UNIX_EPOCH};

const KB: u64 = 1_000;
const MB: u64 = 1_000 * KB;
const GB: u64 = 1_000 * MB;
const TB: u64 = 1_000 * GB;

/// Format a byte count with SI units, keeping `decimals` digits of the
/// remainder (truncated, not rounded)
pub fn to_readable(bytes: u64, decimals: usize) -> String {
    let (unit_size, unit) = match bytes {
        b if b > TB => (TB, "TB"),
        b if b > GB => (GB, "GB"),
        b if b > MB => (MB, "MB"),
        b if b > KB => (KB, "KB"),
        _ => (1, "B"),
    };

    let whole = bytes / unit_size;
    if decimals == 0 || unit_size == 1 {
        return format!("{}{}", whole, unit);
    }

    let width = match unit_size {
        TB => 12,
        GB => 9,
        MB => 6,
        _ => 3,
    };
    let rem = format!("{:0width$}", bytes % unit_size, width = width);
    let decimals = decimals.min(rem.len());

    format!("{}.{}{}", whole, &rem[..decimals], unit)
}

/// Get the current Unix timestamp in seconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
