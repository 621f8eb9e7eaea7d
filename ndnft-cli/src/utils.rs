//! Formatting helpers for the ndnft CLI

use std::time::Duration;

/// Render an elapsed time compactly: "4.21s", "2m04s", "1h03m".
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        return format!("{:.2}s", secs);
    }

    let whole = duration.as_secs();
    let (hours, mins, rest) = (whole / 3600, (whole / 60) % 60, whole % 60);
    if hours == 0 {
        format!("{}m{:02}s", mins, rest)
    } else {
        format!("{}h{:02}m", hours, mins)
    }
}

/// Format a byte count with a binary suffix, e.g. "3.00 MiB".
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Format a bit rate with a binary prefix, e.g. "42.17 Mibit/s"
pub fn format_bitrate(bits_per_sec: f64) -> String {
    const UNITS: [&str; 5] = ["bit/s", "Kibit/s", "Mibit/s", "Gibit/s", "Tibit/s"];

    let mut value = bits_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
