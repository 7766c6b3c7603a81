//! Display helpers shared by the views.

use chrono::{DateTime, Local, Utc};

/// Compact size used in the file tree: `B`, `KB` or `MB` with one decimal.
pub fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let n = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if n < KIB * KIB {
        format!("{} KB", round1(n / KIB))
    } else {
        format!("{} MB", round1(n / (KIB * KIB)))
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Byte count with a unit up to `TB`, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64, decimals: usize) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let decimals = if unit == 0 { 0 } else { decimals };
    format!("{value:.decimals$} {}", UNITS[unit])
}

/// Pretty-print text that happens to be JSON; anything else is returned as is.
pub fn pretty_json(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .filter(|value| value.is_object() || value.is_array())
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| text.to_string())
}

/// Pretty-print a JSON frame. String frames holding JSON are unwrapped first.
pub fn pretty_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => pretty_json(text),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// RFC 3339 timestamp in local time, or the raw text if unparsable.
pub fn local_time(rfc3339: &str) -> String {
    DateTime::parse_from_rfc3339(rfc3339)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}

/// UTC timestamp in local time.
pub fn local_datetime(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
