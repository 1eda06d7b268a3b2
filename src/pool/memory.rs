//! Approximate memory accounting for pooled strings.
//!
//! Figures are estimates used for dashboards, not allocator truth: each
//! string costs its header plus its UTF-8 length, capacity slack ignored.

use std::mem::size_of;

const STRING_HEADER_BYTES: i64 = size_of::<String>() as i64;

/// Footprint of one owned string.
pub fn string_bytes(value: &str) -> i64 {
    STRING_HEADER_BYTES + value.len() as i64
}

/// Footprint of a collection of strings, excluding the container itself.
pub fn strings_bytes<S: AsRef<str>>(values: &[S]) -> i64 {
    values.iter().map(|value| string_bytes(value.as_ref())).sum()
}

/// Footprint of a raw/encoded pair stored side by side.
pub fn pair_bytes(raw: &str, encoded: &str) -> i64 {
    string_bytes(raw) + string_bytes(encoded)
}

/// Human readable IEC rendering (`B`, `KiB`, `MiB`, ...) for logs.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let magnitude = bytes.unsigned_abs();
    let sign = if bytes < 0 { "-" } else { "" };
    if magnitude < 1024 {
        return format!("{sign}{magnitude} B");
    }

    let mut value = magnitude as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{sign}{rendered} {}", UNITS[unit])
}
