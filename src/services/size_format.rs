//! Human-readable byte counts for the stats block.

const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Format a byte count into a magnitude string: `0 → "0 Bytes"`,
/// `1536 → "1.5 KB"`.
///
/// The magnitude index is `floor(log(bytes) / log(1024))`, clamped to the
/// unit table so values past the TB boundary render as (large) TB counts.
/// Values are rounded to two decimals with trailing zeros trimmed.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    // integer log keeps exact powers of 1024 on the right side of the boundary
    let exponent = (bytes.ilog(1024) as usize).min(UNITS.len() - 1);
    let value = bytes as f64 / 1024_f64.powi(exponent as i32);

    let mut rendered = format!("{value:.2}");
    while rendered.ends_with('0') {
        rendered.pop();
    }
    if rendered.ends_with('.') {
        rendered.pop();
    }

    format!("{} {}", rendered, UNITS[exponent])
}
