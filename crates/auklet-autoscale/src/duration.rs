//! Duration strings as they appear in service labels.
//!
//! A duration is a sequence of decimal numbers, each with
//! an optional fraction and a unit suffix, e.g. "300ms", "1.5h" or
//! "2h45m". Valid units are "ns", "us" (or "µs"), "ms", "s", "m", "h".
//! A bare "0" is allowed. Negative durations are rejected.

use std::time::Duration;

/// Parse a duration label value.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let mut rest = s.trim();
    if let Some(r) = rest.strip_prefix('+') {
        rest = r;
    }
    if rest == "0" {
        return Some(Duration::ZERO);
    }
    if rest.is_empty() {
        return None;
    }

    let mut nanos: u128 = 0;
    while !rest.is_empty() {
        let (whole, after) = split_digits(rest);
        let (frac, after) = match after.strip_prefix('.') {
            Some(a) => split_digits(a),
            None => ("", after),
        };
        if whole.is_empty() && frac.is_empty() {
            return None;
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        let scale = unit_nanos(unit)?;

        if !whole.is_empty() {
            let value: u128 = whole.parse().ok()?;
            nanos = nanos.checked_add(value.checked_mul(scale)?)?;
        }
        if !frac.is_empty() {
            let fraction: f64 = format!("0.{frac}").parse().ok()?;
            nanos = nanos.checked_add((fraction * scale as f64) as u128)?;
        }
        rest = after;
    }

    u64::try_from(nanos).ok().map(Duration::from_nanos)
}

fn split_digits(s: &str) -> (&str, &str) {
    let n = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(n)
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3_600 * 1_000_000_000),
        _ => None,
    }
}
