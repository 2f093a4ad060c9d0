// IDOR value perturbations for numeric parameters
// Adjacent identifiers, boundary values and negatives around an observed value

use crate::models::{Category, PayloadEntry};

/// Far-out identifier used as the upper boundary probe
const LARGE_ID: i64 = 999_999;

/// Whether a parameter value looks like a numeric identifier (optionally signed).
pub fn is_numeric_value(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && value.parse::<i64>().is_ok()
}

/// Generate IDOR-style payloads for a numeric value.
///
/// Order is fixed so generation stays deterministic:
/// - adjacent ids (value + 1, value - 1), keeping zero padding ("007" -> "008")
/// - boundary values (0, 999999)
/// - negative values (-1, -999999)
///
/// The observed value itself is never emitted. Non-numeric input yields nothing.
pub fn idor_perturbations(value: &str) -> Vec<PayloadEntry> {
    let Ok(number) = value.parse::<i64>() else {
        return Vec::new();
    };
    if !is_numeric_value(value) {
        return Vec::new();
    }

    let width = if has_leading_zeros(value) { value.len() } else { 0 };
    let mut candidates: Vec<(String, &str)> = Vec::new();

    for delta in [1i64, -1] {
        let adjacent = number.saturating_add(delta);
        let formatted = if width > 0 && adjacent >= 0 {
            format!("{:0width$}", adjacent, width = width)
        } else {
            adjacent.to_string()
        };
        candidates.push((formatted, "IDOR adjacent value"));
    }
    candidates.push(("0".to_string(), "IDOR zero value"));
    candidates.push((LARGE_ID.to_string(), "IDOR large value"));
    candidates.push(("-1".to_string(), "IDOR negative value"));
    candidates.push(((-LARGE_ID).to_string(), "IDOR negative value"));

    let mut seen: Vec<String> = vec![value.to_string()];
    let mut out = Vec::new();
    for (payload, note) in candidates {
        if seen.contains(&payload) {
            continue;
        }
        seen.push(payload.clone());
        out.push(PayloadEntry::new(Category::Idor, &payload, note, false));
    }
    out
}

/// "007" has leading zeros, "0" and "70" do not
fn has_leading_zeros(value: &str) -> bool {
    value.len() > 1 && value.starts_with('0')
}
