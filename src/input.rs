//! lenient parsing of the threshold form body.
//!
//! the page posts `threshold=<number>`. nothing is ever rejected: the longest
//! numeric prefix of the value wins and anything unparsable reads as 0.0.
//! non-finite results (overflowing exponents) also read as 0.0.

use tracing::debug;

/// value the threshold takes when the request carries no usable number
pub const FALLBACK_THRESHOLD: f64 = 0.0;

/// extract the threshold from a form body such as `threshold=25.5`
pub fn parse_threshold_form(body: &str) -> f64 {
    let raw = body
        .split_once('=')
        .map(|(_, rest)| rest.split(['=', '&']).next().unwrap_or(""))
        .unwrap_or("");

    let value = parse_leading_float(raw);
    if value.is_none() {
        debug!("[INPUT] No number in threshold body {:?}, using {}", body, FALLBACK_THRESHOLD);
    }
    value.unwrap_or(FALLBACK_THRESHOLD)
}

/// longest prefix of `s` (after leading whitespace) that is a finite float
fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let candidate: String = s
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        .collect();

    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
