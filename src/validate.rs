//! Validation utilities — pure, stateless input sanitizers.
//!
//! DESIGN
//! ======
//! Every boundary that accepts credit amounts, persisted JSON, or
//! caller-supplied URLs runs it through this module first. Invalid input
//! never aborts a flow with a panic: callers receive `is_valid: false`
//! together with a safe substitute (`data` is always usable as-is).

use serde::de::DeserializeOwned;
use tracing::warn;

/// Upper bound for any single credit amount accepted at a boundary.
pub const MAX_CREDIT_VALUE: i64 = 999_999;

/// Outcome of a validation: a usable value plus whether the input was clean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated<T> {
    pub is_valid: bool,
    pub data: T,
    pub error: Option<&'static str>,
}

impl<T> Validated<T> {
    fn ok(data: T) -> Self {
        Self { is_valid: true, data, error: None }
    }

    fn invalid(data: T, error: &'static str) -> Self {
        Self { is_valid: false, data, error: Some(error) }
    }
}

// =============================================================================
// CREDITS
// =============================================================================

/// Validate a caller-supplied credit amount.
///
/// Accepts integral JSON numbers and integral numeric strings in
/// `[0, MAX_CREDIT_VALUE]`. Anything else is rejected, and `data` is the
/// nearest in-range integer so callers can always proceed with a safe value.
#[must_use]
pub fn validate_credits(value: &serde_json::Value) -> Validated<i64> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return clamp_credits(i);
            }
            if let Some(f) = n.as_f64() {
                return validate_credit_float(f);
            }
            // Out-of-i64 unsigned values are over-limit by definition.
            Validated::invalid(MAX_CREDIT_VALUE, "credit amount above limit")
        }
        serde_json::Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => clamp_credits(i),
            Err(_) => Validated::invalid(0, "credit amount is not numeric"),
        },
        _ => Validated::invalid(0, "credit amount is not numeric"),
    }
}

fn clamp_credits(i: i64) -> Validated<i64> {
    if i < 0 {
        Validated::invalid(0, "credit amount is negative")
    } else if i > MAX_CREDIT_VALUE {
        Validated::invalid(MAX_CREDIT_VALUE, "credit amount above limit")
    } else {
        Validated::ok(i)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn validate_credit_float(f: f64) -> Validated<i64> {
    if f.is_nan() || f.is_infinite() {
        return Validated::invalid(0, "credit amount is not numeric");
    }
    if f < 0.0 {
        return Validated::invalid(0, "credit amount is negative");
    }
    #[allow(clippy::cast_precision_loss)]
    if f > MAX_CREDIT_VALUE as f64 {
        return Validated::invalid(MAX_CREDIT_VALUE, "credit amount above limit");
    }
    if f.fract() != 0.0 {
        return Validated::invalid(f.trunc() as i64, "credit amount is not an integer");
    }
    Validated::ok(f as i64)
}

// =============================================================================
// JSON
// =============================================================================

/// Parse persisted JSON, substituting `fallback` when the payload is
/// malformed. Corrupt stored state self-heals instead of escalating.
pub fn safe_json_parse<T: DeserializeOwned>(raw: &str, fallback: T) -> T {
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "malformed persisted JSON, substituting default");
            fallback
        }
    }
}

// =============================================================================
// URLS
// =============================================================================

/// Schemes that must never reach a media or link field.
const BLOCKED_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:", "file:", "about:"];

/// Sanitize a caller-supplied URL into absolute HTTPS form.
///
/// Script-ish schemes are rejected outright with empty `data`. `http://` and
/// scheme-relative `//` forms upgrade to `https://`; bare host forms gain an
/// `https://` prefix. Everything else (mailto:, ftp:, fragments, free text)
/// is rejected.
#[must_use]
pub fn sanitize_url(raw: &str) -> Validated<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Validated::invalid(String::new(), "url is empty");
    }

    // Strip control and whitespace characters before scheme inspection:
    // "jav\tascript:" must not slip past a prefix check.
    let compact: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let lowered = compact.to_ascii_lowercase();

    for scheme in BLOCKED_SCHEMES {
        if lowered.starts_with(scheme) {
            return Validated::invalid(String::new(), "url scheme not allowed");
        }
    }

    if lowered.starts_with("https://") {
        return Validated::ok(trimmed.to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("http://") {
        return Validated::ok(format!("https://{rest}"));
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Validated::ok(format!("https://{rest}"));
    }

    // Any other explicit scheme is not a web URL.
    if lowered.contains(':') {
        return Validated::invalid(String::new(), "url scheme not allowed");
    }

    // Bare host form: first path segment must look like a hostname.
    let host = trimmed.split('/').next().unwrap_or("");
    if host.contains('.') && !trimmed.contains(char::is_whitespace) {
        return Validated::ok(format!("https://{trimmed}"));
    }

    Validated::invalid(String::new(), "url is not absolute")
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
