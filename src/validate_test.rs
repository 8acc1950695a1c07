use super::*;
use serde_json::json;

// ======
// validate_credits
// ======

#[test]
fn accepts_in_range_integers() {
    let v = validate_credits(&json!(0));
    assert!(v.is_valid);
    assert_eq!(v.data, 0);

    let v = validate_credits(&json!(250));
    assert!(v.is_valid);
    assert_eq!(v.data, 250);

    let v = validate_credits(&json!(MAX_CREDIT_VALUE));
    assert!(v.is_valid);
    assert_eq!(v.data, MAX_CREDIT_VALUE);
}

#[test]
fn rejects_negative_with_zero_substitute() {
    let v = validate_credits(&json!(-1));
    assert!(!v.is_valid);
    assert_eq!(v.data, 0);
    assert!(v.error.is_some());
}

#[test]
fn clamps_over_limit_to_max() {
    let v = validate_credits(&json!(MAX_CREDIT_VALUE + 1));
    assert!(!v.is_valid);
    assert_eq!(v.data, MAX_CREDIT_VALUE);

    let v = validate_credits(&json!(10_000_000));
    assert!(!v.is_valid);
    assert_eq!(v.data, MAX_CREDIT_VALUE);
}

#[test]
fn rejects_fractional_amounts() {
    let v = validate_credits(&json!(12.5));
    assert!(!v.is_valid);
    assert_eq!(v.data, 12);
}

#[test]
fn accepts_integral_floats() {
    let v = validate_credits(&json!(42.0));
    assert!(v.is_valid);
    assert_eq!(v.data, 42);
}

#[test]
fn accepts_numeric_strings() {
    let v = validate_credits(&json!("100"));
    assert!(v.is_valid);
    assert_eq!(v.data, 100);

    let v = validate_credits(&json!("  7  "));
    assert!(v.is_valid);
    assert_eq!(v.data, 7);
}

#[test]
fn rejects_non_numeric_values() {
    for bad in [json!("abc"), json!(null), json!(true), json!([1]), json!({"n": 1})] {
        let v = validate_credits(&bad);
        assert!(!v.is_valid, "expected invalid: {bad}");
        assert_eq!(v.data, 0);
    }
}

#[test]
fn result_data_is_always_in_range() {
    for raw in [
        json!(-999),
        json!(0),
        json!(1),
        json!(999_999),
        json!(1_000_000),
        json!(3.9),
        json!("nope"),
    ] {
        let v = validate_credits(&raw);
        assert!((0..=MAX_CREDIT_VALUE).contains(&v.data), "out of range for {raw}");
    }
}

// ======
// safe_json_parse
// ======

#[test]
fn parses_well_formed_json() {
    let v: Vec<i64> = safe_json_parse("[1,2,3]", vec![]);
    assert_eq!(v, vec![1, 2, 3]);
}

#[test]
fn substitutes_fallback_on_malformed_json() {
    let v: Vec<i64> = safe_json_parse("[1,2,", vec![9]);
    assert_eq!(v, vec![9]);

    let s: String = safe_json_parse("{broken", "default".to_string());
    assert_eq!(s, "default");
}

#[test]
fn substitutes_fallback_on_type_mismatch() {
    let v: Vec<i64> = safe_json_parse("\"not a list\"", vec![]);
    assert!(v.is_empty());
}

// ======
// sanitize_url
// ======

#[test]
fn passes_https_urls_through() {
    let v = sanitize_url("https://example.com/a.png");
    assert!(v.is_valid);
    assert_eq!(v.data, "https://example.com/a.png");
}

#[test]
fn upgrades_http_to_https() {
    let v = sanitize_url("http://example.com/a.png");
    assert!(v.is_valid);
    assert_eq!(v.data, "https://example.com/a.png");
}

#[test]
fn upgrades_scheme_relative_urls() {
    let v = sanitize_url("//cdn.example.com/a.png");
    assert!(v.is_valid);
    assert_eq!(v.data, "https://cdn.example.com/a.png");
}

#[test]
fn prefixes_bare_hosts() {
    let v = sanitize_url("example.com/gallery");
    assert!(v.is_valid);
    assert_eq!(v.data, "https://example.com/gallery");
}

#[test]
fn rejects_script_schemes_with_empty_data() {
    for raw in [
        "javascript:alert(1)",
        "JAVASCRIPT:alert(1)",
        "jav\tascript:alert(1)",
        " data:text/html;base64,xxx",
        "vbscript:msgbox",
        "file:///etc/passwd",
    ] {
        let v = sanitize_url(raw);
        assert!(!v.is_valid, "expected rejection: {raw}");
        assert_eq!(v.data, "");
    }
}

#[test]
fn rejects_non_web_schemes() {
    for raw in ["mailto:a@b.c", "ftp://example.com/x"] {
        let v = sanitize_url(raw);
        assert!(!v.is_valid, "expected rejection: {raw}");
        assert_eq!(v.data, "");
    }
}

#[test]
fn rejects_empty_and_free_text() {
    for raw in ["", "   ", "not a url", "hello"] {
        let v = sanitize_url(raw);
        assert!(!v.is_valid, "expected rejection: {raw:?}");
        assert_eq!(v.data, "");
    }
}

#[test]
fn trims_surrounding_whitespace() {
    let v = sanitize_url("  https://example.com  ");
    assert!(v.is_valid);
    assert_eq!(v.data, "https://example.com");
}
