//! CSRF token extraction from HTML response bodies.
//!
//! Tried in order; the first match wins and the others are never attempted,
//! per the worker's login-page extraction step.

use regex::Regex;
use std::sync::OnceLock;

fn meta_tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<meta\s+name="csrf-token"\s+content="([^"]*)""#).expect("valid regex")
    })
}

fn input_field_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<input[^>]*name="authenticity_token"[^>]*value="([^"]*)""#).expect("valid regex")
    })
}

fn loose_attribute_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"authenticity_token"[^>]*value="([^"]*)""#).expect("valid regex")
    })
}

/// Whether the action's URL warrants a CSRF-extraction attempt, per the
/// worker's "sign_in or login" restriction.
pub fn url_is_login_like(url: &str) -> bool {
    url.contains("sign_in") || url.contains("login")
}

/// Try the three extraction patterns, in order, returning the first match.
pub fn extract_csrf_token(body: &str) -> Option<String> {
    meta_tag_pattern()
        .captures(body)
        .or_else(|| input_field_pattern().captures(body))
        .or_else(|| loose_attribute_pattern().captures(body))
        .map(|caps| caps[1].to_string())
}
