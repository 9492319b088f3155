//! Placeholder expansion for scenario fields.
//!
//! A small left-to-right interpreter over `{{...}}` tokens rather than
//! repeated substring scans, so nested or malformed braces can't cause a
//! placeholder's own expansion to be rescanned.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed sample list for the `{{pick movies}}` compatibility placeholder.
const MOVIES: [&str; 5] = [
    "Clueless",
    "Heat",
    "Jaws",
    "Metropolis",
    "Paprika",
];

/// The credential pair a worker was assigned, if a credentials file was
/// loaded.
#[derive(Debug, Clone, Copy)]
pub struct Credential<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Expand every recognized `{{...}}` placeholder in `template`. Unrecognized
/// `{{...}}` sequences are left intact. Never fails.
pub fn expand(
    template: &str,
    user_id: u64,
    rng: &mut impl Rng,
    credential: Option<Credential<'_>>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(end) = find_close(template, i + 2) {
                let inner = &template[i + 2..end];
                out.push_str(&expand_placeholder(inner, user_id, rng, credential));
                i = end + 2;
                continue;
            }
        }
        // Copy one char (not one byte, to stay UTF-8 safe).
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

fn find_close(s: &str, from: usize) -> Option<usize> {
    s[from..].find("}}").map(|pos| from + pos)
}

fn expand_placeholder(
    inner: &str,
    user_id: u64,
    rng: &mut impl Rng,
    credential: Option<Credential<'_>>,
) -> String {
    let mut parts = inner.split_whitespace();
    let name = match parts.next() {
        Some(n) => n,
        None => return format!("{{{{{}}}}}", inner),
    };
    let args: Vec<&str> = parts.collect();

    match name {
        "userId" => user_id.to_string(),
        "epochms" => epoch_millis().to_string(),
        "randInt" => expand_rand_int(&args, rng, 1),
        "randDelay" => expand_rand_int(&args, rng, 1000),
        "pick" if args.first() == Some(&"movies") => {
            MOVIES[rng.gen_range(0..MOVIES.len())].to_string()
        }
        "username" | "email" => credential.map(|c| c.username.to_string()).unwrap_or_default(),
        "password" => credential.map(|c| c.password.to_string()).unwrap_or_default(),
        _ => format!("{{{{{}}}}}", inner),
    }
}

fn expand_rand_int(args: &[&str], rng: &mut impl Rng, fallback: i64) -> String {
    let parsed = match args {
        [a, b] => a.parse::<i64>().ok().zip(b.parse::<i64>().ok()),
        _ => None,
    };

    match parsed {
        Some((a, b)) if a < b => rng.gen_range(a..=b).to_string(),
        _ => fallback.to_string(),
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis()
}

/// Substitute the literal `CSRF_TOKEN_PLACEHOLDER` token (not brace-delimited)
/// with the worker's current CSRF token, URL-encoded, as spec'd for form
/// bodies.
pub fn substitute_csrf_token(body: &str, token: &str) -> String {
    if token.is_empty() || !body.contains("CSRF_TOKEN_PLACEHOLDER") {
        return body.to_string();
    }
    let encoded = urlencode(token);
    body.replace("CSRF_TOKEN_PLACEHOLDER", &encoded)
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn expands_user_id() {
        let mut r = rng();
        assert_eq!(expand("user {{userId}}", 7, &mut r, None), "user 7");
    }

    #[test]
    fn leaves_unrecognized_placeholder_intact() {
        let mut r = rng();
        assert_eq!(expand("{{unknownThing}}", 1, &mut r, None), "{{unknownThing}}");
    }

    #[test]
    fn rand_int_respects_bounds() {
        let mut r = rng();
        for _ in 0..100 {
            let out = expand("{{randInt 5 10}}", 1, &mut r, None);
            let v: i64 = out.parse().unwrap();
            assert!((5..=10).contains(&v));
        }
    }

    #[test]
    fn rand_int_malformed_bounds_yields_one() {
        let mut r = rng();
        assert_eq!(expand("{{randInt 10 5}}", 1, &mut r, None), "1");
        assert_eq!(expand("{{randInt a b}}", 1, &mut r, None), "1");
        assert_eq!(expand("{{randInt 5 5}}", 1, &mut r, None), "1");
    }

    #[test]
    fn rand_delay_malformed_yields_1000() {
        let mut r = rng();
        assert_eq!(expand("{{randDelay x y}}", 1, &mut r, None), "1000");
    }

    #[test]
    fn pick_movies_is_one_of_the_fixed_list() {
        let mut r = rng();
        let out = expand("{{pick movies}}", 1, &mut r, None);
        assert!(MOVIES.contains(&out.as_str()));
    }

    #[test]
    fn credential_placeholders_expand_from_credential() {
        let mut r = rng();
        let cred = Credential {
            username: "alice",
            password: "hunter2",
        };
        assert_eq!(expand("{{username}}", 1, &mut r, Some(cred)), "alice");
        assert_eq!(expand("{{password}}", 1, &mut r, Some(cred)), "hunter2");
        assert_eq!(expand("{{email}}", 1, &mut r, Some(cred)), "alice");
    }

    #[test]
    fn multiple_placeholders_in_one_template() {
        let mut r = rng();
        let cred = Credential {
            username: "bob",
            password: "pw",
        };
        let out = expand("u={{username}}&id={{userId}}", 3, &mut r, Some(cred));
        assert_eq!(out, "u=bob&id=3");
    }

    #[test]
    fn csrf_placeholder_substituted_and_url_encoded() {
        let body = "authenticity_token=CSRF_TOKEN_PLACEHOLDER&x=1";
        let out = substitute_csrf_token(body, "abc+def/==");
        assert_eq!(out, "authenticity_token=abc%2Bdef%2F%3D%3D&x=1");
    }

    #[test]
    fn csrf_placeholder_untouched_when_token_empty() {
        let body = "authenticity_token=CSRF_TOKEN_PLACEHOLDER";
        assert_eq!(substitute_csrf_token(body, ""), body);
    }
}
