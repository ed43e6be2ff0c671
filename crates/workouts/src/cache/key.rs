//! Cache key generation
//!
//! Keys double as file names for [`super::FileCache`], so they must be
//! filesystem-safe. Anything long or containing unsafe characters is hashed
//! (SHA-256) instead of truncated or character-replaced, which would let
//! distinct requests collide.

use sha2::{Digest, Sha256};

/// Longest key kept verbatim
const MAX_PLAIN_LEN: usize = 200;

/// Longest readable prefix kept in front of a hashed key
const MAX_SLUG_LEN: usize = 80;

/// Derive a stable key from a request path and its query parameters.
///
/// Parameters form a set: insertion order does not affect the key.
pub fn key_for<'a, I>(path: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    sanitize(&canonical_request(path, params))
}

/// Derive a stable key from a full URL (host + path + sorted query).
///
/// Unparseable input is hashed as-is.
pub fn key_for_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let host = parsed.host_str().unwrap_or_default();
            let path = format!("{}{}", host, parsed.path());
            key_for(&path, pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        }
        Err(_) => sanitize(raw),
    }
}

/// Namespace a request key under one account.
///
/// Request keys never contain `/`, so splitting on the last `/` recovers the
/// account and keeps distinct accounts apart even when one id is a prefix of
/// another.
pub fn key_for_account(account_id: &str, request_key: &str) -> String {
    sanitize(&format!("{}/{}", account_id, request_key))
}

/// Canonical `path?k=v&...` form with percent-encoded, sorted pairs
pub fn canonical_request<'a, I>(path: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let query = canonical_query(params);
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}

/// Sorted, percent-encoded query string (also used to build request URLs)
pub fn canonical_query<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<String> = params
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    pairs.sort();
    pairs.join("&")
}

/// Make an arbitrary string usable as a key/file name.
///
/// Short strings made only of `[A-Za-z0-9._-]` pass through unchanged;
/// everything else becomes `<slug>-<sha256 hex>`.
pub fn sanitize(raw: &str) -> String {
    if is_plain(raw) {
        return raw.to_string();
    }

    let mut slug = String::with_capacity(MAX_SLUG_LEN);
    for c in raw.chars() {
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
        let mapped = if is_safe_char(c) { c } else { '_' };
        // collapse runs of separators
        if mapped == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(mapped);
    }
    let slug = slug.trim_matches(|c| c == '_' || c == '.');

    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    if slug.is_empty() {
        format!("h-{}", digest)
    } else {
        format!("{}-{}", slug, digest)
    }
}

fn is_plain(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_PLAIN_LEN
        && !raw.starts_with('.')
        && raw.chars().all(is_safe_char)
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}
