//! Header merging with optional capture substitution.

use std::collections::BTreeMap;

use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::pattern::{apply_pcre_matches, PcreMatch};

/// All values for `name`, joined with `", "` like a fetch `Headers.get`.
pub fn joined_value(headers: &HeaderMap, name: impl AsRef<str>) -> Option<String> {
    let mut values = headers.get_all(name.as_ref()).iter().peekable();
    values.peek()?;
    let joined = values
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect::<Vec<_>>()
        .join(", ");
    Some(joined)
}

/// Merge every header of `source` into `target`.
///
/// `set-cookie` values are appended; any other header replaces the target's
/// value with the source's (joined) value.
pub fn apply_header_map(target: &mut HeaderMap, source: &HeaderMap) {
    for name in source.keys() {
        if name == SET_COOKIE {
            for value in source.get_all(name) {
                target.append(name.clone(), value.clone());
            }
            continue;
        }

        let mut values = source.get_all(name).iter();
        let merged = match (values.next(), values.next()) {
            (Some(only), None) => only.clone(),
            _ => {
                let bytes = source
                    .get_all(name)
                    .iter()
                    .map(HeaderValue::as_bytes)
                    .collect::<Vec<_>>()
                    .join(&b", "[..]);
                match HeaderValue::from_bytes(&bytes) {
                    Ok(value) => value,
                    Err(_) => continue,
                }
            }
        };
        target.insert(name.clone(), merged);
    }
}

/// Merge declared route headers into `target`, substituting `$1`/`$name`
/// tokens from `matched` when given. Invalid names or values are skipped.
pub fn apply_route_headers(
    target: &mut HeaderMap,
    headers: &BTreeMap<String, String>,
    matched: Option<&PcreMatch>,
) {
    for (key, value) in headers {
        let Ok(name) = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes()) else {
            tracing::warn!(header = %key, "Skipping invalid route header name");
            continue;
        };

        let value = match matched {
            Some(m) => apply_pcre_matches(value, m, false),
            None => value.clone(),
        };
        let Ok(value) = HeaderValue::from_str(&value) else {
            tracing::warn!(header = %key, "Skipping invalid route header value");
            continue;
        };

        if name == SET_COOKIE {
            target.append(name, value);
        } else {
            target.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::compile;

    #[test]
    fn test_set_cookie_appends_everything_else_overwrites() {
        let mut target = HeaderMap::new();
        target.insert("cache-control", HeaderValue::from_static("no-store"));
        target.append(SET_COOKIE, HeaderValue::from_static("a=1"));

        let mut source = HeaderMap::new();
        source.insert("cache-control", HeaderValue::from_static("public"));
        source.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        source.append("vary", HeaderValue::from_static("accept"));
        source.append("vary", HeaderValue::from_static("rsc"));

        apply_header_map(&mut target, &source);

        assert_eq!(target["cache-control"], "public");
        assert_eq!(target.get_all(SET_COOKIE).iter().count(), 2);
        assert_eq!(target["vary"], "accept, rsc");
    }

    #[test]
    fn test_route_headers_substitute_captures() {
        let m = compile("%^/docs/(?<section>[a-z]+)/(.*)$%").unwrap().exec("/docs/api/intro").unwrap();
        let headers = BTreeMap::from([
            ("X-Section".to_string(), "$section".to_string()),
            ("x-rest".to_string(), "$2".to_string()),
            ("bad header".to_string(), "x".to_string()),
        ]);

        let mut target = HeaderMap::new();
        apply_route_headers(&mut target, &headers, Some(&m));

        assert_eq!(target["x-section"], "api");
        assert_eq!(target["x-rest"], "intro");
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_joined_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(joined_value(&headers, "accept"), None);
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("*/*"));
        assert_eq!(joined_value(&headers, "accept").as_deref(), Some("text/html, */*"));
    }
}
