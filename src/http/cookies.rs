//! Cookie header parsing and `Set-Cookie` serialization.

use std::collections::HashMap;
use std::fmt::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
pub(crate) const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("argument name is invalid")]
    InvalidName,
    #[error("argument val is invalid")]
    InvalidValue,
    #[error("option domain is invalid")]
    InvalidDomain,
    #[error("option path is invalid")]
    InvalidPath,
    #[error("option sameSite is invalid")]
    InvalidSameSite,
    #[error("option priority is invalid")]
    InvalidPriority,
}

/// Parse a `Cookie` header. The first occurrence of a name wins.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    let mut index = 0;

    while index < header.len() {
        let Some(eq) = header[index..].find('=').map(|i| i + index) else {
            break;
        };

        let end = match header[index..].find(';').map(|i| i + index) {
            None => header.len(),
            Some(end) if end < eq => {
                // Skip a segment without '=' and resume at the pair holding `eq`.
                index = header[..eq].rfind(';').map_or(eq, |i| i + 1);
                continue;
            }
            Some(end) => end,
        };

        let key = header[index..eq].trim();
        if !cookies.contains_key(key) {
            let mut value = header[eq + 1..end].trim();
            if let Some(unquoted) = value.strip_prefix('"') {
                value = unquoted.strip_suffix('"').unwrap_or(unquoted);
            }
            cookies.insert(key.to_string(), decode_value(value));
        }

        index = end + 1;
    }

    cookies
}

fn decode_value(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl FromStr for SameSite {
    type Err = CookieError;

    /// Accepts `strict`, `lax`, `none` and `true` (meaning strict).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" | "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(CookieError::InvalidSameSite),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = CookieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(CookieError::InvalidPriority),
        }
    }
}

/// Attributes for [`serialize_cookie`].
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    pub max_age: Option<i64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub http_only: bool,
    pub secure: bool,
    pub partitioned: bool,
    pub same_site: Option<SameSite>,
    pub priority: Option<Priority>,
}

/// Serialize a `Set-Cookie` value. The value is percent-encoded.
pub fn serialize_cookie(name: &str, value: &str, options: &CookieOptions) -> Result<String, CookieError> {
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return Err(CookieError::InvalidName);
    }

    let encoded = utf8_percent_encode(value, URI_COMPONENT).to_string();
    if !encoded.bytes().all(is_cookie_octet) {
        return Err(CookieError::InvalidValue);
    }

    let mut cookie = format!("{name}={encoded}");

    if let Some(max_age) = options.max_age {
        let _ = write!(cookie, "; Max-Age={max_age}");
    }
    if let Some(domain) = &options.domain {
        if !is_attribute_value(domain) {
            return Err(CookieError::InvalidDomain);
        }
        let _ = write!(cookie, "; Domain={domain}");
    }
    if let Some(path) = &options.path {
        if !is_attribute_value(path) {
            return Err(CookieError::InvalidPath);
        }
        let _ = write!(cookie, "; Path={path}");
    }
    if let Some(expires) = options.expires {
        let _ = write!(cookie, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"));
    }
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    if options.partitioned {
        cookie.push_str("; Partitioned");
    }
    match options.priority {
        Some(Priority::Low) => cookie.push_str("; Priority=Low"),
        Some(Priority::Medium) => cookie.push_str("; Priority=Medium"),
        Some(Priority::High) => cookie.push_str("; Priority=High"),
        None => {}
    }
    match options.same_site {
        Some(SameSite::Strict) => cookie.push_str("; SameSite=Strict"),
        Some(SameSite::Lax) => cookie.push_str("; SameSite=Lax"),
        Some(SameSite::None) => cookie.push_str("; SameSite=None"),
        None => {}
    }

    Ok(cookie)
}

/// RFC 7230 `tchar`, the charset of an RFC 6265 cookie name.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// RFC 6265 `cookie-octet`.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

fn is_attribute_value(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| (0x20..0x7F).contains(&b) && b != b';')
}
