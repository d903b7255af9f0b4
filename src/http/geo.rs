//! Edge geolocation headers.
//!
//! Edge metadata arrives as `cf-*` headers from the fronting CDN and is
//! republished under the `x-vercel-ip-*` names applications read.

use axum::http::{HeaderMap, HeaderValue};
use percent_encoding::utf8_percent_encode;

use crate::http::cookies::URI_COMPONENT;

const GEO_HEADERS: [(&str, &str); 6] = [
    ("cf-ipcity", "x-vercel-ip-city"),
    ("cf-ipcountry", "x-vercel-ip-country"),
    ("cf-region-code", "x-vercel-ip-country-region"),
    ("cf-iplatitude", "x-vercel-ip-latitude"),
    ("cf-iplongitude", "x-vercel-ip-longitude"),
    ("cf-timezone", "x-vercel-ip-timezone"),
];

/// Copy edge metadata headers onto their `x-vercel-ip-*` counterparts.
pub fn apply_geo_headers(headers: &mut HeaderMap) {
    for (source, target) in GEO_HEADERS {
        let Some(value) = headers.get(source) else {
            continue;
        };

        let value = if source == "cf-ipcity" {
            let raw = String::from_utf8_lossy(value.as_bytes());
            match HeaderValue::from_str(&utf8_percent_encode(&raw, URI_COMPONENT).to_string()) {
                Ok(encoded) => encoded,
                Err(_) => continue,
            }
        } else {
            value.clone()
        };

        headers.insert(target, value);
    }
}
