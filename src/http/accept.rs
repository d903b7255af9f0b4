//! Weighted `Accept-*` header parsing.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

static QUALITY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)q *= *").expect("valid quality prefix pattern"));

/// Parse a weighted list such as `Accept-Language` into tokens ordered by
/// descending weight. Missing or malformed weights count as 1; `*` and empty
/// tokens are dropped. Equal weights keep their original order.
pub fn parse_accept_language(value: &str) -> Vec<String> {
    let mut weighted: Vec<(&str, f64)> = value
        .split(',')
        .map(|entry| {
            let mut parts = entry.split(';');
            let token = parts.next().unwrap_or_default().trim();
            let weight = parts.next().map_or(1.0, parse_quality);
            (token, weight)
        })
        .collect();

    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    weighted
        .into_iter()
        .filter(|(token, _)| !token.is_empty() && *token != "*")
        .map(|(token, _)| token.to_string())
        .collect()
}

fn parse_quality(raw: &str) -> f64 {
    let stripped = QUALITY_PREFIX.replace_all(raw, "");
    let stripped = stripped.trim_start();
    let end = stripped
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map_or(stripped.len(), |(i, _)| i);

    stripped[..end]
        .parse::<f64>()
        .ok()
        .filter(|q| q.is_finite())
        .unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weight_beats_explicit() {
        assert_eq!(parse_accept_language("en;q=0.8, fr, *;q=0.1"), vec!["fr", "en"]);
    }

    #[test]
    fn test_stable_for_equal_weights() {
        assert_eq!(
            parse_accept_language("de-CH, de;q=0.9, en;q=0.9"),
            vec!["de-CH", "de", "en"]
        );
    }

    #[test]
    fn test_invalid_weight_defaults_to_one() {
        assert_eq!(parse_accept_language("nl;q=abc, en;q=0.5"), vec!["nl", "en"]);
        assert_eq!(parse_accept_language("it;Q = 0.2, es"), vec!["es", "it"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_accept_language("").is_empty());
        assert!(parse_accept_language(" , *").is_empty());
    }
}
