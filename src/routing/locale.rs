//! i18n helpers: locale redirects and locale-prefixed paths.

use std::collections::{BTreeMap, BTreeSet};

use crate::http::accept::parse_accept_language;
use crate::manifest::BuildOutput;

const LOCALE_PREFIX: &str = "^//?(?:";
const LOCALE_SUFFIX: &str = ")/(.*)$";

/// Whether `src` has the exact shape `^//?(?:en|fr)/(.*)$` with every
/// alternative a known locale.
pub fn is_locale_trailing_slash_regex(src: &str, locales: &BTreeSet<String>) -> bool {
    let Some(middle) = src
        .strip_prefix(LOCALE_PREFIX)
        .and_then(|rest| rest.strip_suffix(LOCALE_SUFFIX))
    else {
        return false;
    };
    middle.split('|').all(|locale| locales.contains(locale))
}

/// Make the trailing `/(.*)` of a locale route optional so `/en` matches as
/// well as `/en/...`.
pub fn locale_friendly_src(src: &str, locales: &BTreeSet<String>) -> Option<String> {
    if !is_locale_trailing_slash_regex(src, locales) {
        return None;
    }
    let stem = src.strip_suffix("/(.*)$")?;
    Some(format!("{stem}(?:/(.*))?$"))
}

/// The first redirect target for the preferred locales, taken from the
/// locale cookie and then `Accept-Language`.
pub fn preferred_redirect<'a>(
    redirects: &'a BTreeMap<String, String>,
    cookie_value: Option<&str>,
    accept_language: Option<&str>,
) -> Option<&'a str> {
    let from_cookie = parse_accept_language(cookie_value.unwrap_or_default());
    let from_header = parse_accept_language(accept_language.unwrap_or_default());

    from_cookie
        .iter()
        .chain(&from_header)
        .find_map(|locale| redirects.get(locale).filter(|target| !target.is_empty()))
        .map(String::as_str)
}

/// `/<locale>/rest` → `/rest` when `/rest` is in the build output.
pub fn strip_locale_prefix(path: &str, locales: &BTreeSet<String>, output: &BuildOutput) -> Option<String> {
    locales.iter().find_map(|locale| {
        let rest = path.strip_prefix('/')?.strip_prefix(locale.as_str())?;
        (rest.starts_with('/') && output.contains(rest)).then(|| rest.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::BuildOutputItem;

    fn locales() -> BTreeSet<String> {
        ["en", "fr", "nl-NL"].into_iter().map(str::to_string).collect()
    }

    #[test]
    fn test_locale_trailing_slash_shape() {
        assert!(is_locale_trailing_slash_regex("^//?(?:en|fr)/(.*)$", &locales()));
        assert!(!is_locale_trailing_slash_regex("^//?(?:en|de)/(.*)$", &locales()));
        assert!(!is_locale_trailing_slash_regex("^/(?:en|fr)/(.*)$", &locales()));
        assert_eq!(
            locale_friendly_src("^//?(?:en|nl-NL)/(.*)$", &locales()).as_deref(),
            Some("^//?(?:en|nl-NL)(?:/(.*))?$")
        );
    }

    #[test]
    fn test_cookie_beats_header() {
        let redirects = BTreeMap::from([
            ("en".to_string(), "/".to_string()),
            ("fr".to_string(), "/fr".to_string()),
        ]);
        assert_eq!(preferred_redirect(&redirects, Some("fr"), Some("en")), Some("/fr"));
        assert_eq!(preferred_redirect(&redirects, None, Some("de, en;q=0.5")), Some("/"));
        assert_eq!(preferred_redirect(&redirects, None, Some("de")), None);
    }

    #[test]
    fn test_strip_locale_prefix() {
        let mut output = BuildOutput::new();
        output.insert("/about", BuildOutputItem::Static);

        assert_eq!(strip_locale_prefix("/fr/about", &locales(), &output).as_deref(), Some("/about"));
        assert_eq!(strip_locale_prefix("/fr/contact", &locales(), &output), None);
        assert_eq!(strip_locale_prefix("/french/about", &locales(), &output), None);
    }
}
