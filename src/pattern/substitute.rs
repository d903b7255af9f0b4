//! Capture-group substitution into templates.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::pattern::PcreMatch;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([a-zA-Z0-9_]+)").expect("valid substitution token pattern"));

/// Replace `$name` / `$1` tokens in `template` with text from `matched`.
///
/// Known capture names win over positional lookup. With `named_only`, tokens
/// that are not capture names are left as written. Groups that did not
/// participate substitute to the empty string.
pub fn apply_pcre_matches(template: &str, matched: &PcreMatch, named_only: bool) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            match matched.named_ordinal(key) {
                Some(ordinal) => matched.group(ordinal + 1).unwrap_or_default().to_string(),
                None if named_only => caps[0].to_string(),
                None => leading_integer(key)
                    .and_then(|index| matched.group(index))
                    .unwrap_or_default()
                    .to_string(),
            }
        })
        .into_owned()
}

fn leading_integer(key: &str) -> Option<usize> {
    let digits = key.len() - key.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    key[..digits].parse().ok()
}
