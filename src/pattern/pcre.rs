//! PCRE-style pattern compilation.
//!
//! # Responsibilities
//! - Split an optional custom delimiter and trailing flags off the source
//! - Rewrite `(?P<name>..)`, `(?<name>..)` and `(?'name'..)` to plain groups
//! - Record each named group at its capture ordinal
//! - Expand `[:alpha:]` style POSIX classes
//!
//! # Design Decisions
//! - Ordinals follow opening-paren order, so outer groups number first
//! - Parens inside `[...]` or escaped with `\` never open a group
//! - `(?:`, lookarounds and inline flag groups consume no ordinal
//! - Patterns the `regex` crate rejects (lookaround, backreferences) are
//!   compiled with `fancy-regex` instead

use std::sync::LazyLock;

use regex::{Captures, Regex, RegexBuilder};
use thiserror::Error;

/// Errors raised while compiling a pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// A named-capture marker whose name could not be parsed.
    #[error("Failed to extract named captures from {0:?}")]
    NamedCapture(String),

    /// A trailing flag the regex engine cannot honour.
    #[error("Unsupported pattern flag '{0}'")]
    UnsupportedFlag(char),

    /// The rewritten pattern was rejected by both regex engines.
    #[error("Invalid pattern {pattern:?}: {error}")]
    Regex {
        pattern: String,
        #[source]
        error: fancy_regex::Error,
    },
}

static POSIX_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[:([^:\]]+):\]").expect("valid POSIX class pattern"));

fn posix_class(name: &str) -> Option<&'static str> {
    let class = match name {
        "alnum" => "[A-Za-z0-9]",
        "word" => "[A-Za-z0-9_]",
        "alpha" => "[A-Za-z]",
        "blank" => r"[ \t]",
        "cntrl" => r"[\x00-\x1F\x7F]",
        "digit" => r"\d",
        "graph" => r"[\x21-\x7E]",
        "lower" => "[a-z]",
        "print" => r"[\x20-\x7E]",
        "punct" => r"[!-/:-@\[-`{-~]",
        "space" => r"\s",
        "upper" => "[A-Z]",
        "xdigit" => "[A-Fa-f0-9]",
        _ => return None,
    };
    Some(class)
}

#[derive(Debug, Clone)]
enum Engine {
    Regex(Regex),
    /// Backtracking engine for lookaround and backreferences.
    Fancy(fancy_regex::Regex),
}

/// A compiled pattern plus the names of its named capture groups.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    engine: Engine,
    /// Indexed by capture ordinal (group `n` lives at `n - 1`).
    capture_names: Vec<Option<String>>,
}

impl CompiledPattern {
    /// Whether the backtracking engine is in use.
    pub fn is_backtracking(&self) -> bool {
        matches!(self.engine, Engine::Fancy(_))
    }

    /// Whether `value` matches. A backtracking failure counts as no match.
    pub fn is_match(&self, value: &str) -> bool {
        match &self.engine {
            Engine::Regex(regex) => regex.is_match(value),
            Engine::Fancy(regex) => regex.is_match(value).unwrap_or_else(|e| {
                tracing::warn!(pattern = %regex.as_str(), error = %e, "Pattern match aborted");
                false
            }),
        }
    }

    /// Capture names by ordinal; unnamed groups are `None`.
    pub fn capture_names(&self) -> &[Option<String>] {
        &self.capture_names
    }

    /// Execute the pattern once against `value`.
    pub fn exec(&self, value: &str) -> Option<PcreMatch> {
        let groups = match &self.engine {
            Engine::Regex(regex) => regex
                .captures(value)?
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
            Engine::Fancy(regex) => {
                let captures = match regex.captures(value) {
                    Ok(captures) => captures?,
                    Err(e) => {
                        tracing::warn!(pattern = %regex.as_str(), error = %e, "Pattern match aborted");
                        return None;
                    }
                };
                captures
                    .iter()
                    .map(|group| group.map(|m| m.as_str().to_string()))
                    .collect()
            }
        };
        Some(PcreMatch {
            groups,
            capture_names: self.capture_names.clone(),
        })
    }
}

/// The owned result of a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcreMatch {
    /// Group 0 is the whole match; non-participating groups are `None`.
    groups: Vec<Option<String>>,
    capture_names: Vec<Option<String>>,
}

impl PcreMatch {
    /// Text of group `index`, if it participated in the match.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// Ordinal of the first group called `name`.
    pub fn named_ordinal(&self, name: &str) -> Option<usize> {
        self.capture_names
            .iter()
            .position(|n| n.as_deref() == Some(name))
    }

    /// Text captured by the group called `name`.
    pub fn named(&self, name: &str) -> Option<&str> {
        self.named_ordinal(name).and_then(|i| self.group(i + 1))
    }

    pub fn has_named_captures(&self) -> bool {
        self.capture_names.iter().any(Option::is_some)
    }

    pub fn capture_names(&self) -> &[Option<String>] {
        &self.capture_names
    }
}

/// Compile a PCRE-style source into a native regex.
///
/// The source may be wrapped in a custom delimiter (`%^/a$%i`): when the
/// first character is not alphanumeric, whitespace or a backslash and occurs
/// again later, everything after its last occurrence is read as flags.
pub fn compile(source: &str) -> Result<CompiledPattern, PatternError> {
    let (body, flags) = split_delimiters(source.trim());

    let mut capture_names = Vec::new();
    let body = replace_capture_groups(body, &mut capture_names)?;
    let body = POSIX_CLASS.replace_all(&body, |caps: &Captures| {
        posix_class(&caps[1])
            .map(str::to_string)
            .unwrap_or_else(|| caps[0].to_string())
    });

    let mut builder = RegexBuilder::new(&body);
    let mut inline_flags = String::new();
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'g' | 'u' | 'y' => continue,
            other => return Err(PatternError::UnsupportedFlag(other)),
        };
        if !inline_flags.contains(flag) {
            inline_flags.push(flag);
        }
    }

    let engine = match builder.build() {
        Ok(regex) => Engine::Regex(regex),
        Err(_) => {
            let fancy_source = if inline_flags.is_empty() {
                body.into_owned()
            } else {
                format!("(?{inline_flags}){body}")
            };
            let regex = fancy_regex::Regex::new(&fancy_source).map_err(|error| PatternError::Regex {
                pattern: source.to_string(),
                error,
            })?;
            Engine::Fancy(regex)
        }
    };

    Ok(CompiledPattern {
        engine,
        capture_names,
    })
}

fn split_delimiters(source: &str) -> (&str, &str) {
    let Some(delimiter) = source.chars().next() else {
        return (source, "");
    };
    if delimiter.is_alphanumeric() || delimiter.is_whitespace() || delimiter == '\\' {
        return (source, "");
    }

    let rest = &source[delimiter.len_utf8()..];
    match rest.rfind(delimiter) {
        Some(end) => (&rest[..end], &rest[end + delimiter.len_utf8()..]),
        None => (source, ""),
    }
}

/// Rewrite named groups to plain groups, recording names by ordinal.
fn replace_capture_groups(
    pattern: &str,
    names: &mut Vec<Option<String>>,
) -> Result<String, PatternError> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.char_indices().peekable();
    let mut class_depth = 0usize;

    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' if class_depth == 0 => {
                class_depth = 1;
                out.push(c);
                // A leading `]` (or `^]`) is literal inside a class.
                if let Some(&(_, '^')) = chars.peek() {
                    out.push('^');
                    chars.next();
                }
                if let Some(&(_, ']')) = chars.peek() {
                    out.push(']');
                    chars.next();
                }
            }
            '[' => {
                out.push(c);
                let posix_token = pattern[index + 1..]
                    .strip_prefix(':')
                    .and_then(|tail| tail.find(":]"))
                    .map(|end| &pattern[index + 1..index + end + 4]);
                match posix_token {
                    Some(token) => {
                        out.push_str(token);
                        for _ in 0..token.chars().count() {
                            chars.next();
                        }
                    }
                    None => class_depth += 1,
                }
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(c);
            }
            '(' if class_depth == 0 => {
                let rest = &pattern[index..];
                match group_kind(rest)? {
                    GroupKind::Named { name, marker_len } => {
                        names.push(Some(name));
                        out.push('(');
                        // The marker is ASCII apart from the name itself.
                        let skip = rest[..marker_len].chars().count() - 1;
                        for _ in 0..skip {
                            chars.next();
                        }
                    }
                    GroupKind::Plain => {
                        names.push(None);
                        out.push('(');
                    }
                    GroupKind::NonCapturing => out.push('('),
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

enum GroupKind {
    Plain,
    NonCapturing,
    Named { name: String, marker_len: usize },
}

fn group_kind(rest: &str) -> Result<GroupKind, PatternError> {
    let Some(after) = rest.strip_prefix("(?") else {
        return Ok(GroupKind::Plain);
    };

    if after.starts_with("<=") || after.starts_with("<!") {
        return Ok(GroupKind::NonCapturing);
    }

    let (closer, name_start) = if after.starts_with("P<") {
        ('>', 4)
    } else if after.starts_with('<') {
        ('>', 3)
    } else if after.starts_with('\'') {
        ('\'', 3)
    } else if after.starts_with('P') {
        return Err(PatternError::NamedCapture(rest.to_string()));
    } else {
        return Ok(GroupKind::NonCapturing);
    };

    let tail = &rest[name_start..];
    match tail.find(closer) {
        Some(end) if end > 0 && !tail[..end].contains(['<', '>', '\'', ')']) => {
            Ok(GroupKind::Named {
                name: tail[..end].to_string(),
                marker_len: name_start + end + closer.len_utf8(),
            })
        }
        _ => Err(PatternError::NamedCapture(rest.to_string())),
    }
}
