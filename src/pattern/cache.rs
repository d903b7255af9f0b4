//! Compiled pattern cache.

use std::sync::Arc;

use dashmap::DashMap;

use crate::pattern::{compile, CompiledPattern, PatternError, PcreMatch};

/// Process-wide cache of compiled patterns, keyed by delimited source.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: DashMap<String, Arc<CompiledPattern>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `expr` (without delimiters) or return the cached result.
    pub fn get(&self, expr: &str, case_sensitive: bool) -> Result<Arc<CompiledPattern>, PatternError> {
        let source = format!("%{}%{}", expr, if case_sensitive { "" } else { "i" });
        if let Some(pattern) = self.compiled.get(&source) {
            return Ok(pattern.clone());
        }

        let pattern = Arc::new(compile(&source)?);
        self.compiled.insert(source, pattern.clone());
        Ok(pattern)
    }

    /// Match `value` against `expr`. A missing value never matches.
    pub fn match_pcre(
        &self,
        expr: &str,
        value: Option<&str>,
        case_sensitive: bool,
    ) -> Result<Option<PcreMatch>, PatternError> {
        let Some(value) = value else {
            return Ok(None);
        };
        Ok(self.get(expr, case_sensitive)?.exec(value))
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
