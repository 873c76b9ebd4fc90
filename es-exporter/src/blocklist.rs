//! Name-prefix blocklist with memoized verdicts.
//!
//! Patterns are regular expressions anchored at the start of the candidate
//! name only, so `es_node_jvm` also blocks `es_node_jvm_heap_used_in_bytes`.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlocklistError {
    #[error("invalid blocklist pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled blocklist owned by a single collector.
#[derive(Debug)]
pub struct Blocklist {
    patterns: Vec<Regex>,
    verdicts: DashMap<String, bool>,
    /// Number of pattern tests performed; memo hits never increment it.
    evaluations: AtomicUsize,
}

impl Blocklist {
    /// Builds the union of `global` and `source` patterns. Global patterns keep
    /// their order; source patterns are appended unless already present.
    pub fn new<G, S>(global: G, source: S) -> Result<Self, BlocklistError>
    where
        G: IntoIterator,
        G::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let mut literals: Vec<String> = Vec::new();
        for pattern in global
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .chain(source.into_iter().map(|p| p.as_ref().to_string()))
        {
            if !literals.contains(&pattern) {
                literals.push(pattern);
            }
        }

        let patterns = literals
            .into_iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})"))
                    .map_err(|source| BlocklistError::InvalidPattern { pattern, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            verdicts: DashMap::new(),
            evaluations: AtomicUsize::new(0),
        })
    }

    /// A blocklist that never blocks.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            verdicts: DashMap::new(),
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn is_blocked(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        if let Some(verdict) = self.verdicts.get(name) {
            return *verdict;
        }

        let blocked = self.patterns.iter().any(|pattern| {
            self.evaluations.fetch_add(1, Ordering::Relaxed);
            pattern.is_match(name)
        });
        self.verdicts.insert(name.to_string(), blocked);
        blocked
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }
}
