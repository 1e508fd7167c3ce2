//! Subsequence ("fuzzy") matching.
//!
//! A query matches a field when the query's characters appear in the field in
//! order, with anything (including nothing) between them. `"a4"` therefore
//! matches `"abc4567"` even though it is not a substring.
//!
//! Matching is stateless: a compiled `SubsequencePattern` is `Send + Sync` and
//! can be shared across Rayon workers scanning large mirrors.

use crate::error::{Result, VregError};
use crate::fields::{normalize_field, SEARCHABLE_FIELDS};
use crate::types::{Mirror, RecordId, VehicleRecord};
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};

/// Wildcard placed between query characters: any run, shortest first.
const GAP: &str = ".*?";

/// Compiled size limit used by [`SubsequencePattern::new`]
pub const DEFAULT_SIZE_LIMIT: usize = 1 << 20;

/// Build the regex source for a subsequence match of `normalized_query`.
///
/// Every character is escaped on its own, so metacharacters in the query are
/// matched literally.
pub fn build_subsequence_pattern(normalized_query: &str) -> String {
    normalized_query
        .chars()
        .map(|c| regex::escape(c.encode_utf8(&mut [0u8; 4])))
        .collect::<Vec<_>>()
        .join(GAP)
}

/// A compiled subsequence matcher for one normalized query.
#[derive(Debug, Clone)]
pub struct SubsequencePattern {
    regex: Regex,
}

impl SubsequencePattern {
    /// Compile a matcher for an already normalized query.
    pub fn new(normalized_query: &str) -> Result<Self> {
        Self::with_size_limit(normalized_query, DEFAULT_SIZE_LIMIT)
    }

    /// Compile a matcher whose compiled program may not exceed `bytes`.
    pub fn with_size_limit(normalized_query: &str, bytes: usize) -> Result<Self> {
        let source = build_subsequence_pattern(normalized_query);
        let regex = RegexBuilder::new(&source)
            .size_limit(bytes)
            .build()
            .map_err(|e| VregError::InvalidPattern {
                pattern: normalized_query.to_string(),
                reason: e.to_string(),
            })?;
        Ok(SubsequencePattern { regex })
    }

    /// The regex source this pattern was compiled from
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// True if `normalized_field` contains the query as a subsequence.
    pub fn matches(&self, normalized_field: &str) -> bool {
        self.regex.is_match(normalized_field)
    }

    /// True if any searchable field of `record` matches.
    ///
    /// Fields that fail normalization are treated as non-matching, the same way
    /// the index builder skips them.
    pub fn matches_record(&self, record: &VehicleRecord) -> bool {
        SEARCHABLE_FIELDS.iter().any(|entry| {
            (entry.extract)(record)
                .and_then(|raw| normalize_field(entry.field, raw).ok())
                .is_some_and(|normalized| self.matches(&normalized))
        })
    }
}

/// Free-function form of [`SubsequencePattern::matches`].
pub fn matches(normalized_field: &str, pattern: &SubsequencePattern) -> bool {
    pattern.matches(normalized_field)
}

/// Scan every mirror record and return those matching `pattern`, in mirror
/// order.
///
/// Mirrors larger than `parallel_threshold` are scanned with Rayon.
pub fn scan_mirror(
    mirror: &Mirror,
    pattern: &SubsequencePattern,
    parallel_threshold: usize,
) -> Vec<RecordId> {
    let records = mirror.records();
    if records.len() > parallel_threshold {
        records
            .par_iter()
            .filter(|r| pattern.matches_record(r))
            .map(|r| r.id.clone())
            .collect()
    } else {
        records
            .iter()
            .filter(|r| pattern.matches_record(r))
            .map(|r| r.id.clone())
            .collect()
    }
}
