//! Substring index over a mirror snapshot.
//!
//! The `SearchIndex` is a character trie built from every suffix of every
//! normalized searchable field. Walking the trie from the root with a query
//! therefore reaches a node exactly when the query occurs somewhere inside a
//! field, and the node carries the records that contain it.
//!
//! ## Architecture
//!
//! - Nodes live in one `Vec<Node>` arena and refer to children by position
//! - Each node keeps the ordinals (mirror positions) of every record whose
//!   inserted suffix passed through it, deduplicated and in mirror order
//! - A finished index is immutable; refreshes build a new one and swap it in
//!
//! Build cost is proportional to the sum of squared field lengths. That is
//! paid once per refresh, not per keystroke.

use crate::fields::{normalize_field, SEARCHABLE_FIELDS};
use crate::types::{Mirror, RecordId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

#[derive(Debug, Default)]
struct Node {
    children: HashMap<char, usize>,
    /// Ordinals of records containing the path to this node, ascending
    records: Vec<u32>,
}

/// Statistics about a built index
#[derive(Debug, Clone)]
pub struct IndexStats {
    /// Records the index was built from
    pub record_count: usize,

    /// Trie nodes, root included
    pub node_count: usize,

    /// Fields skipped because they could not be normalized
    pub skipped_fields: usize,

    /// How long the build took
    pub build_time: Duration,

    /// When the build finished
    pub built_at: DateTime<Utc>,
}

/// Immutable substring index built from one mirror snapshot.
#[derive(Debug)]
pub struct SearchIndex {
    nodes: Vec<Node>,
    /// Ordinal -> record identifier
    ids: Vec<RecordId>,
    stats: IndexStats,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl SearchIndex {
    /// An index with no records; every lookup misses.
    pub fn empty() -> Self {
        SearchIndex {
            nodes: vec![Node::default()],
            ids: Vec::new(),
            stats: IndexStats {
                record_count: 0,
                node_count: 1,
                skipped_fields: 0,
                build_time: Duration::ZERO,
                built_at: Utc::now(),
            },
        }
    }

    /// Build a fresh index from a mirror.
    ///
    /// A field that fails normalization is logged and skipped; the rest of the
    /// record and the rest of the mirror are still indexed.
    #[instrument(skip(mirror), fields(records = mirror.len()))]
    pub fn build(mirror: &Mirror) -> Self {
        let start = Instant::now();
        let mut index = SearchIndex::empty();
        let mut skipped_fields = 0usize;

        for (ordinal, record) in mirror.records().iter().enumerate() {
            let ordinal = ordinal as u32;
            index.ids.push(record.id.clone());

            for entry in SEARCHABLE_FIELDS {
                let Some(raw) = (entry.extract)(record) else {
                    continue;
                };

                match normalize_field(entry.field, raw) {
                    Ok(normalized) => index.insert_suffixes(&normalized, ordinal),
                    Err(e) => {
                        skipped_fields += 1;
                        warn!(record = %record.id, error = %e, "Skipping field during index build");
                    }
                }
            }
        }

        index.stats = IndexStats {
            record_count: index.ids.len(),
            node_count: index.nodes.len(),
            skipped_fields,
            build_time: start.elapsed(),
            built_at: Utc::now(),
        };

        info!(
            records = index.stats.record_count,
            nodes = index.stats.node_count,
            skipped = skipped_fields,
            elapsed_ms = index.stats.build_time.as_secs_f64() * 1000.0,
            "Search index built"
        );

        index
    }

    /// Insert `text` starting at every character offset.
    fn insert_suffixes(&mut self, text: &str, ordinal: u32) {
        let chars: Vec<char> = text.chars().collect();
        for start in 0..chars.len() {
            self.insert_path(&chars[start..], ordinal);
        }
    }

    fn insert_path(&mut self, path: &[char], ordinal: u32) {
        let mut current = 0usize;
        for &c in path {
            let next = match self.nodes[current].children.get(&c) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[current].children.insert(c, child);
                    child
                }
            };

            // Ordinals arrive in ascending order, so a repeat is always last
            let records = &mut self.nodes[next].records;
            if records.last() != Some(&ordinal) {
                records.push(ordinal);
            }
            current = next;
        }
    }

    /// Walk the trie along `query`; None if the walk falls off.
    fn walk(&self, query: &str) -> Option<&Node> {
        let mut current = 0usize;
        for c in query.chars() {
            current = *self.nodes[current].children.get(&c)?;
        }
        Some(&self.nodes[current])
    }

    /// Records whose normalized searchable fields contain `normalized_query`,
    /// in mirror order.
    ///
    /// The query must already be normalized. An empty query returns nothing;
    /// unfiltered listings come from the mirror itself.
    pub fn lookup(&self, normalized_query: &str) -> Vec<RecordId> {
        if normalized_query.is_empty() {
            return Vec::new();
        }

        match self.walk(normalized_query) {
            Some(node) => node
                .records
                .iter()
                .map(|&ordinal| self.ids[ordinal as usize].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of records this index was built from
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }
}

/// Build a new index from a mirror snapshot.
pub fn build_index(mirror: &Mirror) -> SearchIndex {
    SearchIndex::build(mirror)
}
