//! Relevance scoring.
//!
//! Scores are additive:
//!
//! | Rule                                     | Points |
//! |------------------------------------------|--------|
//! | normalized plate equals the query        | 1000   |
//! | otherwise, plate contains the query      | 500    |
//! | applicant name contains the query        | 200    |
//! | each other searchable field containing it| 50     |
//! | approved / pending / rejected            | 10/5/0 |
//!
//! Ranking is a stable sort on descending score, so equal scores keep mirror
//! order and repeated queries always rank the same way.

use crate::fields::{normalize, normalize_field, SearchField, SEARCHABLE_FIELDS};
use crate::types::VehicleRecord;

pub const EXACT_PLATE: u32 = 1000;
pub const PLATE_SUBSTRING: u32 = 500;
pub const APPLICANT_SUBSTRING: u32 = 200;
pub const OTHER_FIELD_SUBSTRING: u32 = 50;

/// A record paired with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matching record
    pub record: VehicleRecord,

    /// Relevance score (higher is more relevant)
    pub score: u32,
}

impl SearchHit {
    pub fn new(record: VehicleRecord, score: u32) -> Self {
        SearchHit { record, score }
    }
}

/// Score `record` against a raw (not yet normalized) query.
pub fn score(record: &VehicleRecord, raw_query: &str) -> u32 {
    score_normalized(record, &normalize(raw_query))
}

/// Score `record` against an already normalized query.
pub fn score_normalized(record: &VehicleRecord, query: &str) -> u32 {
    if query.is_empty() {
        return 0;
    }

    let mut total = 0u32;
    for entry in SEARCHABLE_FIELDS {
        // Malformed values are skipped here just as the index skips them
        let Some(value) = (entry.extract)(record)
            .and_then(|raw| normalize_field(entry.field, raw).ok())
        else {
            continue;
        };

        total += match entry.field {
            SearchField::Plate if value == query => EXACT_PLATE,
            SearchField::Plate if value.contains(query) => PLATE_SUBSTRING,
            SearchField::Plate => 0,
            SearchField::ApplicantName if value.contains(query) => APPLICANT_SUBSTRING,
            SearchField::ApplicantName => 0,
            _ if value.contains(query) => OTHER_FIELD_SUBSTRING,
            _ => 0,
        };
    }

    total + record.approval_status.tiebreak_bonus()
}

/// Score and sort candidates given in mirror order, best first.
pub fn rank<'a, I>(candidates: I, raw_query: &str) -> Vec<(&'a VehicleRecord, u32)>
where
    I: IntoIterator<Item = &'a VehicleRecord>,
{
    let query = normalize(raw_query);
    let mut scored: Vec<_> = candidates
        .into_iter()
        .map(|r| (r, score_normalized(r, &query)))
        .collect();
    // sort_by is stable: ties keep mirror order
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
}
