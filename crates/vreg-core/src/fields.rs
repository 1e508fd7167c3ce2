//! Searchable fields and text normalization.
//!
//! `SEARCHABLE_FIELDS` is the one list of record fields that search looks at.
//! The index builder, the fuzzy scan and the scorer all iterate it, so adding a
//! field here makes it searchable everywhere.

use crate::error::{Result, VregError};
use crate::types::VehicleRecord;
use std::fmt;

/// Longest normalized field accepted for indexing.
///
/// Every suffix of a field is inserted into the index, so build cost grows
/// with the square of the field length.
pub const MAX_FIELD_CHARS: usize = 256;

/// A record field that participates in search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Plate,
    ApplicantName,
    Department,
    Brand,
    VehicleType,
    IdentityType,
}

impl SearchField {
    pub fn name(&self) -> &'static str {
        match self {
            SearchField::Plate => "plate",
            SearchField::ApplicantName => "applicant_name",
            SearchField::Department => "department",
            SearchField::Brand => "brand",
            SearchField::VehicleType => "vehicle_type",
            SearchField::IdentityType => "identity_type",
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A searchable field paired with the function that reads it off a record.
pub struct FieldSpec {
    pub field: SearchField,
    pub extract: fn(&VehicleRecord) -> Option<&str>,
}

/// Every searchable field, in scoring order.
pub static SEARCHABLE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        field: SearchField::Plate,
        extract: plate,
    },
    FieldSpec {
        field: SearchField::ApplicantName,
        extract: applicant_name,
    },
    FieldSpec {
        field: SearchField::Department,
        extract: department,
    },
    FieldSpec {
        field: SearchField::Brand,
        extract: brand,
    },
    FieldSpec {
        field: SearchField::VehicleType,
        extract: vehicle_type,
    },
    FieldSpec {
        field: SearchField::IdentityType,
        extract: identity_type,
    },
];

fn plate(r: &VehicleRecord) -> Option<&str> {
    Some(&r.plate)
}

fn applicant_name(r: &VehicleRecord) -> Option<&str> {
    Some(&r.applicant_name)
}

fn department(r: &VehicleRecord) -> Option<&str> {
    r.department.as_deref()
}

fn brand(r: &VehicleRecord) -> Option<&str> {
    r.brand.as_deref()
}

fn vehicle_type(r: &VehicleRecord) -> Option<&str> {
    Some(&r.vehicle_type)
}

fn identity_type(r: &VehicleRecord) -> Option<&str> {
    Some(&r.identity_type)
}

/// Case-fold `text` and drop whitespace and hyphens.
///
/// `"ABC-4567"`, `"abc 4567"` and `"abc4567"` all normalize to `"abc4567"`.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalize a field value for indexing, rejecting values the index must not
/// ingest.
pub fn normalize_field(field: SearchField, raw: &str) -> Result<String> {
    if let Some(c) = raw.chars().find(|c| c.is_control() && !c.is_whitespace()) {
        return Err(VregError::MalformedField {
            field: field.name(),
            reason: format!("contains control character U+{:04X}", c as u32),
        });
    }

    let normalized = normalize(raw);
    let len = normalized.chars().count();
    if len > MAX_FIELD_CHARS {
        return Err(VregError::MalformedField {
            field: field.name(),
            reason: format!("{} characters exceeds limit of {}", len, MAX_FIELD_CHARS),
        });
    }

    Ok(normalized)
}

/// Normalized values of every searchable field on `record`, skipping absent
/// and malformed ones.
pub fn normalized_fields(record: &VehicleRecord) -> impl Iterator<Item = (SearchField, String)> + '_ {
    SEARCHABLE_FIELDS.iter().filter_map(move |entry| {
        let raw = (entry.extract)(record)?;
        normalize_field(entry.field, raw)
            .ok()
            .filter(|n| !n.is_empty())
            .map(|n| (entry.field, n))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::record;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("ABC-4567"), "abc4567");
        assert_eq!(normalize("  Alice  Wang "), "alicewang");
        assert_eq!(normalize("--"), "");
        assert_eq!(normalize("Ökonomie"), "ökonomie");
    }

    #[test]
    fn test_normalize_field_rejects_control_chars() {
        let err = normalize_field(SearchField::Plate, "AB\u{0}C").unwrap_err();
        assert!(matches!(err, VregError::MalformedField { field: "plate", .. }));
    }

    #[test]
    fn test_normalize_field_rejects_oversized() {
        let long = "x".repeat(MAX_FIELD_CHARS + 1);
        assert!(normalize_field(SearchField::Brand, &long).is_err());

        // Hyphens and spaces don't count toward the limit
        let padded = format!("{} -", "x".repeat(MAX_FIELD_CHARS));
        assert!(normalize_field(SearchField::Brand, &padded).is_ok());
    }

    #[test]
    fn test_normalized_fields_skips_missing() {
        let mut rec = record("r1", "ABC-4567", "Alice Wang");
        rec.brand = Some("Toyota".to_string());
        rec.department = None;

        let fields: Vec<_> = normalized_fields(&rec).collect();
        assert!(fields.contains(&(SearchField::Plate, "abc4567".to_string())));
        assert!(fields.contains(&(SearchField::Brand, "toyota".to_string())));
        assert!(!fields.iter().any(|(f, _)| *f == SearchField::Department));
    }

    #[test]
    fn test_table_covers_every_field() {
        let names: Vec<_> = SEARCHABLE_FIELDS.iter().map(|s| s.field.name()).collect();
        assert_eq!(
            names,
            vec!["plate", "applicant_name", "department", "brand", "vehicle_type", "identity_type"]
        );
    }
}
