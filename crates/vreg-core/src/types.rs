//! Core data types for Vreg.
//!
//! This module defines the vehicle registration record and the mirror that
//! holds the local copy of the remote record set. These types are designed
//! to be:
//!
//! - **Serializable**: Records round-trip through JSON record stores
//! - **Comparable**: Structural equality drives change detection on refresh
//! - **Shareable**: A mirror is immutable once built and handed out behind `Arc`

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Unique identifier for a record, assigned by the remote store.
///
/// This is the only stable join key. Plates are for display and human search
/// and may repeat across soft-deleted records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Create a new record ID
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    /// Get the record ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

/// Review state of a registration application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    /// Small score bonus used to break ties between equally relevant records
    pub fn tiebreak_bonus(&self) -> u32 {
        match self {
            ApprovalStatus::Approved => 10,
            ApprovalStatus::Pending => 5,
            ApprovalStatus::Rejected => 0,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(format!("Unknown approval status: {}", s)),
        }
    }
}

/// A single vehicle registration as stored by the remote record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    /// Identifier assigned by the remote store
    pub id: RecordId,

    /// License plate as entered (e.g. "ABC-4567")
    pub plate: String,

    /// Name of the person applying for the registration
    pub applicant_name: String,

    /// Vehicle category (car, motorcycle, ...)
    pub vehicle_type: String,

    /// Applicant category (staff, student, visitor, ...)
    pub identity_type: String,

    pub contact_phone: String,

    #[serde(default)]
    pub department: Option<String>,

    #[serde(default)]
    pub brand: Option<String>,

    #[serde(default)]
    pub color: Option<String>,

    pub application_date: NaiveDate,

    #[serde(default)]
    pub approval_status: ApprovalStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a record; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicleRecord {
    pub plate: String,
    pub applicant_name: String,
    pub vehicle_type: String,
    pub identity_type: String,
    pub contact_phone: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub application_date: NaiveDate,
}

impl NewVehicleRecord {
    /// Create a payload with the required fields; optional fields start empty
    pub fn new(
        plate: impl Into<String>,
        applicant_name: impl Into<String>,
        vehicle_type: impl Into<String>,
        identity_type: impl Into<String>,
        contact_phone: impl Into<String>,
        application_date: NaiveDate,
    ) -> Self {
        NewVehicleRecord {
            plate: plate.into(),
            applicant_name: applicant_name.into(),
            vehicle_type: vehicle_type.into(),
            identity_type: identity_type.into(),
            contact_phone: contact_phone.into(),
            department: None,
            brand: None,
            color: None,
            application_date,
        }
    }

    /// Set the department
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Set the brand
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Set the color
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Turn the payload into a stored record. New records start pending.
    pub fn into_record(self, id: RecordId, now: DateTime<Utc>) -> VehicleRecord {
        VehicleRecord {
            id,
            plate: self.plate,
            applicant_name: self.applicant_name,
            vehicle_type: self.vehicle_type,
            identity_type: self.identity_type,
            contact_phone: self.contact_phone,
            department: self.department,
            brand: self.brand,
            color: self.color,
            application_date: self.application_date,
            approval_status: ApprovalStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPatch {
    pub plate: Option<String>,
    pub applicant_name: Option<String>,
    pub vehicle_type: Option<String>,
    pub identity_type: Option<String>,
    pub contact_phone: Option<String>,
    pub department: Option<String>,
    pub brand: Option<String>,
    pub color: Option<String>,
    pub application_date: Option<NaiveDate>,
    pub approval_status: Option<ApprovalStatus>,
}

impl RecordPatch {
    /// True if the patch would not change anything
    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }

    /// Apply every present field to `record` and bump its `updated_at`.
    pub fn apply_to(&self, record: &mut VehicleRecord, now: DateTime<Utc>) {
        if let Some(ref v) = self.plate {
            record.plate = v.clone();
        }
        if let Some(ref v) = self.applicant_name {
            record.applicant_name = v.clone();
        }
        if let Some(ref v) = self.vehicle_type {
            record.vehicle_type = v.clone();
        }
        if let Some(ref v) = self.identity_type {
            record.identity_type = v.clone();
        }
        if let Some(ref v) = self.contact_phone {
            record.contact_phone = v.clone();
        }
        if let Some(ref v) = self.department {
            record.department = Some(v.clone());
        }
        if let Some(ref v) = self.brand {
            record.brand = Some(v.clone());
        }
        if let Some(ref v) = self.color {
            record.color = Some(v.clone());
        }
        if let Some(v) = self.application_date {
            record.application_date = v;
        }
        if let Some(v) = self.approval_status {
            record.approval_status = v;
        }
        record.updated_at = now;
    }
}

/// The local copy of every remote record, in store order.
///
/// A mirror is never mutated after construction. Refreshes build a new one
/// and swap it in whole, so a reader holding an `Arc<Mirror>` always sees a
/// consistent snapshot.
#[derive(Debug, Clone, Default)]
pub struct Mirror {
    records: Vec<VehicleRecord>,
    positions: HashMap<RecordId, usize>,
}

impl Mirror {
    /// Build a mirror from records in store order.
    ///
    /// If an identifier repeats, the first occurrence is kept and later
    /// ones are dropped, so every id appears once.
    pub fn new(records: Vec<VehicleRecord>) -> Self {
        let mut positions = HashMap::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());

        for record in records {
            if positions.contains_key(&record.id) {
                warn!(id = %record.id, "Dropping duplicate record id");
                continue;
            }
            positions.insert(record.id.clone(), unique.len());
            unique.push(record);
        }

        Mirror {
            records: unique,
            positions,
        }
    }

    /// Records in store order
    pub fn records(&self) -> &[VehicleRecord] {
        &self.records
    }

    /// Look a record up by identifier
    pub fn get(&self, id: &RecordId) -> Option<&VehicleRecord> {
        self.positions.get(id).map(|&i| &self.records[i])
    }

    /// Position of a record in store order
    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PartialEq for Mirror {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl Eq for Mirror {}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A record with sensible defaults for tests
    pub fn record(id: &str, plate: &str, applicant: &str) -> VehicleRecord {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        VehicleRecord {
            id: RecordId::new(id),
            plate: plate.to_string(),
            applicant_name: applicant.to_string(),
            vehicle_type: "car".to_string(),
            identity_type: "staff".to_string(),
            contact_phone: "0912345678".to_string(),
            department: None,
            brand: None,
            color: None,
            application_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            approval_status: ApprovalStatus::Pending,
            created_at: created,
            updated_at: created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn test_mirror_drops_duplicate_ids() {
        let mirror = Mirror::new(vec![
            record("r1", "ABC-4567", "Alice"),
            record("r2", "XYZ-0001", "Bob"),
            record("r1", "DUP-0000", "Mallory"),
        ]);

        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror.get(&RecordId::new("r1")).unwrap().plate, "ABC-4567");
        let plates: Vec<&str> = mirror.records().iter().map(|r| r.plate.as_str()).collect();
        assert_eq!(plates, vec!["ABC-4567", "XYZ-0001"]);
    }

    #[test]
    fn test_approval_status_parse() {
        assert_eq!("approved".parse::<ApprovalStatus>(), Ok(ApprovalStatus::Approved));
        assert_eq!("REJECTED".parse::<ApprovalStatus>(), Ok(ApprovalStatus::Rejected));
        assert!("unknown".parse::<ApprovalStatus>().is_err());
        assert_eq!(ApprovalStatus::Pending.to_string(), "pending");
    }

    #[test]
    fn test_tiebreak_order() {
        assert!(ApprovalStatus::Approved.tiebreak_bonus() > ApprovalStatus::Pending.tiebreak_bonus());
        assert!(ApprovalStatus::Pending.tiebreak_bonus() > ApprovalStatus::Rejected.tiebreak_bonus());
    }

    #[test]
    fn test_patch_apply() {
        let mut rec = record("r1", "ABC-4567", "Alice Wang");
        let patch = RecordPatch {
            approval_status: Some(ApprovalStatus::Approved),
            brand: Some("Toyota".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());

        let later = rec.updated_at + chrono::Duration::hours(1);
        patch.apply_to(&mut rec, later);

        assert_eq!(rec.approval_status, ApprovalStatus::Approved);
        assert_eq!(rec.brand.as_deref(), Some("Toyota"));
        assert_eq!(rec.plate, "ABC-4567");
        assert_eq!(rec.updated_at, later);
    }

    #[test]
    fn test_mirror_lookup() {
        let mirror = Mirror::new(vec![
            record("r1", "ABC-4567", "Alice"),
            record("r2", "XYZ-0001", "Bob"),
        ]);
        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror.position(&RecordId::new("r2")), Some(1));
        assert_eq!(mirror.get(&RecordId::new("r1")).unwrap().plate, "ABC-4567");
        assert!(mirror.get(&RecordId::new("missing")).is_none());
    }

    #[test]
    fn test_mirror_structural_equality() {
        let a = Mirror::new(vec![record("r1", "ABC-4567", "Alice")]);
        let b = Mirror::new(vec![record("r1", "ABC-4567", "Alice")]);
        assert_eq!(a, b);

        let mut changed = record("r1", "ABC-4567", "Alice");
        changed.approval_status = ApprovalStatus::Approved;
        assert_ne!(a, Mirror::new(vec![changed]));
    }

    #[test]
    fn test_record_json_field_names() {
        let rec = record("r1", "ABC-4567", "Alice");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["applicantName"], "Alice");
        assert_eq!(json["approvalStatus"], "pending");
        assert_eq!(json["id"], "r1");
    }
}
