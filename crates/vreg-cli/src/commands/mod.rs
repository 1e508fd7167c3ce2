//! Subcommand implementations.

pub mod add;
pub mod delete;
pub mod query;
pub mod status;
pub mod update;
pub mod watch;

use vreg_core::VehicleRecord;

/// One-line text rendering of a record
pub fn describe(record: &VehicleRecord) -> String {
    let mut line = format!(
        "{:<10} {:<12} {:<20} {:<10} {:<9}",
        record.id.as_str(),
        record.plate,
        record.applicant_name,
        record.vehicle_type,
        record.approval_status.to_string()
    );
    if let Some(ref department) = record.department {
        line.push_str(&format!(" {}", department));
    }
    line
}

/// JSON rendering of a record, with an optional score
pub fn to_json(record: &VehicleRecord, score: Option<u32>) -> anyhow::Result<serde_json::Value> {
    let mut value = serde_json::to_value(record)?;
    if let (Some(score), Some(object)) = (score, value.as_object_mut()) {
        object.insert("score".to_string(), score.into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use vreg_core::{NewVehicleRecord, RecordId};

    fn sample() -> VehicleRecord {
        NewVehicleRecord::new(
            "ABC-4567",
            "Alice Wang",
            "car",
            "staff",
            "0912345678",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
        .with_department("Physics")
        .into_record(RecordId::new("rec-1"), Utc::now())
    }

    #[test]
    fn test_describe_includes_key_fields() {
        let line = describe(&sample());
        assert!(line.starts_with("rec-1"));
        assert!(line.contains("ABC-4567"));
        assert!(line.contains("pending"));
        assert!(line.ends_with("Physics"));
    }

    #[test]
    fn test_json_carries_score() {
        let value = to_json(&sample(), Some(505)).unwrap();
        assert_eq!(value["plate"], "ABC-4567");
        assert_eq!(value["applicantName"], "Alice Wang");
        assert_eq!(value["score"], 505);

        let plain = to_json(&sample(), None).unwrap();
        assert!(plain.get("score").is_none());
    }
}
