//! # Room Records
//!
//! `RoomRecord` is the serializable snapshot written to persistence after a
//! run: the inputs the run read, every stage result it produced, and when.
//!
//! ## Structure
//!
//! ```text
//! RoomRecord
//! ├── version: schema version of the record format
//! ├── room_id
//! ├── computed_at: UTC timestamp of the run
//! ├── inputs: RoomSnapshot (climate inputs + optional capacity inputs)
//! ├── airflow / thermal_gains / capacity: stage results (absent if not run)
//! ```
//!
//! Records are handed to a [`PersistenceSink`]. Saving is opportunistic:
//! a failed save never touches the in-memory results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calculations::{AirflowResult, CapacitySolution, RoomResults, ThermalGainsResult};
use crate::errors::{CalcError, CalcResult};
use crate::room::{RoomId, RoomSnapshot};

/// Current schema version for room records
pub const SCHEMA_VERSION: &str = "0.1.0";

fn schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Everything one run knew and produced for a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    #[serde(default = "schema_version")]
    pub version: String,

    pub room_id: RoomId,

    pub computed_at: DateTime<Utc>,

    pub inputs: RoomSnapshot,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airflow: Option<AirflowResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermal_gains: Option<ThermalGainsResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacitySolution>,
}

impl RoomRecord {
    /// Stamp a record for `room_id` with the current time.
    pub fn new(room_id: RoomId, inputs: RoomSnapshot, results: RoomResults) -> Self {
        RoomRecord {
            version: schema_version(),
            room_id,
            computed_at: Utc::now(),
            inputs,
            airflow: results.airflow,
            thermal_gains: results.thermal_gains,
            capacity: results.capacity,
        }
    }

    pub fn results(&self) -> RoomResults {
        RoomResults {
            airflow: self.airflow,
            thermal_gains: self.thermal_gains,
            capacity: self.capacity.clone(),
        }
    }

    pub fn to_json(&self) -> CalcResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a record and check that its schema version is readable.
    pub fn from_json(json: &str) -> CalcResult<Self> {
        let record: RoomRecord = serde_json::from_str(json)?;
        validate_version(&record.version)?;
        Ok(record)
    }
}

/// Somewhere room records can be saved.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(&self, record: &RoomRecord) -> CalcResult<()>;
}

/// Validate that a record version is compatible with the current schema.
///
/// Major versions must match; while on 0.x a newer minor is rejected too.
pub fn validate_version(record_version: &str) -> CalcResult<()> {
    let mismatch = || CalcError::VersionMismatch {
        file_version: record_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };

    let parse = |v: &str| -> Vec<u32> { v.split('.').filter_map(|p| p.parse().ok()).collect() };
    let record_parts = parse(record_version);
    let current_parts = parse(SCHEMA_VERSION);

    let (Some(&record_major), Some(&current_major)) = (record_parts.first(), current_parts.first()) else {
        return Err(mismatch());
    };
    if record_major != current_major {
        return Err(mismatch());
    }

    if current_major == 0 {
        if let (Some(&record_minor), Some(&current_minor)) = (record_parts.get(1), current_parts.get(1)) {
            if record_minor > current_minor {
                return Err(mismatch());
            }
        }
    }

    Ok(())
}
