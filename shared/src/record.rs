//! Telemetry record published once per tick
//!
//! The JSON field names are consumed by the downstream ingestion rules and
//! must not change.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::state_machine::InclinationReading;
use crate::vitals::VitalSigns;

/// ISO-8601 local time with a `+HH:MM` offset
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Bed position reported alongside the angle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BedState {
    Flat,
    Inclined,
}

impl BedState {
    /// The state an angle implies: 0.0 is flat, anything above is inclined
    pub fn for_degrees(degrees: f64) -> Self {
        if degrees > 0.0 {
            BedState::Inclined
        } else {
            BedState::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BedState::Flat => "FLAT",
            BedState::Inclined => "INCLINED",
        }
    }
}

impl std::fmt::Display for BedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of one bed for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub device_id: String,
    pub timestamp: String,
    pub heart_rate: f64,
    pub spo2: f64,
    #[serde(rename = "inclination")]
    pub inclination_degrees: f64,
    pub bed_state: BedState,
}

impl TelemetryRecord {
    pub fn new(
        device_id: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        vitals: VitalSigns,
        reading: InclinationReading,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: format_timestamp(&timestamp),
            heart_rate: vitals.heart_rate,
            spo2: vitals.spo2,
            inclination_degrees: reading.degrees,
            bed_state: reading.bed_state,
        }
    }

    /// `bedState` agrees with the reported angle
    pub fn is_consistent(&self) -> bool {
        BedState::for_degrees(self.inclination_degrees) == self.bed_state
    }

    /// Indented JSON, the payload format sent to the broker
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

pub fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Topic a device publishes its readings on: `<prefix>/<device>/data`
pub fn topic_for(prefix: &str, device: &str) -> String {
    format!("{}/{}/data", prefix.trim_end_matches('/'), device)
}
