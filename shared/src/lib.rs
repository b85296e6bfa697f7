//! Patient Bed Simulator Shared Types
//!
//! This crate provides the simulation core (vitals sampling and the bed
//! inclination state machine), the telemetry record published for every tick,
//! and the envelope codec spoken between simulated beds and the broker.

pub mod clock;
pub mod codec;
pub mod config;
pub mod proto;
pub mod random;
pub mod record;
pub mod state_machine;
pub mod vitals;

use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use config::{ConfigError, InclinationPolicy, MealWindow, VitalsRanges};
pub use proto::*;
pub use record::{BedState, TelemetryRecord};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Reference simulation policy
pub mod policy {
    /// Interval between two published readings
    pub const DATA_SEND_INTERVAL_SECS: u64 = 5;

    /// Meal start times as (hour, minute) in local time
    pub const MEAL_START_TIMES: [(u32, u32); 3] = [(8, 0), (12, 0), (18, 0)];

    /// How long each meal keeps the bed inclined
    pub const MEAL_INCLINATION_DURATION_MINUTES: u32 = 30;

    /// Bed angle while a meal is served
    pub const MEAL_INCLINATION_DEGREES: f64 = 60.0;

    /// Bed angle of a minor, unscheduled incline
    pub const MINOR_INCLINATION_DEGREES: f64 = 30.0;

    pub const MINOR_INCLINATION_BASE_MINUTES: u32 = 10;
    pub const MINOR_INCLINATION_JITTER_MINUTES: u32 = 5;

    pub const FLAT_STATE_BASE_MINUTES: u32 = 45;
    pub const FLAT_STATE_JITTER_MINUTES: u32 = 15;

    /// Chance of a minor incline each time a flat period runs out
    pub const PROBABILITY_MINOR_INCLINE: f64 = 0.20;

    pub const HEART_RATE_MIN: f64 = 55.0;
    pub const HEART_RATE_MAX: f64 = 85.0;

    pub const SPO2_MIN: f64 = 95.0;
    pub const SPO2_MAX: f64 = 99.5;
}

/// Builder helpers for creating messages
impl Envelope {
    /// Wrap a publish request for the given topic
    pub fn publish(
        client_id: impl Into<String>,
        sequence_id: u64,
        topic: impl Into<String>,
        payload: Bytes,
        qos: u32,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            sequence_id,
            timestamp_ms: now_ms(),
            payload: Some(envelope::Payload::Publish(Publish {
                topic: topic.into(),
                payload,
                qos,
            })),
        }
    }

    /// Create a keep-alive frame
    pub fn keep_alive(client_id: impl Into<String>, sequence_id: u64, uptime_ms: u64) -> Self {
        Self {
            client_id: client_id.into(),
            sequence_id,
            timestamp_ms: now_ms(),
            payload: Some(envelope::Payload::KeepAlive(KeepAlive { uptime_ms })),
        }
    }

    /// Acknowledge a received publish
    pub fn publish_ack(client_id: impl Into<String>, sequence_id: u64, ack_sequence_id: u64) -> Self {
        Self {
            client_id: client_id.into(),
            sequence_id,
            timestamp_ms: now_ms(),
            payload: Some(envelope::Payload::PublishAck(PublishAck { ack_sequence_id })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_envelope_creation() {
        let env = Envelope::publish("PatientBed1", 7, "PatientBed/1/data", Bytes::from_static(b"{}"), 1);
        assert_eq!(env.client_id, "PatientBed1");
        assert_eq!(env.sequence_id, 7);
        assert!(env.timestamp_ms > 0);

        match env.payload {
            Some(envelope::Payload::Publish(p)) => {
                assert_eq!(p.topic, "PatientBed/1/data");
                assert_eq!(p.qos, 1);
                assert_eq!(&p.payload[..], b"{}");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_keep_alive_creation() {
        let env = Envelope::keep_alive("PatientBed2", 1, 1500);
        assert!(matches!(
            env.payload,
            Some(envelope::Payload::KeepAlive(KeepAlive { uptime_ms: 1500 }))
        ));
    }

    #[test]
    fn test_policy_constants_are_consistent() {
        assert!(policy::HEART_RATE_MIN < policy::HEART_RATE_MAX);
        assert!(policy::SPO2_MIN < policy::SPO2_MAX);
        assert!(policy::MINOR_INCLINATION_DEGREES < policy::MEAL_INCLINATION_DEGREES);
    }
}
