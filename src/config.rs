//! Simulator settings
//!
//! Defaults reproduce the reference deployment. Every value can be overridden
//! through a `BEDSIM_*` environment variable.

use bedsim_shared::config::{parse_meal_window, MINUTES_PER_DAY};
use bedsim_shared::record::topic_for;
use bedsim_shared::{policy, ConfigError, InclinationPolicy, VitalsRanges};
use std::str::FromStr;
use std::time::Duration;

use crate::connection::ConnectionConfig;
use crate::simulator::RunConfig;

/// Highest QoS level a broker understands
const MAX_QOS: u32 = 2;

/// The broker link speaks length-prefixed protobuf envelopes, not MQTT
const DEFAULT_BROKER_ADDRESS: &str = "127.0.0.1:7878";

#[derive(Debug, Clone)]
pub struct SimulatorSettings {
    /// `host:port` of an envelope broker
    pub broker_address: String,
    /// Client ids are `<prefix><instance>`
    pub client_id_prefix: String,
    /// Topics are `<prefix>/<instance>/data`
    pub topic_prefix: String,
    pub qos: u32,
    pub tick_interval: Duration,
    pub publish_timeout: Duration,
    pub keep_alive: Duration,
    /// Base seed; bed `n` (0-based) uses `seed + n`. Entropy when unset
    pub seed: Option<u64>,
    pub policy: InclinationPolicy,
    pub vitals: VitalsRanges,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            broker_address: DEFAULT_BROKER_ADDRESS.into(),
            client_id_prefix: "PatientBed".into(),
            topic_prefix: "PatientBed".into(),
            qos: 1,
            tick_interval: Duration::from_secs(policy::DATA_SEND_INTERVAL_SECS),
            publish_timeout: Duration::from_millis(10_000),
            keep_alive: Duration::from_secs(60),
            seed: None,
            policy: InclinationPolicy::default(),
            vitals: VitalsRanges::default(),
        }
    }
}

impl SimulatorSettings {
    /// Defaults overridden from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `BEDSIM_*` key
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let mut s = Self::default();

        if let Some(v) = env.string("BEDSIM_BROKER") {
            s.broker_address = v;
        }
        if let Some(v) = env.string("BEDSIM_CLIENT_PREFIX") {
            s.client_id_prefix = v;
        }
        if let Some(v) = env.string("BEDSIM_TOPIC_PREFIX") {
            s.topic_prefix = v;
        }
        if let Some(v) = env.parse("BEDSIM_QOS")? {
            s.qos = v;
        }
        if let Some(v) = env.parse("BEDSIM_TICK_SECS")? {
            s.tick_interval = Duration::from_secs(v);
        }
        if let Some(v) = env.parse("BEDSIM_PUBLISH_TIMEOUT_MS")? {
            s.publish_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env.parse("BEDSIM_KEEP_ALIVE_SECS")? {
            s.keep_alive = Duration::from_secs(v);
        }
        s.seed = env.parse("BEDSIM_SEED")?;

        let p = &mut s.policy;
        let meal_minutes = env
            .parse("BEDSIM_MEAL_MINUTES")?
            .unwrap_or(policy::MEAL_INCLINATION_DURATION_MINUTES);
        // An empty list is kept so validation can reject it
        match env.raw("BEDSIM_MEAL_TIMES") {
            Some(list) => {
                p.meal_windows = list
                    .split(',')
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| parse_meal_window(t, meal_minutes))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            None => {
                for w in &mut p.meal_windows {
                    w.duration_minutes = meal_minutes;
                }
            }
        }
        if let Some(v) = env.parse("BEDSIM_MEAL_DEGREES")? {
            p.meal_degrees = v;
        }
        if let Some(v) = env.parse("BEDSIM_MINOR_DEGREES")? {
            p.minor_degrees = v;
        }
        if let Some(v) = env.parse("BEDSIM_MINOR_BASE_MINUTES")? {
            p.minor_base_minutes = v;
        }
        if let Some(v) = env.parse("BEDSIM_MINOR_JITTER_MINUTES")? {
            p.minor_jitter_minutes = v;
        }
        if let Some(v) = env.parse("BEDSIM_FLAT_BASE_MINUTES")? {
            p.flat_base_minutes = v;
        }
        if let Some(v) = env.parse("BEDSIM_FLAT_JITTER_MINUTES")? {
            p.flat_jitter_minutes = v;
        }
        if let Some(v) = env.parse("BEDSIM_MINOR_PROBABILITY")? {
            p.minor_probability = v;
        }

        let r = &mut s.vitals;
        if let Some(v) = env.parse("BEDSIM_HEART_RATE_MIN")? {
            r.heart_rate.0 = v;
        }
        if let Some(v) = env.parse("BEDSIM_HEART_RATE_MAX")? {
            r.heart_rate.1 = v;
        }
        if let Some(v) = env.parse("BEDSIM_SPO2_MIN")? {
            r.spo2.0 = v;
        }
        if let Some(v) = env.parse("BEDSIM_SPO2_MAX")? {
            r.spo2.1 = v;
        }

        Ok(s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        self.vitals.validate()?;

        for (name, value) in [
            ("tick interval", self.tick_interval),
            ("keep-alive", self.keep_alive),
            ("publish timeout", self.publish_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidDuration { name });
            }
            if value > Duration::from_secs(u64::from(MINUTES_PER_DAY) * 60) {
                return Err(ConfigError::DurationTooLong {
                    name,
                    minutes: value.as_secs().div_ceil(60),
                    max: MINUTES_PER_DAY,
                });
            }
        }
        if self.qos > MAX_QOS {
            return Err(ConfigError::InvalidValue {
                key: "BEDSIM_QOS".into(),
                value: self.qos.to_string(),
            });
        }
        Ok(())
    }

    pub fn client_id(&self, instance: &str) -> String {
        format!("{}{}", self.client_id_prefix, instance)
    }

    pub fn topic(&self, instance: &str) -> String {
        topic_for(&self.topic_prefix, instance)
    }

    /// Seed for the bed at position `index`
    pub fn seed_for(&self, index: usize) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(index as u64))
    }

    pub fn connection_config(&self, client_id: &str) -> ConnectionConfig {
        ConnectionConfig {
            client_id: client_id.to_string(),
            keep_alive_interval: self.keep_alive,
            publish_timeout: self.publish_timeout,
            ..Default::default()
        }
    }

    pub fn run_config(&self, instance: &str) -> RunConfig {
        RunConfig {
            topic: self.topic(instance),
            qos: self.qos,
            interval: self.tick_interval,
        }
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Blank values count as unset
    fn string(&self, key: &str) -> Option<String> {
        self.raw(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => match raw.trim().parse() {
                Ok(v) => Ok(Some(v)),
                Err(_) => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                }),
            },
        }
    }
}
