//! Simulation policy configuration
//!
//! All policy values live in plain structs so every run (and every test) can
//! use its own schedule. `Default` reproduces the reference policy in
//! [`crate::policy`].

use chrono::{NaiveTime, Timelike};
use thiserror::Error;

use crate::policy;

/// Longest meal window or dwell period a policy may ask for
pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Meal schedule is empty")]
    EmptyMealSchedule,

    #[error("Meal window at {start} has zero length")]
    EmptyMealWindow { start: NaiveTime },

    #[error("Invalid {name} angle: {value} degrees (must be > 0)")]
    InvalidAngle { name: &'static str, value: f64 },

    #[error("Invalid {name} duration: must be greater than zero")]
    InvalidDuration { name: &'static str },

    #[error("{name} duration too long: {minutes} minutes (max: {max})")]
    DurationTooLong { name: &'static str, minutes: u64, max: u32 },

    #[error("Invalid probability: {0} (must be within 0..=1)")]
    InvalidProbability(f64),

    #[error("Invalid {name} range: [{min}, {max})")]
    InvalidRange { name: &'static str, min: f64, max: f64 },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// A daily interval during which the bed is inclined for a meal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MealWindow {
    pub start: NaiveTime,
    pub duration_minutes: u32,
}

impl MealWindow {
    pub fn new(start: NaiveTime, duration_minutes: u32) -> Self {
        Self {
            start,
            duration_minutes,
        }
    }

    /// Build a window from an (hour, minute) start; `None` if the time is invalid
    pub fn at(hour: u32, minute: u32, duration_minutes: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|start| Self::new(start, duration_minutes))
    }

    fn start_minute(&self) -> u32 {
        self.start.hour() * 60 + self.start.minute()
    }

    fn end_minute(&self) -> u32 {
        self.start_minute().saturating_add(self.duration_minutes)
    }

    /// Whether the minute of `time` falls within `[start, start + duration)`.
    ///
    /// Seconds are ignored and windows do not wrap past midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let minute = time.hour() * 60 + time.minute();
        let start = self.start_minute();
        minute >= start && minute < self.end_minute()
    }
}

/// Parse `"HH:MM"` into a meal window of the given length
pub fn parse_meal_window(text: &str, duration_minutes: u32) -> Result<MealWindow, ConfigError> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .map(|start| MealWindow::new(start, duration_minutes))
        .map_err(|_| ConfigError::InvalidValue {
            key: "meal window".into(),
            value: text.into(),
        })
}

/// Timing and probability policy for the inclination state machine
#[derive(Debug, Clone, PartialEq)]
pub struct InclinationPolicy {
    pub meal_windows: Vec<MealWindow>,
    pub meal_degrees: f64,
    pub minor_degrees: f64,
    pub minor_base_minutes: u32,
    pub minor_jitter_minutes: u32,
    pub flat_base_minutes: u32,
    pub flat_jitter_minutes: u32,
    pub minor_probability: f64,
}

impl Default for InclinationPolicy {
    fn default() -> Self {
        let meal_windows = policy::MEAL_START_TIMES
            .iter()
            .filter_map(|&(h, m)| MealWindow::at(h, m, policy::MEAL_INCLINATION_DURATION_MINUTES))
            .collect();

        Self {
            meal_windows,
            meal_degrees: policy::MEAL_INCLINATION_DEGREES,
            minor_degrees: policy::MINOR_INCLINATION_DEGREES,
            minor_base_minutes: policy::MINOR_INCLINATION_BASE_MINUTES,
            minor_jitter_minutes: policy::MINOR_INCLINATION_JITTER_MINUTES,
            flat_base_minutes: policy::FLAT_STATE_BASE_MINUTES,
            flat_jitter_minutes: policy::FLAT_STATE_JITTER_MINUTES,
            minor_probability: policy::PROBABILITY_MINOR_INCLINE,
        }
    }
}

impl InclinationPolicy {
    /// Reject schedules the state machine cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.meal_windows.is_empty() {
            return Err(ConfigError::EmptyMealSchedule);
        }
        for w in &self.meal_windows {
            if w.duration_minutes == 0 {
                return Err(ConfigError::EmptyMealWindow { start: w.start });
            }
            check_minutes("meal window", u64::from(w.duration_minutes))?;
        }
        // A zero angle would report INCLINED at 0 degrees
        for (name, value) in [("meal", self.meal_degrees), ("minor", self.minor_degrees)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::InvalidAngle { name, value });
            }
        }
        if self.minor_base_minutes == 0 {
            return Err(ConfigError::InvalidDuration { name: "minor incline" });
        }
        if self.flat_base_minutes == 0 {
            return Err(ConfigError::InvalidDuration { name: "flat state" });
        }
        // Longest roll is base + jitter - 1
        check_minutes(
            "minor incline",
            u64::from(self.minor_base_minutes) + u64::from(self.minor_jitter_minutes),
        )?;
        check_minutes(
            "flat state",
            u64::from(self.flat_base_minutes) + u64::from(self.flat_jitter_minutes),
        )?;
        if !(0.0..=1.0).contains(&self.minor_probability) {
            return Err(ConfigError::InvalidProbability(self.minor_probability));
        }
        Ok(())
    }

    /// Whether any configured meal window covers `time`
    pub fn is_meal_time(&self, time: NaiveTime) -> bool {
        self.meal_windows.iter().any(|w| w.contains(time))
    }

    /// Whether any window runs past midnight (those minutes are never matched)
    pub fn has_windows_past_midnight(&self) -> bool {
        self.meal_windows
            .iter()
            .any(|w| w.end_minute() > MINUTES_PER_DAY)
    }
}

fn check_minutes(name: &'static str, minutes: u64) -> Result<(), ConfigError> {
    if minutes > u64::from(MINUTES_PER_DAY) {
        return Err(ConfigError::DurationTooLong {
            name,
            minutes,
            max: MINUTES_PER_DAY,
        });
    }
    Ok(())
}

/// Sampling bounds for the synthetic vital signs, each half-open
#[derive(Debug, Clone, PartialEq)]
pub struct VitalsRanges {
    pub heart_rate: (f64, f64),
    pub spo2: (f64, f64),
}

impl Default for VitalsRanges {
    fn default() -> Self {
        Self {
            heart_rate: (policy::HEART_RATE_MIN, policy::HEART_RATE_MAX),
            spo2: (policy::SPO2_MIN, policy::SPO2_MAX),
        }
    }
}

impl VitalsRanges {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, (min, max)) in [("heart rate", self.heart_rate), ("SpO2", self.spo2)] {
            // The span itself must be finite for uniform sampling
            if !(min < max && (max - min).is_finite()) {
                return Err(ConfigError::InvalidRange { name, min, max });
            }
        }
        Ok(())
    }
}
