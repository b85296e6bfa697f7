//! Bed Inclination State Machine
//!
//! Decides every tick whether the bed is flat or inclined. Two layers apply in
//! strict precedence:
//!
//! 1. Meal override: inside a meal window the bed is forced to the meal angle.
//!    Leaving the window forces it flat and starts a fresh flat period.
//! 2. Non-meal cycle: once the current state has been held for its rolled
//!    duration, a flat bed either starts a minor incline (with the configured
//!    probability) or starts a new flat period; a minor incline returns flat.
//!
//! Every expiry of the non-meal cycle rolls a new duration and restarts the
//! elapsed-time reference, including when the bed stays flat.
//!
//! The machine does not log. [`InclinationStateMachine::evaluate`] returns the
//! transition it applied so callers can report it.

use chrono::NaiveTime;
use std::time::{Duration, Instant};

use crate::config::InclinationPolicy;
use crate::random::RandomSource;
use crate::record::BedState;

/// Full mutable state of one bed
#[derive(Debug, Clone, PartialEq)]
pub struct InclinationState {
    pub mode: BedState,
    pub degrees: f64,
    /// Set while a meal window forces the incline
    pub meal_override_active: bool,
    /// Monotonic reference of the last non-meal state change
    pub state_changed_at: Instant,
    /// Dwell time rolled when the current non-meal state was entered
    pub state_duration_secs: u64,
}

impl InclinationState {
    /// Point at which the current non-meal state may change
    pub fn state_deadline(&self) -> Instant {
        self.state_changed_at + Duration::from_secs(self.state_duration_secs)
    }
}

/// The part of the state that goes into a telemetry record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InclinationReading {
    pub bed_state: BedState,
    pub degrees: f64,
}

/// Transition applied by one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum InclinationTransition {
    /// First tick inside a meal window
    MealStarted { degrees: f64 },
    /// First tick after a meal window; the bed is flat for `duration_secs`
    MealEnded { duration_secs: u64 },
    /// Flat period expired and a minor incline began
    MinorInclineStarted { degrees: f64, duration_secs: u64 },
    /// Minor incline expired and the bed returned flat
    MinorInclineEnded { duration_secs: u64 },
    /// Flat period expired and a new one began without moving the bed
    FlatRenewed { duration_secs: u64 },
}

impl InclinationTransition {
    /// Whether the bed angle changed
    pub fn moves_bed(&self) -> bool {
        !matches!(self, InclinationTransition::FlatRenewed { .. })
    }
}

/// Timed, probabilistic inclination state machine for one bed
#[derive(Debug, Clone)]
pub struct InclinationStateMachine {
    policy: InclinationPolicy,
    state: InclinationState,
}

impl InclinationStateMachine {
    /// Start flat with a freshly rolled flat duration
    pub fn new(policy: InclinationPolicy, now: Instant, rng: &mut dyn RandomSource) -> Self {
        let state_duration_secs = roll_minutes(policy.flat_base_minutes, policy.flat_jitter_minutes, rng);

        Self {
            policy,
            state: InclinationState {
                mode: BedState::Flat,
                degrees: 0.0,
                meal_override_active: false,
                state_changed_at: now,
                state_duration_secs,
            },
        }
    }

    pub fn state(&self) -> &InclinationState {
        &self.state
    }

    pub fn reading(&self) -> InclinationReading {
        InclinationReading {
            bed_state: self.state.mode,
            degrees: self.state.degrees,
        }
    }

    /// Evaluate one tick
    ///
    /// `local_time` is only used for meal-window membership, `now` only for
    /// elapsed time in the current non-meal state.
    pub fn evaluate(
        &mut self,
        local_time: NaiveTime,
        now: Instant,
        rng: &mut dyn RandomSource,
    ) -> Option<InclinationTransition> {
        if self.policy.is_meal_time(local_time) {
            return self.hold_meal_incline();
        }

        if self.state.meal_override_active {
            let duration_secs = self.enter_flat(now, rng);
            self.state.meal_override_active = false;
            return Some(InclinationTransition::MealEnded { duration_secs });
        }

        let elapsed = now.saturating_duration_since(self.state.state_changed_at);
        if elapsed.as_secs() < self.state.state_duration_secs {
            return None;
        }

        let transition = match self.state.mode {
            BedState::Flat => {
                if rng.next_unit() < self.policy.minor_probability {
                    let duration_secs = self.enter_minor_incline(now, rng);
                    InclinationTransition::MinorInclineStarted {
                        degrees: self.state.degrees,
                        duration_secs,
                    }
                } else {
                    InclinationTransition::FlatRenewed {
                        duration_secs: self.enter_flat(now, rng),
                    }
                }
            }
            BedState::Inclined => InclinationTransition::MinorInclineEnded {
                duration_secs: self.enter_flat(now, rng),
            },
        };

        Some(transition)
    }

    fn hold_meal_incline(&mut self) -> Option<InclinationTransition> {
        let rising_edge = !self.state.meal_override_active;

        self.state.mode = BedState::Inclined;
        self.state.degrees = self.policy.meal_degrees;
        self.state.meal_override_active = true;

        rising_edge.then(|| InclinationTransition::MealStarted {
            degrees: self.policy.meal_degrees,
        })
    }

    fn enter_flat(&mut self, now: Instant, rng: &mut dyn RandomSource) -> u64 {
        let secs = roll_minutes(self.policy.flat_base_minutes, self.policy.flat_jitter_minutes, rng);
        self.set_non_meal(BedState::Flat, 0.0, now, secs);
        secs
    }

    fn enter_minor_incline(&mut self, now: Instant, rng: &mut dyn RandomSource) -> u64 {
        let secs = roll_minutes(self.policy.minor_base_minutes, self.policy.minor_jitter_minutes, rng);
        self.set_non_meal(BedState::Inclined, self.policy.minor_degrees, now, secs);
        secs
    }

    fn set_non_meal(&mut self, mode: BedState, degrees: f64, now: Instant, duration_secs: u64) {
        self.state.mode = mode;
        self.state.degrees = degrees;
        self.state.state_changed_at = now;
        self.state.state_duration_secs = duration_secs;
    }
}

/// `(base + uniform[0, jitter)) * 60` seconds; zero jitter means no jitter
fn roll_minutes(base: u32, jitter: u32, rng: &mut dyn RandomSource) -> u64 {
    let extra = if jitter == 0 { 0 } else { rng.next_below(jitter) };
    (u64::from(base) + u64::from(extra)) * 60
}
