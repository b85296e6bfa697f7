//! One simulated patient bed

use bedsim_shared::{
    clock::{CalendarClock, MonotonicClock},
    random::RandomSource,
    state_machine::{InclinationStateMachine, InclinationTransition},
    vitals::VitalsGenerator,
    ConfigError, InclinationPolicy, TelemetryRecord, VitalsRanges,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Inclination change observed on a bed
#[derive(Debug, Clone, PartialEq)]
pub struct InclinationEvent {
    pub device_id: String,
    pub transition: InclinationTransition,
}

/// Vitals generator and inclination state for a single bed
///
/// Every bed owns its own random source and state; beds never share them.
pub struct BedSimulator {
    device_id: String,
    vitals: VitalsGenerator,
    machine: InclinationStateMachine,
    calendar: Arc<dyn CalendarClock>,
    monotonic: Arc<dyn MonotonicClock>,
    rng: Box<dyn RandomSource>,
    event_tx: Option<mpsc::UnboundedSender<InclinationEvent>>,
}

impl BedSimulator {
    /// Validate the configuration and start the bed flat
    pub fn new(
        device_id: impl Into<String>,
        policy: InclinationPolicy,
        ranges: VitalsRanges,
        calendar: Arc<dyn CalendarClock>,
        monotonic: Arc<dyn MonotonicClock>,
        mut rng: Box<dyn RandomSource>,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        ranges.validate()?;

        let machine = InclinationStateMachine::new(policy, monotonic.now(), rng.as_mut());

        Ok(Self {
            device_id: device_id.into(),
            vitals: VitalsGenerator::new(ranges),
            machine,
            calendar,
            monotonic,
            rng,
            event_tx: None,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state_machine(&self) -> &InclinationStateMachine {
        &self.machine
    }

    /// Receive inclination transitions from now on (replaces any earlier subscriber)
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<InclinationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.event_tx = Some(tx);
        rx
    }

    /// Produce the record for one tick: sample vitals, update inclination, snapshot
    pub fn tick(&mut self) -> TelemetryRecord {
        let vitals = self.vitals.sample(self.rng.as_mut());

        let wall = self.calendar.now();
        let now = self.monotonic.now();
        if let Some(transition) = self.machine.evaluate(wall.time(), now, self.rng.as_mut()) {
            self.notify(transition);
        }

        TelemetryRecord::new(self.device_id.as_str(), wall, vitals, self.machine.reading())
    }

    fn notify(&mut self, transition: InclinationTransition) {
        if let Some(tx) = &self.event_tx {
            let event = InclinationEvent {
                device_id: self.device_id.clone(),
                transition,
            };
            // Subscriber went away; stop reporting
            if tx.send(event).is_err() {
                self.event_tx = None;
            }
        }
    }
}
