use bedsim_shared::random::{RandomSource, SeededSource};
use bedsim_shared::state_machine::{InclinationStateMachine, InclinationTransition};
use bedsim_shared::vitals::VitalsGenerator;
use bedsim_shared::{BedState, InclinationPolicy, MealWindow};
use chrono::NaiveTime;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Replays scripted draws so each branch can be forced
struct Script {
    units: VecDeque<f64>,
    jitters: VecDeque<u32>,
}

impl Script {
    fn new(units: &[f64], jitters: &[u32]) -> Self {
        Self {
            units: units.iter().copied().collect(),
            jitters: jitters.iter().copied().collect(),
        }
    }
}

impl RandomSource for Script {
    fn next_unit(&mut self) -> f64 {
        self.units.pop_front().expect("script ran out of unit draws")
    }

    fn next_below(&mut self, bound: u32) -> u32 {
        let v = self.jitters.pop_front().unwrap_or(0);
        assert!(v < bound, "scripted jitter {} out of bound {}", v, bound);
        v
    }
}

fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn mins(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

#[test]
fn test_meal_window_forces_incline_regardless_of_prior_state() {
    let start = Instant::now();
    let mut rng = Script::new(&[0.05], &[0, 2]);
    let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);

    // Get into a minor incline first
    fsm.evaluate(at(7, 0), start + mins(45), &mut rng);
    assert_eq!(fsm.reading().degrees, 30.0);

    // 08:15 with a timer that has not expired and prior state INCLINED/30
    let t = fsm.evaluate(at(8, 15), start + mins(46), &mut rng);
    assert_eq!(t, Some(InclinationTransition::MealStarted { degrees: 60.0 }));
    assert_eq!(fsm.reading().bed_state, BedState::Inclined);
    assert_eq!(fsm.reading().degrees, 60.0);
    assert!(fsm.state().meal_override_active);
}

#[test]
fn test_every_tick_in_meal_window_is_inclined_at_meal_angle() {
    let start = Instant::now();
    let mut rng = SeededSource::from_seed(99);
    let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);

    // Expired timers must not leak through during the window
    for minute in 0..30u32 {
        let now = start + mins(1000 + minute as u64);
        fsm.evaluate(at(18, minute), now, &mut rng);
        assert_eq!(fsm.reading().bed_state, BedState::Inclined);
        assert_eq!(fsm.reading().degrees, 60.0);
    }
}

#[test]
fn test_falling_edge_goes_flat_with_fresh_duration() {
    let start = Instant::now();
    let mut rng = Script::new(&[], &[0, 7]);
    let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);

    fsm.evaluate(at(8, 29), start + mins(5), &mut rng);
    assert!(fsm.state().meal_override_active);

    let leave = start + mins(6);
    let t = fsm.evaluate(at(8, 31), leave, &mut rng);

    assert_eq!(t, Some(InclinationTransition::MealEnded { duration_secs: 52 * 60 }));
    assert_eq!(fsm.reading().bed_state, BedState::Flat);
    assert_eq!(fsm.reading().degrees, 0.0);
    assert!(!fsm.state().meal_override_active);
    assert_eq!(fsm.state().state_changed_at, leave);
    assert_eq!(fsm.state().state_duration_secs, 52 * 60);
}

#[test]
fn test_flat_expiry_low_draw_starts_minor_incline() {
    let start = Instant::now();
    let mut rng = Script::new(&[0.05], &[3, 4]);
    let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);
    let rolled = fsm.state().state_duration_secs;
    assert_eq!(rolled, 48 * 60);

    let expiry = start + Duration::from_secs(rolled);
    let t = fsm.evaluate(at(14, 0), expiry, &mut rng);

    assert_eq!(
        t,
        Some(InclinationTransition::MinorInclineStarted {
            degrees: 30.0,
            duration_secs: 14 * 60
        })
    );
    assert_eq!(fsm.reading().bed_state, BedState::Inclined);
    assert_eq!(fsm.reading().degrees, 30.0);
    assert_eq!(fsm.state().state_changed_at, expiry);
}

#[test]
fn test_flat_expiry_high_draw_renews_flat_period() {
    let start = Instant::now();
    let mut rng = Script::new(&[0.50], &[3, 9]);
    let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);
    let rolled = fsm.state().state_duration_secs;

    let expiry = start + Duration::from_secs(rolled);
    let t = fsm.evaluate(at(14, 0), expiry, &mut rng);

    assert_eq!(t, Some(InclinationTransition::FlatRenewed { duration_secs: 54 * 60 }));
    assert_eq!(fsm.reading().bed_state, BedState::Flat);
    assert_eq!(fsm.reading().degrees, 0.0);
    // Renewal, not a no-op: new reference and new duration
    assert_eq!(fsm.state().state_changed_at, expiry);
    assert_eq!(fsm.state().state_duration_secs, 54 * 60);

    // The old deadline has passed but the renewed period is still running
    assert_eq!(fsm.evaluate(at(14, 5), expiry + mins(5), &mut rng), None);
}

#[test]
fn test_probability_threshold_is_exclusive() {
    let start = Instant::now();
    let mut rng = Script::new(&[0.20], &[]);
    let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);

    let t = fsm.evaluate(at(14, 0), start + mins(45), &mut rng);
    assert!(matches!(t, Some(InclinationTransition::FlatRenewed { .. })));
}

#[test]
fn test_hold_is_idempotent_until_expiry() {
    let start = Instant::now();
    let mut rng = Script::new(&[0.05], &[0, 0]);
    let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);

    let enter = start + mins(45);
    fsm.evaluate(at(14, 0), enter, &mut rng);
    let held = fsm.state().clone();

    for s in (0..600).step_by(5) {
        let t = fsm.evaluate(at(14, 1), enter + Duration::from_secs(s), &mut rng);
        assert_eq!(t, None);
        assert_eq!(fsm.state(), &held);
    }
}

#[test]
fn test_every_expiry_resets_reference() {
    let start = Instant::now();
    let mut rng = SeededSource::from_seed(2024);
    let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);

    let mut now = start;
    for _ in 0..200 {
        now = fsm.state().state_deadline();
        let t = fsm.evaluate(at(15, 0), now, &mut rng);
        assert!(t.is_some());
        assert_eq!(fsm.state().state_changed_at, now);
    }
    assert!(now > start);
}

#[test]
fn test_degrees_and_bed_state_always_agree() {
    let policy = InclinationPolicy {
        meal_windows: vec![MealWindow::at(0, 30, 30).unwrap(), MealWindow::at(3, 0, 30).unwrap()],
        minor_base_minutes: 1,
        minor_jitter_minutes: 2,
        flat_base_minutes: 1,
        flat_jitter_minutes: 2,
        minor_probability: 0.5,
        ..Default::default()
    };
    let start = Instant::now();
    let mut rng = SeededSource::from_seed(5);
    let mut fsm = InclinationStateMachine::new(policy, start, &mut rng);
    let vitals = VitalsGenerator::default();

    // Six hours of 5-second ticks
    for tick in 0..(6 * 3600 / 5) {
        let secs = tick * 5;
        let local = NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, 0).unwrap();
        fsm.evaluate(local, start + Duration::from_secs(secs), &mut rng);

        let reading = fsm.reading();
        assert_eq!(reading.degrees == 0.0, reading.bed_state == BedState::Flat);
        assert!([0.0, 30.0, 60.0].contains(&reading.degrees));

        let v = vitals.sample(&mut rng);
        assert!((55.0..85.0).contains(&v.heart_rate));
        assert!((95.0..99.5).contains(&v.spo2));
    }
}

#[test]
fn test_same_seed_same_trajectory() {
    let run = |seed| {
        let start = Instant::now();
        let mut rng = SeededSource::from_seed(seed);
        let mut fsm = InclinationStateMachine::new(InclinationPolicy::default(), start, &mut rng);
        (0..2000u64)
            .filter_map(|i| fsm.evaluate(at(20, 0), start + mins(i), &mut rng))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(17), run(17));
}
