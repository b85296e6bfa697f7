//! Simulator Module
//!
//! Drives simulated beds: one tick samples vitals, updates the inclination
//! state and hands the resulting record to the publisher.

mod bed;
mod runner;

pub use bed::{BedSimulator, InclinationEvent};
pub use runner::{run_simulator, RunConfig, RunStats};
