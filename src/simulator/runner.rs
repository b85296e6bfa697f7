//! Fixed-interval tick loop

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, warn};

use super::BedSimulator;
use crate::publisher::Publisher;

/// Where and how often a bed publishes
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub topic: String,
    pub qos: u32,
    pub interval: Duration,
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub published: u64,
    pub failed: u64,
}

/// Tick until `shutdown` turns true (or its sender is dropped)
///
/// The signal is only checked between ticks, so a tick that has started is
/// always published before the loop returns. Publish failures are logged and
/// the loop carries on with the next tick.
pub async fn run_simulator<P>(
    sim: &mut BedSimulator,
    publisher: &P,
    config: &RunConfig,
    mut shutdown: watch::Receiver<bool>,
) -> RunStats
where
    P: Publisher + ?Sized,
{
    let mut stats = RunStats::default();
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let record = sim.tick();
        stats.ticks += 1;

        let payload = match record.to_json_bytes() {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                error!("[BED {}] Failed to serialize telemetry: {}", sim.device_id(), e);
                stats.failed += 1;
                continue;
            }
        };

        match publisher.publish(&config.topic, payload, config.qos).await {
            Ok(()) => {
                stats.published += 1;
                debug!(
                    "[BED {}] Published: hr={:.1} spo2={:.1} incl={} state={}",
                    record.device_id,
                    record.heart_rate,
                    record.spo2,
                    record.inclination_degrees,
                    record.bed_state
                );
            }
            Err(e) => {
                stats.failed += 1;
                warn!("[BED {}] Error publishing: {:#}", record.device_id, e);
            }
        }
    }

    stats
}
