mod config;
mod connection;
mod publisher;
mod simulator;
mod transport;

use anyhow::{bail, Context, Result};
use bedsim_shared::{
    clock::{SystemCalendar, SystemMonotonic},
    envelope,
    random::{RandomSource, SeededSource},
    state_machine::InclinationTransition,
};
use config::SimulatorSettings;
use connection::{ConnectionEvent, ConnectionEventReceiver, ConnectionManager};
use simulator::{run_simulator, BedSimulator, InclinationEvent};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use transport::{TcpConnector, TransportConnector};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let instances: Vec<String> = std::env::args().skip(1).collect();
    if instances.is_empty() {
        bail!("Usage: bed-simulator <device_instance_number>... (e.g. 1 or 1 2)");
    }

    let settings = SimulatorSettings::from_env().context("Invalid simulator configuration")?;
    settings
        .validate()
        .context("Invalid simulator configuration")?;
    if settings.policy.has_windows_past_midnight() {
        warn!("Meal windows past midnight are cut off at 00:00");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), shutdown_tx));

    let beds = instances
        .iter()
        .enumerate()
        .map(|(index, instance)| run_bed(&settings, instance, settings.seed_for(index), shutdown_rx.clone()));

    for result in futures::future::join_all(beds).await {
        result?;
    }

    Ok(())
}

/// Signal shutdown once `signal` fires
///
/// If the signal handler cannot be installed the beds keep running until the
/// process is terminated; the sender is parked so receivers never see it dropped.
async fn forward_shutdown<F>(signal: F, shutdown_tx: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Shutdown requested, finishing current tick");
            let _ = shutdown_tx.send(true);
        }
        Err(e) => {
            error!("Failed to listen for Ctrl-C, running until terminated: {}", e);
            shutdown_tx.closed().await;
        }
    }
}

/// Run one bed with its own connection, state and random source until shutdown
async fn run_bed(
    settings: &SimulatorSettings,
    instance: &str,
    seed: Option<u64>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let client_id = settings.client_id(instance);
    let run_config = settings.run_config(instance);
    let connector = TcpConnector::new(settings.broker_address.as_str());

    info!("Starting Patient Bed Simulator: {}", client_id);
    info!("  Publishing to topic: {}", run_config.topic);
    info!("  Broker ({}): {}", connector.name(), connector.address());

    let rng: Box<dyn RandomSource> = match seed {
        Some(seed) => Box::new(SeededSource::from_seed(seed)),
        None => Box::new(SeededSource::from_entropy()),
    };
    let mut bed = BedSimulator::new(
        client_id.as_str(),
        settings.policy.clone(),
        settings.vitals.clone(),
        Arc::new(SystemCalendar),
        Arc::new(SystemMonotonic),
        rng,
    )
    .with_context(|| format!("Failed to initialize bed {}", client_id))?;
    info!(
        "  Initial FLAT period: {} min",
        bed.state_machine().state().state_duration_secs / 60
    );

    let (conn, conn_events) = ConnectionManager::new(settings.connection_config(&client_id), connector);
    let conn_task = tokio::spawn(handle_connection_events(client_id.clone(), conn_events));
    let bed_task = tokio::spawn(handle_inclination_events(bed.subscribe()));

    let stats = run_simulator(&mut bed, &conn, &run_config, shutdown).await;
    info!(
        "[{}] Stopped after {} ticks ({} published, {} failed)",
        client_id, stats.ticks, stats.published, stats.failed
    );

    drop(bed);
    info!("[{}] Disconnecting...", conn.client_id());
    drop(conn);

    let _ = bed_task.await;
    let _ = conn_task.await;
    info!("[{}] Disconnected.", client_id);

    Ok(())
}

/// Log inclination transitions reported by a bed
async fn handle_inclination_events(mut events: mpsc::UnboundedReceiver<InclinationEvent>) {
    while let Some(InclinationEvent { device_id, transition }) = events.recv().await {
        if !transition.moves_bed() {
            debug!("[BED {}] Staying FLAT: {:?}", device_id, transition);
            continue;
        }

        match transition {
            InclinationTransition::MealStarted { degrees } => {
                info!("[BED {}] INCLINED for meal to {} degrees", device_id, degrees);
            }
            InclinationTransition::MealEnded { duration_secs } => {
                info!(
                    "[BED {}] Set to FLAT after meal (next change in {} min)",
                    device_id,
                    duration_secs / 60
                );
            }
            InclinationTransition::MinorInclineStarted { degrees, duration_secs } => {
                info!(
                    "[BED {}] INCLINED (minor) to {} degrees for {} min",
                    device_id,
                    degrees,
                    duration_secs / 60
                );
            }
            InclinationTransition::MinorInclineEnded { .. } => {
                info!("[BED {}] Set to FLAT after minor incline", device_id);
            }
            InclinationTransition::FlatRenewed { .. } => {}
        }
    }
}

/// Log events from a bed's broker connection
async fn handle_connection_events(client_id: String, mut events: ConnectionEventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Connected { transport } => {
                info!("[{}] Connection success via {}", client_id, transport);
            }
            ConnectionEvent::Disconnected { reason } => {
                warn!("[{}] Connection lost: {}", client_id, reason);
            }
            ConnectionEvent::ConnectionFailed { reason } => {
                error!("[{}] Error connecting: {}", client_id, reason);
            }
            ConnectionEvent::Received(frame) => match &frame.payload {
                Some(envelope::Payload::PublishAck(ack)) => {
                    debug!("[{}] Broker ACK: for_seq={}", client_id, ack.ack_sequence_id);
                }
                _ => {
                    debug!("[{}] Unhandled frame seq={}", client_id, frame.sequence_id);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_requests_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        forward_shutdown(async { Ok(()) }, tx).await;
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_failed_signal_handler_keeps_beds_running() {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(forward_shutdown(
            async { Err(io::Error::new(io::ErrorKind::Other, "no signal support")) },
            tx,
        ));

        // Neither a shutdown value nor a dropped sender reaches the beds
        let changed = tokio::time::timeout(Duration::from_millis(50), rx.changed()).await;
        assert!(changed.is_err());
        assert!(!*rx.borrow());

        drop(rx);
        task.await.unwrap();
    }
}
