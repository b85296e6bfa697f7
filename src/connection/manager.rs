//! Connection manager with a persistent broker link and automatic reconnection

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bedsim_shared::{
    codec::{self, FrameDecoder},
    Envelope,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tracing::debug;

use crate::publisher::Publisher;
use crate::transport::{TransportConnector, TransportStream};

/// Events emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connected to the broker
    Connected { transport: &'static str },
    /// Lost an established connection; a reconnect follows
    Disconnected { reason: String },
    /// A connection attempt failed; a reconnect follows after backoff
    ConnectionFailed { reason: String },
    /// Envelope received from the broker
    Received(Envelope),
}

pub type ConnectionEventReceiver = mpsc::Receiver<ConnectionEvent>;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// Interval between keep-alive frames
    pub keep_alive_interval: Duration,
    /// Longest a publish may wait to be queued for sending
    pub publish_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_id: "PatientBed1".into(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            keep_alive_interval: Duration::from_secs(60),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

/// Owns the outbound side of a broker connection
///
/// Dropping the manager closes the connection after queued envelopes are written.
pub struct ConnectionManager {
    config: ConnectionConfig,
    sequence_id: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    outbound_tx: mpsc::Sender<Envelope>,
}

impl ConnectionManager {
    /// Create a connection manager and start the connection loop
    pub fn new<C>(config: ConnectionConfig, connector: C) -> (Self, ConnectionEventReceiver)
    where
        C: TransportConnector + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Envelope>(100);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(100);
        let sequence_id = Arc::new(AtomicU64::new(0));
        let connected = Arc::new(AtomicBool::new(false));

        let link = Link {
            config: config.clone(),
            sequence_id: sequence_id.clone(),
            connected: connected.clone(),
            event_tx,
        };
        tokio::spawn(async move {
            connection_loop(connector, link, outbound_rx).await;
        });

        let manager = Self {
            config,
            sequence_id,
            connected,
            outbound_tx,
        };
        (manager, event_rx)
    }

    /// Get the next sequence ID
    pub fn next_sequence_id(&self) -> u64 {
        self.sequence_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Queue an envelope for the broker
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        match timeout(self.config.publish_timeout, self.outbound_tx.send(envelope)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(anyhow!("Connection closed")),
            Err(_) => Err(anyhow!(
                "Publish timed out after {:?}",
                self.config.publish_timeout
            )),
        }
    }
}

#[async_trait]
impl Publisher for ConnectionManager {
    async fn publish(&self, topic: &str, payload: Bytes, qos: u32) -> Result<()> {
        if !self.is_connected() {
            return Err(anyhow!("Client {} not connected", self.config.client_id));
        }

        let envelope = Envelope::publish(
            self.config.client_id.as_str(),
            self.next_sequence_id(),
            topic,
            payload,
            qos,
        );
        self.send(envelope).await
    }
}

/// State shared between the manager and its connection task
struct Link {
    config: ConnectionConfig,
    sequence_id: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    event_tx: mpsc::Sender<ConnectionEvent>,
}

impl Link {
    async fn emit(&self, event: ConnectionEvent) {
        let _ = self.event_tx.send(event).await;
    }

    fn next_sequence_id(&self) -> u64 {
        self.sequence_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// How an established session ended without error
enum SessionEnd {
    /// The manager was dropped
    Closed,
}

/// Main connection loop with reconnection logic
async fn connection_loop<C: TransportConnector>(
    connector: C,
    link: Link,
    mut outbound_rx: mpsc::Receiver<Envelope>,
) {
    let config = &link.config;
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        match timeout(config.connect_timeout, connector.connect()).await {
            Ok(Ok(stream)) => {
                reconnect_delay = config.reconnect_delay;
                link.connected.store(true, Ordering::SeqCst);
                link.emit(ConnectionEvent::Connected {
                    transport: connector.name(),
                })
                .await;

                let result = handle_connection(stream, &link, &mut outbound_rx).await;
                link.connected.store(false, Ordering::SeqCst);

                match result {
                    Ok(SessionEnd::Closed) => {
                        debug!("[{}] Connection closed", config.client_id);
                        return;
                    }
                    Err(reason) => {
                        link.emit(ConnectionEvent::Disconnected {
                            reason: reason.to_string(),
                        })
                        .await;
                    }
                }
            }
            Ok(Err(e)) => {
                link.emit(ConnectionEvent::ConnectionFailed {
                    reason: format!("{} connect failed: {:#}", connector.name(), e),
                })
                .await;
            }
            Err(_) => {
                link.emit(ConnectionEvent::ConnectionFailed {
                    reason: format!(
                        "{} connect timed out after {:?}",
                        connector.name(),
                        config.connect_timeout
                    ),
                })
                .await;
            }
        }

        // Back off, but stop as soon as the manager is dropped
        let backoff = tokio::time::sleep(reconnect_delay);
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => break,
                msg = outbound_rx.recv() => match msg {
                    Some(envelope) => {
                        debug!("[{}] Dropping seq={} while disconnected", config.client_id, envelope.sequence_id);
                    }
                    None => return,
                },
            }
        }

        // Exponential backoff
        reconnect_delay = std::cmp::min(reconnect_delay.saturating_mul(2), config.max_reconnect_delay);
    }
}

/// Serve one established connection until it fails or the manager is dropped
async fn handle_connection<S: TransportStream>(
    mut stream: S,
    link: &Link,
    outbound_rx: &mut mpsc::Receiver<Envelope>,
) -> Result<SessionEnd> {
    let config = &link.config;
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    let start_time = Instant::now();
    let first_keep_alive = start_time
        .checked_add(config.keep_alive_interval)
        .ok_or_else(|| anyhow!("Keep-alive interval out of range: {:?}", config.keep_alive_interval))?;
    let mut keep_alive = interval_at(first_keep_alive, config.keep_alive_interval);

    loop {
        tokio::select! {
            _ = keep_alive.tick() => {
                let uptime_ms = start_time.elapsed().as_millis() as u64;
                let envelope = Envelope::keep_alive(config.client_id.as_str(), link.next_sequence_id(), uptime_ms);
                stream.write_all(&codec::encode(&envelope)?).await?;
            }

            msg = outbound_rx.recv() => match msg {
                Some(envelope) => {
                    stream.write_all(&codec::encode(&envelope)?).await?;
                }
                None => {
                    TransportStream::shutdown(&mut stream).await?;
                    return Ok(SessionEnd::Closed);
                }
            },

            result = stream.read(&mut read_buf) => match result {
                Ok(0) => return Err(anyhow!("Broker closed connection")),
                Ok(n) => {
                    decoder.extend(&read_buf[..n]);
                    while let Some(envelope) = decoder.decode_next()? {
                        link.emit(ConnectionEvent::Received(envelope)).await;
                    }
                }
                Err(e) => return Err(anyhow!("Read error: {}", e)),
            },
        }
    }
}
