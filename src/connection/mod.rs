//! Broker connection management
//!
//! This module handles:
//! - A persistent connection with automatic reconnection and backoff
//! - Keep-alive frames while connected
//! - Publishing envelopes on behalf of the simulator

mod manager;

pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionEventReceiver, ConnectionManager};
