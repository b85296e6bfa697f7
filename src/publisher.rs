//! Publish collaborator
//!
//! The simulator only needs to hand a payload to something that can deliver
//! it to a topic. Delivery, retries and reconnection belong to the
//! implementation; the simulator just reacts to success or failure.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes, qos: u32) -> Result<()>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Published {
        pub topic: String,
        pub payload: Bytes,
        pub qos: u32,
    }

    /// Keeps everything it is given; optionally fails every n-th call
    #[derive(Default)]
    pub struct RecordingPublisher {
        published: Mutex<Vec<Published>>,
        calls: AtomicUsize,
        fail_every: Option<usize>,
    }

    impl RecordingPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_every(n: usize) -> Self {
            Self {
                fail_every: Some(n),
                ..Self::default()
            }
        }

        pub fn published(&self) -> Vec<Published> {
            self.published.lock().unwrap().clone()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, topic: &str, payload: Bytes, qos: u32) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if matches!(self.fail_every, Some(n) if call % n == 0) {
                return Err(anyhow!("simulated publish failure on call {}", call));
            }
            self.published.lock().unwrap().push(Published {
                topic: topic.to_string(),
                payload,
                qos,
            });
            Ok(())
        }
    }
}
