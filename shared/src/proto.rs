//! Wire messages exchanged with the broker

use bytes::Bytes;
use prost::Message;

/// Top-level frame carried by the codec
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub client_id: String,

    #[prost(uint64, tag = "2")]
    pub sequence_id: u64,

    #[prost(uint64, tag = "3")]
    pub timestamp_ms: u64,

    #[prost(oneof = "envelope::Payload", tags = "4, 5, 6")]
    pub payload: Option<envelope::Payload>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "4")]
        Publish(super::Publish),

        #[prost(message, tag = "5")]
        KeepAlive(super::KeepAlive),

        #[prost(message, tag = "6")]
        PublishAck(super::PublishAck),
    }
}

/// A message published to a topic
#[derive(Clone, PartialEq, Message)]
pub struct Publish {
    #[prost(string, tag = "1")]
    pub topic: String,

    #[prost(bytes = "bytes", tag = "2")]
    pub payload: Bytes,

    #[prost(uint32, tag = "3")]
    pub qos: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct KeepAlive {
    #[prost(uint64, tag = "1")]
    pub uptime_ms: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PublishAck {
    #[prost(uint64, tag = "1")]
    pub ack_sequence_id: u64,
}
