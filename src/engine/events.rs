//! Transport events consumed by the protocol engine

use bytes::Bytes;
use std::fmt;

/// Events delivered by the transport, one at a time, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Session established (ConnAck received)
    Connected,
    /// Session lost or closed
    Disconnected,
    /// Transport is about to retry the connection
    Reconnecting { attempt: u32 },
    /// Subscription acknowledged
    Subscribed { packet_id: u16 },
    /// Unsubscription acknowledged
    Unsubscribed { packet_id: u16 },
    /// Outbound publish acknowledged
    Published { packet_id: u16 },
    /// Inbound application message. Buffers are only borrowed for one dispatch.
    DataReceived { topic: Bytes, payload: Bytes },
    /// Transport-level failure. Remediation belongs to the transport.
    Error {
        kind: TransportErrorKind,
        detail: String,
    },
}

impl TransportEvent {
    /// Convenience constructor for inbound messages
    pub fn data(topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        TransportEvent::DataReceived {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Coarse classification of transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Socket, TLS or timeout failure underneath MQTT
    TcpTransport,
    /// Broker rejected the CONNECT
    ConnectionRefused,
    /// Anything else (protocol state, client shutdown)
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::TcpTransport => "tcp_transport",
            TransportErrorKind::ConnectionRefused => "connection_refused",
            TransportErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}
