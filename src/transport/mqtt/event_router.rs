//! Mapping from `rumqttc` events to engine events
//!
//! Pure functions: the session driver polls the event loop and feeds whatever
//! these return to the protocol engine.

use crate::engine::{TransportErrorKind, TransportEvent};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{ConnectionError, Event};
use rumqttc::Outgoing;
use tracing::trace;

/// Translate one event-loop event. Keep-alive traffic and outgoing
/// notifications have no engine counterpart and map to `None`.
pub fn route_event(event: &Event) -> Option<TransportEvent> {
    match event {
        Event::Incoming(packet) => match packet {
            Packet::ConnAck(_) => Some(TransportEvent::Connected),
            Packet::Disconnect(_) => Some(TransportEvent::Disconnected),
            Packet::SubAck(suback) => Some(TransportEvent::Subscribed {
                packet_id: suback.pkid,
            }),
            Packet::UnsubAck(unsuback) => Some(TransportEvent::Unsubscribed {
                packet_id: unsuback.pkid,
            }),
            Packet::PubAck(puback) => Some(TransportEvent::Published {
                packet_id: puback.pkid,
            }),
            Packet::PubComp(pubcomp) => Some(TransportEvent::Published {
                packet_id: pubcomp.pkid,
            }),
            Packet::Publish(publish) => Some(TransportEvent::DataReceived {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
            }),
            other => {
                trace!(packet = ?other, "Unrouted incoming packet");
                None
            }
        },
        Event::Outgoing(_) => None,
    }
}

/// True once our own DISCONNECT has been written to the socket
pub fn is_outgoing_disconnect(event: &Event) -> bool {
    matches!(event, Event::Outgoing(Outgoing::Disconnect))
}

/// Classify an event-loop failure for logging
pub fn classify_error(error: &ConnectionError) -> TransportEvent {
    let kind = match error {
        ConnectionError::Io(_) | ConnectionError::Timeout(_) => TransportErrorKind::TcpTransport,
        ConnectionError::ConnectionRefused(_) => TransportErrorKind::ConnectionRefused,
        _ => TransportErrorKind::Other,
    };

    TransportEvent::Error {
        kind,
        detail: error.to_string(),
    }
}
