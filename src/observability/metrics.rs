//! Engine metrics
//!
//! Atomic counters owned by one protocol engine. Cheap enough to bump on every
//! event; a serializable snapshot can be logged or published as telemetry.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters for one engine instance
#[derive(Debug, Default)]
pub struct EngineMetrics {
    connected: AtomicBool,
    connections_established: AtomicU64,
    disconnections: AtomicU64,
    transport_errors: AtomicU64,

    messages_received: AtomicU64,
    messages_dispatched: AtomicU64,
    messages_dropped: AtomicU64,

    commands_executed: AtomicU64,
    command_failures: AtomicU64,
    desired_updates: AtomicU64,

    messages_published: AtomicU64,
    telemetry_sent: AtomicU64,
    publish_failures: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // Connection metrics
    pub fn connection_established(&self) {
        self.connected.store(true, Ordering::Relaxed);
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_lost(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    // Inbound metrics
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dispatched(&self) {
        self.messages_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_executed(&self) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_failed(&self) {
        self.command_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn desired_update(&self) {
        self.desired_updates.fetch_add(1, Ordering::Relaxed);
    }

    // Outbound metrics
    pub fn message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn telemetry_sent(&self) {
        self.telemetry_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            connections_established: self.connections_established.load(Ordering::Relaxed),
            disconnections: self.disconnections.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
            desired_updates: self.desired_updates.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            telemetry_sent: self.telemetry_sent.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of [`EngineMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connected: bool,
    pub connections_established: u64,
    pub disconnections: u64,
    pub transport_errors: u64,
    pub messages_received: u64,
    pub messages_dispatched: u64,
    pub messages_dropped: u64,
    pub commands_executed: u64,
    pub command_failures: u64,
    pub desired_updates: u64,
    pub messages_published: u64,
    pub telemetry_sent: u64,
    pub publish_failures: u64,
}
