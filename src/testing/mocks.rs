//! Mock transport for testing
//!
//! Records every publish and subscribe instead of talking to a broker. Clones
//! share their recordings, so a test can hand one clone to the engine and keep
//! another to inspect what was sent.

use crate::transport::Transport;
use rumqttc::v5::mqttbytes::QoS;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// One recorded publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishedMessage {
    /// Payload as text, lossily decoded
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum MockTransportError {
    #[error("mock publish to {0} failed")]
    PublishFailed(String),

    #[error("mock subscribe to {0} failed")]
    SubscribeFailed(String),
}

#[derive(Debug, Default)]
struct Recorder {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
    subscribe_attempts: AtomicUsize,
    fail_publishes: AtomicBool,
    fail_subscribes: AtomicBool,
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock transport for testing
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    recorder: Arc<Recorder>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose publishes all fail
    pub fn with_failure() -> Self {
        let transport = Self::new();
        transport.fail_publishes(true);
        transport
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.recorder.fail_publishes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribes(&self, fail: bool) {
        self.recorder.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.recorder.published).clone()
    }

    /// Recorded publishes whose topic starts with `prefix`
    pub fn published_under(&self, prefix: &str) -> Vec<PublishedMessage> {
        lock(&self.recorder.published)
            .iter()
            .filter(|message| message.topic.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Accepted subscriptions, in call order
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.recorder.subscriptions).clone()
    }

    /// Subscribe calls including rejected ones
    pub fn subscribe_attempts(&self) -> usize {
        self.recorder.subscribe_attempts.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.recorder.stopped.load(Ordering::SeqCst)
    }

    /// Forget everything recorded so far. Failure flags are kept.
    pub fn clear(&self) {
        lock(&self.recorder.published).clear();
        lock(&self.recorder.subscriptions).clear();
        self.recorder.subscribe_attempts.store(0, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    type Error = MockTransportError;

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), Self::Error> {
        if self.recorder.fail_publishes.load(Ordering::SeqCst) {
            return Err(MockTransportError::PublishFailed(topic.to_string()));
        }

        lock(&self.recorder.published).push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    fn subscribe(&self, topic_filter: &str, _qos: QoS) -> Result<(), Self::Error> {
        self.recorder.subscribe_attempts.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_subscribes.load(Ordering::SeqCst) {
            return Err(MockTransportError::SubscribeFailed(topic_filter.to_string()));
        }

        lock(&self.recorder.subscriptions).push(topic_filter.to_string());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.recorder.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_recordings() {
        let transport = MockTransport::new();
        let observer = transport.clone();

        transport
            .publish("device/dev1/telemetry/temp", b"21", QoS::AtLeastOnce, false)
            .unwrap();

        let published = observer.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload_str(), "21");
        assert_eq!(published[0].qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_failure_injection() {
        let transport = MockTransport::with_failure();
        let result = transport.publish("t", b"x", QoS::AtMostOnce, false);
        assert!(matches!(result, Err(MockTransportError::PublishFailed(_))));
        assert!(transport.published().is_empty());

        transport.fail_subscribes(true);
        assert!(transport.subscribe("t/#", QoS::AtLeastOnce).is_err());
        assert_eq!(transport.subscribe_attempts(), 1);
        assert!(transport.subscriptions().is_empty());
    }

    #[test]
    fn test_clear_keeps_failure_flags() {
        let transport = MockTransport::new();
        transport.subscribe("a/#", QoS::AtLeastOnce).unwrap();
        transport.fail_publishes(true);

        transport.clear();

        assert!(transport.subscriptions().is_empty());
        assert_eq!(transport.subscribe_attempts(), 0);
        assert!(transport.publish("a/b", b"", QoS::AtLeastOnce, false).is_err());
    }

    #[test]
    fn test_stop() {
        let mut transport = MockTransport::new();
        assert!(!transport.is_stopped());
        transport.stop().unwrap();
        assert!(transport.is_stopped());
    }
}
