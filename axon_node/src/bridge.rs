//! Sensor bridge registry.
//!
//! Each bridge decodes one class of inbound bus sensor message into the
//! vehicle's internal representation. Bridges declare their message-type
//! interest once at startup; on each bus spin, matching messages are
//! dispatched in registration order. A bridge that fails to decode a
//! message discards it and its error counter is incremented — this
//! never halts the loop.

use heapless::Vec as HVec;
use thiserror::Error;
use tracing::debug;

use axon_common::bus::{BusMessage, MessageTypeId};
use axon_common::consts::MAX_SENSOR_BRIDGES;
use axon_common::error::NodeError;

/// Declared message types per bridge.
const MAX_BRIDGE_INTEREST: usize = 8;

/// Decode failure for one inbound message.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Payload does not parse as the expected message class.
    #[error("Malformed payload: {0}")]
    Malformed(&'static str),

    /// Parsed value outside the physically plausible range.
    #[error("Value out of range: {0}")]
    OutOfRange(&'static str),
}

/// A decoder for one class of inbound bus sensor messages.
pub trait SensorBridge: Send {
    /// Bridge identifier for diagnostics (e.g. "gnss", "airspeed").
    fn name(&self) -> &'static str;

    /// Bus message types this bridge wants to receive.
    fn interest(&self) -> &[MessageTypeId];

    /// Decode one matching message and publish it internally.
    fn decode(&mut self, msg: &BusMessage) -> Result<(), BridgeError>;
}

struct BridgeEntry {
    bridge: Box<dyn SensorBridge>,
    /// Interest declared at subscribe time.
    interest: HVec<MessageTypeId, MAX_BRIDGE_INTEREST>,
    /// Messages this bridge failed to decode.
    errors: u64,
}

/// Ordered sequence of active sensor bridges, owned by the node.
pub struct BridgeRegistry {
    entries: Vec<BridgeEntry>,
}

impl BridgeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a bridge. Order of registration is dispatch order.
    ///
    /// # Errors
    /// `NodeError::Config` when the bridge limit is reached.
    pub fn register(&mut self, bridge: Box<dyn SensorBridge>) -> Result<(), NodeError> {
        if self.entries.len() >= MAX_SENSOR_BRIDGES {
            return Err(NodeError::Config(format!(
                "Too many sensor bridges (max {MAX_SENSOR_BRIDGES})"
            )));
        }
        self.entries.push(BridgeEntry {
            bridge,
            interest: HVec::new(),
            errors: 0,
        });
        Ok(())
    }

    /// Ask every bridge to declare its message-type interest.
    ///
    /// Called once at startup, before the event loop runs.
    pub fn subscribe(&mut self) {
        for entry in &mut self.entries {
            entry.interest.clear();
            for &type_id in entry.bridge.interest() {
                if entry.interest.push(type_id).is_err() {
                    debug!(
                        "Bridge '{}' declares more than {MAX_BRIDGE_INTEREST} message types; extra interest ignored",
                        entry.bridge.name()
                    );
                    break;
                }
            }
        }
    }

    /// Dispatch one inbound message to every interested bridge, in
    /// registration order.
    pub fn dispatch(&mut self, msg: &BusMessage) {
        for entry in &mut self.entries {
            if !entry.interest.contains(&msg.type_id) {
                continue;
            }
            if let Err(e) = entry.bridge.decode(msg) {
                entry.errors += 1;
                debug!("Bridge '{}' discarded message: {e}", entry.bridge.name());
            }
        }
    }

    /// Number of registered bridges.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no bridges are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-bridge error counters, in registration order.
    pub fn error_counts(&self) -> Vec<(&'static str, u64)> {
        self.entries
            .iter()
            .map(|e| (e.bridge.name(), e.errors))
            .collect()
    }
}

impl Default for BridgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPE_A: MessageTypeId = MessageTypeId(2000);
    const TYPE_B: MessageTypeId = MessageTypeId(2001);

    struct TestBridge {
        name: &'static str,
        interest: [MessageTypeId; 1],
        decoded: u32,
        fail: bool,
    }

    impl TestBridge {
        fn new(name: &'static str, type_id: MessageTypeId, fail: bool) -> Self {
            Self {
                name,
                interest: [type_id],
                decoded: 0,
                fail,
            }
        }
    }

    impl SensorBridge for TestBridge {
        fn name(&self) -> &'static str {
            self.name
        }

        fn interest(&self) -> &[MessageTypeId] {
            &self.interest
        }

        fn decode(&mut self, _msg: &BusMessage) -> Result<(), BridgeError> {
            if self.fail {
                return Err(BridgeError::Malformed("test"));
            }
            self.decoded += 1;
            Ok(())
        }
    }

    #[test]
    fn dispatch_matches_declared_interest() {
        let mut registry = BridgeRegistry::new();
        registry
            .register(Box::new(TestBridge::new("a", TYPE_A, false)))
            .unwrap();
        registry
            .register(Box::new(TestBridge::new("b", TYPE_B, false)))
            .unwrap();
        registry.subscribe();

        registry.dispatch(&BusMessage::new(TYPE_A));
        registry.dispatch(&BusMessage::new(TYPE_A));
        registry.dispatch(&BusMessage::new(TYPE_B));

        // Counters stay zero — decode succeeded everywhere.
        assert_eq!(registry.error_counts(), vec![("a", 0), ("b", 0)]);
    }

    #[test]
    fn decode_failure_increments_only_that_bridge() {
        let mut registry = BridgeRegistry::new();
        registry
            .register(Box::new(TestBridge::new("ok", TYPE_A, false)))
            .unwrap();
        registry
            .register(Box::new(TestBridge::new("bad", TYPE_A, true)))
            .unwrap();
        registry.subscribe();

        registry.dispatch(&BusMessage::new(TYPE_A));
        assert_eq!(registry.error_counts(), vec![("ok", 0), ("bad", 1)]);
    }

    #[test]
    fn unmatched_messages_are_ignored() {
        let mut registry = BridgeRegistry::new();
        registry
            .register(Box::new(TestBridge::new("a", TYPE_A, true)))
            .unwrap();
        registry.subscribe();

        registry.dispatch(&BusMessage::new(TYPE_B));
        assert_eq!(registry.error_counts(), vec![("a", 0)]);
    }

    #[test]
    fn registry_enforces_bridge_limit() {
        let mut registry = BridgeRegistry::new();
        for _ in 0..MAX_SENSOR_BRIDGES {
            registry
                .register(Box::new(TestBridge::new("x", TYPE_A, false)))
                .unwrap();
        }
        let result = registry.register(Box::new(TestBridge::new("y", TYPE_A, false)));
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn dispatch_without_subscribe_delivers_nothing() {
        let mut registry = BridgeRegistry::new();
        registry
            .register(Box::new(TestBridge::new("a", TYPE_A, true)))
            .unwrap();

        // Interest is declared by subscribe(); without it nothing matches.
        registry.dispatch(&BusMessage::new(TYPE_A));
        assert_eq!(registry.error_counts(), vec![("a", 0)]);
    }
}
