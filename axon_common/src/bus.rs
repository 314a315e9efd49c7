//! Bus message model.
//!
//! The node treats bus traffic as opaque typed payloads keyed by a
//! message-type identity. Wire-level encoding belongs to the transport
//! driver; everything above it works on [`BusMessage`].

use heapless::Vec;

use crate::consts::{MAX_PAYLOAD_BYTES, NODE_ID_MAX, NODE_ID_MIN};

/// Identity of a node on the shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u8);

impl NodeId {
    /// Create a node id, validating the bus-legal range.
    pub const fn new(id: u8) -> Option<Self> {
        if id >= NODE_ID_MIN && id <= NODE_ID_MAX {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Raw id value.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// Message-type identity keying dispatch of inbound bus traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageTypeId(pub u16);

/// Batched per-actuator raw command, node → ESCs.
pub const MSG_ESC_RAW_COMMAND: MessageTypeId = MessageTypeId(1030);

/// Per-actuator status feedback, ESC → node.
pub const MSG_ESC_STATUS: MessageTypeId = MessageTypeId(1034);

/// One message on the field bus: a typed, bounded, opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Message-type identity (dispatch key).
    pub type_id: MessageTypeId,
    /// Originating node, if known (None for anonymous frames).
    pub source: Option<NodeId>,
    /// Receive/enqueue timestamp [µs since bus stack start].
    pub timestamp_us: u64,
    /// Opaque payload bytes.
    pub payload: Vec<u8, MAX_PAYLOAD_BYTES>,
}

impl BusMessage {
    /// Create an empty message of the given type.
    pub fn new(type_id: MessageTypeId) -> Self {
        Self {
            type_id,
            source: None,
            timestamp_us: 0,
            payload: Vec::new(),
        }
    }

    /// Create a message with the given payload bytes.
    ///
    /// Returns `None` if the payload exceeds [`MAX_PAYLOAD_BYTES`].
    pub fn with_payload(type_id: MessageTypeId, bytes: &[u8]) -> Option<Self> {
        let mut msg = Self::new(type_id);
        msg.payload.extend_from_slice(bytes).ok()?;
        Some(msg)
    }
}
