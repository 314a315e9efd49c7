//! Bus driver trait and factory type.
//!
//! This module defines:
//! - `BusDriver` trait - Interface for pluggable bus transport drivers
//! - `DriverFactory` type alias - Factory function type
//!
//! The bus stack manages transports through this trait, enabling
//! pluggable backends (simulation, SocketCAN, vendor drivers).

use std::sync::Arc;

use crate::bus::BusMessage;
use crate::error::BusError;
use crate::event::DataEvent;

/// Trait defining the interface for bus transport drivers.
///
/// # Lifecycle
///
/// 1. `init()` - Called once by the bus stack before the event loop starts
/// 2. `transmit()` / `receive()` - Called from the event-loop task only,
///    during spin
/// 3. `shutdown()` - Called when the bus stack is released
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | `init()` | None (pre-loop) |
/// | `transmit()` | Must not block; bounded by driver timeout |
/// | `receive()` | Must not block |
/// | `shutdown()` | None (post-loop) |
pub trait BusDriver: Send {
    /// Returns the driver's unique identifier (e.g., "sim", "socketcan").
    fn name(&self) -> &'static str;

    /// Bring up the transport at the given bitrate.
    ///
    /// The driver must signal `rx_notify` whenever inbound frames become
    /// available, so the event loop's multiplexed wait wakes.
    ///
    /// # Errors
    /// Returns `BusError::InitFailed` if the transport cannot be brought
    /// up at the requested bitrate.
    fn init(&mut self, bitrate: u32, rx_notify: Arc<DataEvent>) -> Result<(), BusError>;

    /// Hand one outbound message to the transport.
    ///
    /// # Errors
    /// Returns `BusError::Transport` on transport-level failure. Must not
    /// block the event loop.
    fn transmit(&mut self, msg: &BusMessage) -> Result<(), BusError>;

    /// Pull the next inbound message, if any. Must not block.
    fn receive(&mut self) -> Option<BusMessage>;

    /// Release the transport.
    fn shutdown(&mut self) -> Result<(), BusError>;
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn BusDriver>;
