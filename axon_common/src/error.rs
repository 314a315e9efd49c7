//! Error taxonomy for the AXON workspace.
//!
//! Fatal lifecycle errors surface synchronously from `start`/`teardown`
//! as [`NodeError`]; bus-level failures are [`BusError`]. Transient
//! per-cycle conditions (transmit queue full, malformed inbound frames,
//! missing control inputs) are counted on the diagnostic surface and
//! never propagate out of the event loop.

use std::time::Duration;
use thiserror::Error;

/// Error types for bus stack and driver operations.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// No driver with the given name is registered.
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Transport could not be brought up at the requested bitrate.
    #[error("Bus initialization failed: {0}")]
    InitFailed(String),

    /// Fixed memory pool cannot hold the declared protocol objects.
    #[error("Memory pool too small: need {required} bytes, have {available}")]
    PoolExhausted {
        /// Bytes required for the declared queue depths.
        required: usize,
        /// Bytes available in the configured pool.
        available: usize,
    },

    /// Outbound transmit queue is full; the caller drops this cycle.
    #[error("Transmit queue full")]
    TxQueueFull,

    /// Driver-level transport failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Error types for node lifecycle and configuration operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A node instance already exists (the bus is single-owner).
    #[error("Node is already running")]
    AlreadyRunning,

    /// No node instance is currently running.
    #[error("Node is not running")]
    NotRunning,

    /// Bus stack could not be initialized.
    #[error("Bus initialization failed: {0}")]
    BusInit(#[from] BusError),

    /// Configuration error (bad file, bad value, oversubscribed mixer).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The event loop did not observe shutdown within the bound.
    /// Signals a stuck bus call — fatal for this node instance.
    #[error("Event loop did not stop within {0:?}")]
    TeardownTimeout(Duration),
}
