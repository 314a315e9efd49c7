//! # AXON Bus Stack
//!
//! Thin wrapper around the bus transport driver and its clock source.
//! Owns the underlying protocol-stack instance: a fixed-size memory pool
//! for protocol objects, a bounded transmit queue and the RX-ready event.
//! Exposes the send/receive/spin primitives the node runtime builds on.
//!
//! Transports plug in behind the [`axon_common::driver::BusDriver`] trait
//! and are created by name through the [`registry::DriverRegistry`]. A
//! software-only loopback driver ([`sim::SimBusDriver`]) ships for
//! development and testing without bus hardware.

pub mod registry;
pub mod sim;
pub mod stack;

pub use registry::DriverRegistry;
pub use sim::{SimBusDriver, SimBusHandle};
pub use stack::{BusStack, BusStats};
