//! # AXON Node Runtime Library
//!
//! The runtime node of a vehicle's field-bus actuator/sensor network.
//! Owns the connection to the broadcast bus shared by motor controllers
//! and sensors, arbitrates which control data reach the actuators, and
//! fans bus-delivered sensor data in to the rest of the control stack.
//!
//! ## Architecture
//!
//! 1. **Node** — singleton owner of the bus stack; lifecycle surface
//! 2. **Event loop** — one real-time task multiplexing control-group
//!    data, arming updates and bus RX readiness
//! 3. **ArmingGate** — vehicle-wide safety gate on output transmission
//! 4. **Mixer glue** — control-group subscriptions feeding the opaque
//!    mixing pipeline
//! 5. **EscController** — mixed outputs → bus commands, status → telemetry
//! 6. **SensorBridge registry** — inbound sensor decode plugins
//!
//! ## Concurrency discipline
//!
//! The event-loop task is the only driver of bus-stack state; every
//! other context (diagnostics, reconfiguration, lifecycle) goes through
//! the node mutex, which the loop never holds across its blocking wait.

pub mod arming;
pub mod bridge;
pub mod cycle;
pub mod esc;
pub mod feed;
pub mod lifecycle;
pub mod mixer;
pub mod node;
pub mod poll;

pub use arming::ArmingGate;
pub use bridge::{BridgeRegistry, SensorBridge};
pub use esc::EscController;
pub use feed::{ControlHub, ControlPublisher, WatchReceiver, WatchSender, watch};
pub use mixer::{ControlInputs, Mixer};
pub use node::{Node, NodeInfo};
