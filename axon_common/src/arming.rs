//! Arming status message.
//!
//! Delivered by the vehicle-wide arming feed; the node keeps the latest
//! value as current ("last known state persists until updated").

use serde::{Deserialize, Serialize};

/// Vehicle-wide arming state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArmingStatus {
    /// Actuator outputs may be transmitted.
    pub armed: bool,
    /// Preflight checks passed; arming is allowed.
    pub ready_to_arm: bool,
    /// Outputs are forced off regardless of `armed` (kill switch).
    pub lockdown: bool,
    /// Publication timestamp [µs], source-defined.
    pub timestamp_us: u64,
}

impl ArmingStatus {
    /// Whether outputs may actually be driven.
    #[inline]
    pub const fn outputs_enabled(&self) -> bool {
        self.armed && !self.lockdown
    }
}
