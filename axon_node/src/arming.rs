//! Arming gate: vehicle-wide safety state gating output transmission.
//!
//! Consumes the latest arming-status update and answers `is_armed()`.
//! The transmit path re-checks the gate at the point of transmission,
//! not at the point outputs were computed, so a disarm observed earlier
//! in the same iteration always wins. A node that has never received an
//! arming update reports disarmed.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use axon_common::arming::ArmingStatus;

/// Tracks the armed/disarmed state of the actuators on the bus.
#[derive(Debug, Default)]
pub struct ArmingGate {
    /// Whether outputs may currently be transmitted.
    armed: AtomicBool,
    /// Raw arming message last observed (diagnostics).
    last: Mutex<Option<ArmingStatus>>,
}

impl ArmingGate {
    /// New gate in the fail-safe disarmed state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one arming-status update. A missed update simply leaves
    /// the previous state in effect until the next one arrives.
    pub fn consume(&self, status: ArmingStatus) {
        let enable = status.outputs_enabled();
        let was = self.armed.swap(enable, Ordering::SeqCst);
        if was != enable {
            info!(
                "Actuators {}",
                if enable { "armed" } else { "disarmed" }
            );
        }
        *self.last.lock().expect("arming lock") = Some(status);
    }

    /// Whether outputs may be transmitted right now.
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Raw arming message last observed, if any.
    pub fn last_status(&self) -> Option<ArmingStatus> {
        *self.last.lock().expect("arming lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed_status() -> ArmingStatus {
        ArmingStatus {
            armed: true,
            ready_to_arm: true,
            ..Default::default()
        }
    }

    #[test]
    fn starts_disarmed_with_no_status() {
        let gate = ArmingGate::new();
        assert!(!gate.is_armed());
        assert!(gate.last_status().is_none());
    }

    #[test]
    fn arm_then_disarm() {
        let gate = ArmingGate::new();
        gate.consume(armed_status());
        assert!(gate.is_armed());

        gate.consume(ArmingStatus::default());
        assert!(!gate.is_armed());
    }

    #[test]
    fn lockdown_disarms_even_when_armed() {
        let gate = ArmingGate::new();
        gate.consume(ArmingStatus {
            armed: true,
            lockdown: true,
            ..Default::default()
        });
        assert!(!gate.is_armed());
    }

    #[test]
    fn last_known_state_persists() {
        let gate = ArmingGate::new();
        gate.consume(armed_status());
        // No further updates: the previous state stays in effect.
        assert!(gate.is_armed());
        assert_eq!(gate.last_status().map(|s| s.armed), Some(true));
    }
}
