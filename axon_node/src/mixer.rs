//! Control-group subscription and mixing pipeline glue.
//!
//! The mixing computation itself is externally supplied behind the
//! [`Mixer`] trait; this module owns the seam around it: the control
//! input source the mixer reads through, and the reconciliation of the
//! subscription set against the groups the mixer requires.
//!
//! Groups are evaluated in ascending group index, indices ascending
//! within a group. This ordering is a determinism guarantee for
//! golden-output tests, not a performance concern.

use axon_common::consts::{CONTROL_NEUTRAL, MAX_CONTROL_GROUPS};
use axon_common::control::{ControlSetpoints, GroupMask};

/// Source of scalar control inputs for the mixing step.
///
/// `get` never blocks and never fails: a (group, index) pair with no
/// data degrades gracefully to [`CONTROL_NEUTRAL`].
pub trait ControlInputs {
    /// Latest setpoint for one control index within one group.
    fn get(&self, group: u8, index: u8) -> f32;
}

/// Opaque mixing configuration, consumed but never modified.
pub trait Mixer: Send + Sync {
    /// Raw bitmask of the control groups this mixer reads from.
    ///
    /// Bits at or above the supported group count are a configuration
    /// error, surfaced by `configure_mixer`.
    fn groups_required(&self) -> u32;

    /// Compute per-actuator outputs through `inputs`.
    ///
    /// `outputs` holds one slot per configured actuator; returns the
    /// number of outputs written.
    fn mix(&self, inputs: &dyn ControlInputs, outputs: &mut [f32]) -> usize;
}

/// Last-received setpoints per group, owned by the event-loop task.
#[derive(Debug, Default)]
pub struct LoopControls {
    latest: [Option<ControlSetpoints>; MAX_CONTROL_GROUPS],
}

impl LoopControls {
    /// All groups without data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store freshly copied-out setpoints for a group.
    pub fn set(&mut self, group: u8, setpoints: ControlSetpoints) {
        if let Some(slot) = self.latest.get_mut(group as usize) {
            *slot = Some(setpoints);
        }
    }

    /// Forget a group's data (on unsubscribe).
    pub fn clear(&mut self, group: u8) {
        if let Some(slot) = self.latest.get_mut(group as usize) {
            *slot = None;
        }
    }
}

impl ControlInputs for LoopControls {
    fn get(&self, group: u8, index: u8) -> f32 {
        match self.latest.get(group as usize) {
            Some(Some(setpoints)) => setpoints.channel(index),
            _ => CONTROL_NEUTRAL,
        }
    }
}

/// Derive the subscription changes needed to match `required`.
///
/// Returns `(to_subscribe, to_unsubscribe)`. Applying the result makes
/// `subscribed == required`; reapplying the same `required` yields two
/// empty masks, so reconciliation is idempotent.
pub fn reconcile(subscribed: GroupMask, required: GroupMask) -> (GroupMask, GroupMask) {
    (required - subscribed, subscribed - required)
}

/// Trivial mixer passing one group's channels straight to the outputs.
///
/// Used by the demo binary and as a reference mixer in tests.
pub struct PassthroughMixer {
    group: u8,
}

impl PassthroughMixer {
    /// Pass through the given control group.
    pub fn new(group: u8) -> Self {
        Self { group }
    }
}

impl Mixer for PassthroughMixer {
    fn groups_required(&self) -> u32 {
        1 << self.group
    }

    fn mix(&self, inputs: &dyn ControlInputs, outputs: &mut [f32]) -> usize {
        for (index, out) in outputs.iter_mut().enumerate() {
            *out = inputs.get(self.group, index as u8);
        }
        outputs.len()
    }
}
