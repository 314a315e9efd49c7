//! Control-group setpoints, group masks and actuator outputs.
//!
//! A control group is a named channel of actuator setpoints consumed by
//! the mixer. Group membership is tracked in a [`GroupMask`]; groups are
//! always evaluated in ascending group index order, which is the
//! determinism guarantee the mixing pipeline documents.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::consts::{CONTROL_CHANNELS_PER_GROUP, MAX_CONTROL_GROUPS};

bitflags! {
    /// Bitmask of control groups (bit n = group n).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GroupMask: u32 {
        /// Control group 0.
        const GROUP0 = 1 << 0;
        /// Control group 1.
        const GROUP1 = 1 << 1;
        /// Control group 2.
        const GROUP2 = 1 << 2;
        /// Control group 3.
        const GROUP3 = 1 << 3;
    }
}

impl GroupMask {
    /// Mask for a single group index, `None` if out of range.
    pub fn from_group(group: u8) -> Option<Self> {
        if (group as usize) < MAX_CONTROL_GROUPS {
            Self::from_bits(1 << group)
        } else {
            None
        }
    }

    /// Iterate the set group indices in ascending order.
    pub fn groups(self) -> impl Iterator<Item = u8> {
        (0..MAX_CONTROL_GROUPS as u8).filter(move |&g| self.bits() & (1u32 << g) != 0)
    }

    /// Whether the given group index is set.
    #[inline]
    pub fn contains_group(self, group: u8) -> bool {
        (group as usize) < MAX_CONTROL_GROUPS && self.bits() & (1 << group) != 0
    }
}

/// One control group's setpoint vector, as delivered by its feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlSetpoints {
    /// Per-channel setpoint scalars, nominally in [-1, +1].
    pub values: [f32; CONTROL_CHANNELS_PER_GROUP],
    /// Publication timestamp [µs], source-defined.
    pub timestamp_us: u64,
}

impl Default for ControlSetpoints {
    fn default() -> Self {
        Self {
            values: [0.0; CONTROL_CHANNELS_PER_GROUP],
            timestamp_us: 0,
        }
    }
}

impl ControlSetpoints {
    /// Setpoint for one channel; channels beyond the vector are 0.0.
    #[inline]
    pub fn channel(&self, index: u8) -> f32 {
        self.values.get(index as usize).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_group_bounds() {
        assert_eq!(GroupMask::from_group(0), Some(GroupMask::GROUP0));
        assert_eq!(GroupMask::from_group(3), Some(GroupMask::GROUP3));
        assert_eq!(GroupMask::from_group(4), None);
    }

    #[test]
    fn groups_iterate_ascending() {
        let mask = GroupMask::GROUP2 | GroupMask::GROUP0;
        let order: Vec<u8> = mask.groups().collect();
        assert_eq!(order, vec![0, 2]);
    }

    #[test]
    fn contains_group() {
        let mask = GroupMask::GROUP1 | GroupMask::GROUP3;
        assert!(!mask.contains_group(0));
        assert!(mask.contains_group(1));
        assert!(mask.contains_group(3));
        assert!(!mask.contains_group(4));
    }

    #[test]
    fn setpoints_channel_out_of_range_is_zero() {
        let mut sp = ControlSetpoints::default();
        sp.values[0] = 0.5;
        assert_eq!(sp.channel(0), 0.5);
        assert_eq!(sp.channel(CONTROL_CHANNELS_PER_GROUP as u8), 0.0);
    }
}
