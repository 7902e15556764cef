//! Channel bitsets.

use crate::NUM_CHANNELS;
use serde::{Deserialize, Serialize};

/// A set of actuator channel indices backed by a 32-bit mask.
///
/// Used for motor activity, engine failure, and multicast-controlled channel
/// selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMask(u32);

impl ChannelMask {
    /// The empty set.
    pub const EMPTY: ChannelMask = ChannelMask(0);

    /// Create from raw mask bits.
    pub const fn from_bits(bits: u32) -> Self {
        ChannelMask(bits)
    }

    /// Raw mask bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Whether `channel` is in the set. Out-of-range channels never are.
    pub const fn contains(&self, channel: usize) -> bool {
        channel < NUM_CHANNELS && self.0 & (1u32 << channel) != 0
    }

    /// Add `channel` to the set. Out-of-range channels are ignored.
    pub fn insert(&mut self, channel: usize) {
        if channel < NUM_CHANNELS {
            self.0 |= 1u32 << channel;
        }
    }

    /// Whether the set is empty.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of channels in the set.
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over channel indices in ascending order.
    pub fn iter(&self) -> ChannelMaskIter {
        ChannelMaskIter(self.0)
    }
}

impl std::ops::BitOr for ChannelMask {
    type Output = ChannelMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChannelMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ChannelMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<usize> for ChannelMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = ChannelMask::EMPTY;
        for channel in iter {
            mask.insert(channel);
        }
        mask
    }
}

impl IntoIterator for ChannelMask {
    type Item = usize;
    type IntoIter = ChannelMaskIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the channels of a [`ChannelMask`], lowest first.
#[derive(Debug, Clone)]
pub struct ChannelMaskIter(u32);

impl Iterator for ChannelMaskIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let channel = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(channel)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChannelMaskIter {}
