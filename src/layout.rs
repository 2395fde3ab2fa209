/*
 * Copyright © 2023 Archer <archer@nefarious.dev>
 * Licensed under the Apache License, Version 2.0 (the "Licence");
 * you may not use this file except in compliance with the Licence.
 * You may obtain a copy of the Licence at
 *     https://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the Licence is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the Licence for the specific language governing permissions and
 * limitations under the Licence.
 */

//! The bit layout shared by identifier composition and decomposition.

use crate::{ConfigurationError, LayoutConfig};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// The validated, immutable layout of a generated identifier.
///
/// Identifiers constructed with a layout consist of a leading `0` bit followed by the timestamp (milliseconds since
/// the layout's epoch), the datacenter ID, the worker ID, and the sequence number, from the most to the least
/// significant bits. Segments that don't use all 63 bits leave the highest bits unset. The leading `0` bit guarantees
/// that identifiers keep their ordering when converted into signed 64-bit integers.
///
/// As the timestamp is stored in front of everything else, identifiers generated later compare greater, and
/// identifiers of distinct nodes always differ in their node segments.
///
/// # Example
///
/// ```
/// use snowstamp::{Components, IdentifierLayout};
///
/// // 41 timestamp bits, 5 datacenter bits, 5 worker bits, and 12 sequence bits
/// let layout = IdentifierLayout::default();
/// let id = layout.compose(367597485448, 11, 26, 0);
/// assert_eq!(1541815603606036480, id);
/// assert_eq!(
///     Components {
///         timestamp_offset: 367597485448,
///         datacenter_id: 11,
///         worker_id: 26,
///         sequence: 0,
///     },
///     layout.decompose(id)
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentifierLayout {
    epoch: u64,
    timestamp_bits: u32,
    datacenter_bits: u32,
    worker_bits: u32,
    sequence_bits: u32,
}

impl IdentifierLayout {
    /// Validates the given configuration and returns the resulting layout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::BitWidthOverflow`] if the segments and the reserved sign bit need more than 64
    /// bits, and [`ConfigurationError::ZeroTimestampBits`] if the layout doesn't store a timestamp.
    pub fn new(config: LayoutConfig) -> Result<Self, ConfigurationError> {
        if config.timestamp_bits == 0 {
            return Err(ConfigurationError::ZeroTimestampBits);
        }
        // Sum in u64 so absurd bit widths can't overflow the check itself
        let total = 1
            + u64::from(config.timestamp_bits)
            + u64::from(config.datacenter_bits)
            + u64::from(config.worker_bits)
            + u64::from(config.sequence_bits);
        if total > 64 {
            return Err(ConfigurationError::BitWidthOverflow {
                total: u32::try_from(total).unwrap_or(u32::MAX),
            });
        }
        Ok(Self::from_config_unchecked(config))
    }

    const fn from_config_unchecked(config: LayoutConfig) -> Self {
        Self {
            epoch: config.epoch,
            timestamp_bits: config.timestamp_bits,
            datacenter_bits: config.datacenter_bits,
            worker_bits: config.worker_bits,
            sequence_bits: config.sequence_bits,
        }
    }

    /// Returns the configuration this layout was built from.
    pub fn config(&self) -> LayoutConfig {
        LayoutConfig {
            epoch: self.epoch,
            timestamp_bits: self.timestamp_bits,
            datacenter_bits: self.datacenter_bits,
            worker_bits: self.worker_bits,
            sequence_bits: self.sequence_bits,
        }
    }

    /// Returns the layout's epoch in milliseconds since the Unix epoch.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the number of bits dedicated to the timestamp.
    #[inline]
    pub fn timestamp_bits(&self) -> u32 {
        self.timestamp_bits
    }

    /// Returns the number of bits dedicated to the datacenter ID.
    #[inline]
    pub fn datacenter_bits(&self) -> u32 {
        self.datacenter_bits
    }

    /// Returns the number of bits dedicated to the worker ID.
    #[inline]
    pub fn worker_bits(&self) -> u32 {
        self.worker_bits
    }

    /// Returns the number of bits dedicated to the sequence number.
    #[inline]
    pub fn sequence_bits(&self) -> u32 {
        self.sequence_bits
    }

    /// Returns the largest timestamp offset (milliseconds since the epoch) this layout can store.
    #[inline]
    pub fn max_timestamp(&self) -> u64 {
        mask(self.timestamp_bits)
    }

    /// Returns the largest datacenter ID this layout can store.
    #[inline]
    pub fn max_datacenter_id(&self) -> u64 {
        mask(self.datacenter_bits)
    }

    /// Returns the largest worker ID this layout can store.
    #[inline]
    pub fn max_worker_id(&self) -> u64 {
        mask(self.worker_bits)
    }

    /// Returns the largest sequence number this layout can store.
    #[inline]
    pub fn max_sequence(&self) -> u64 {
        mask(self.sequence_bits)
    }

    #[inline]
    fn worker_shift(&self) -> u32 {
        self.sequence_bits
    }

    #[inline]
    fn datacenter_shift(&self) -> u32 {
        self.sequence_bits + self.worker_bits
    }

    #[inline]
    fn timestamp_shift(&self) -> u32 {
        self.sequence_bits + self.worker_bits + self.datacenter_bits
    }

    /// Combines the given components into an identifier.
    ///
    /// # Panics
    ///
    /// Panics if any component exceeds the maximum supported by this layout. Use [`try_compose`](Self::try_compose)
    /// if the components aren't known to be in range.
    #[inline]
    pub fn compose(&self, timestamp_offset: u64, datacenter_id: u64, worker_id: u64, sequence: u64) -> u64 {
        assert!(
            timestamp_offset <= self.max_timestamp()
                && datacenter_id <= self.max_datacenter_id()
                && worker_id <= self.max_worker_id()
                && sequence <= self.max_sequence()
        );
        (timestamp_offset << self.timestamp_shift())
            | (datacenter_id << self.datacenter_shift())
            | (worker_id << self.worker_shift())
            | sequence
    }

    /// Combines the given components into an identifier, or returns `None` if a component is out of range.
    pub fn try_compose(&self, timestamp_offset: u64, datacenter_id: u64, worker_id: u64, sequence: u64) -> Option<u64> {
        if timestamp_offset > self.max_timestamp()
            || datacenter_id > self.max_datacenter_id()
            || worker_id > self.max_worker_id()
            || sequence > self.max_sequence()
        {
            return None;
        }
        Some(self.compose(timestamp_offset, datacenter_id, worker_id, sequence))
    }

    /// Splits the given identifier into its components.
    ///
    /// This is the exact inverse of [`compose`](Self::compose) for every identifier this layout can produce. Bits
    /// outside the layout's segments are ignored; use [`is_valid`](Self::is_valid) to detect them.
    #[inline]
    pub fn decompose(&self, id: u64) -> Components {
        Components {
            timestamp_offset: (id >> self.timestamp_shift()) & self.max_timestamp(),
            datacenter_id: (id >> self.datacenter_shift()) & self.max_datacenter_id(),
            worker_id: (id >> self.worker_shift()) & self.max_worker_id(),
            sequence: id & self.max_sequence(),
        }
    }

    /// Returns whether the given integer could have been produced with this layout.
    ///
    /// Specifically, this checks that no bit above the timestamp segment is set (including the reserved sign bit).
    #[inline]
    pub fn is_valid(&self, id: u64) -> bool {
        id >> (self.timestamp_shift() + self.timestamp_bits) == 0
    }

    /// Converts a timestamp offset into milliseconds since the Unix epoch.
    ///
    /// Returns `None` if the result doesn't fit into 64 bits.
    #[inline]
    pub fn unix_millis(&self, timestamp_offset: u64) -> Option<u64> {
        self.epoch.checked_add(timestamp_offset)
    }

    /// Converts a timestamp offset into a [`SystemTime`].
    ///
    /// Returns `None` if the time can't be represented by `SystemTime` on this platform.
    pub fn system_time(&self, timestamp_offset: u64) -> Option<SystemTime> {
        SystemTime::UNIX_EPOCH.checked_add(Duration::from_millis(self.unix_millis(timestamp_offset)?))
    }
}

impl Default for IdentifierLayout {
    /// Returns the classic 41/5/5/12 layout with [`DEFAULT_EPOCH`](crate::DEFAULT_EPOCH).
    fn default() -> Self {
        Self::from_config_unchecked(LayoutConfig::default())
    }
}

impl TryFrom<LayoutConfig> for IdentifierLayout {
    type Error = ConfigurationError;

    fn try_from(config: LayoutConfig) -> Result<Self, Self::Error> {
        Self::new(config)
    }
}

/// The parts of an identifier, as returned by [`IdentifierLayout::decompose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Components {
    /// Milliseconds between the layout's epoch and the identifier's issuance.
    pub timestamp_offset: u64,
    /// The issuing node's datacenter ID.
    pub datacenter_id: u64,
    /// The issuing node's worker ID.
    pub worker_id: u64,
    /// The position of the identifier within its millisecond.
    pub sequence: u64,
}

#[inline]
fn mask(bits: u32) -> u64 {
    // Layouts never exceed 63 bits per segment, so the shift can't overflow
    (1u64 << bits) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(timestamp_bits: u32, datacenter_bits: u32, worker_bits: u32, sequence_bits: u32) -> IdentifierLayout {
        IdentifierLayout::new(LayoutConfig {
            epoch: 0,
            timestamp_bits,
            datacenter_bits,
            worker_bits,
            sequence_bits,
        })
        .unwrap()
    }

    #[test]
    fn validation() {
        assert_eq!(
            Err(ConfigurationError::BitWidthOverflow { total: 65 }),
            IdentifierLayout::new(LayoutConfig {
                timestamp_bits: 42,
                ..LayoutConfig::default()
            })
        );
        assert_eq!(
            Err(ConfigurationError::ZeroTimestampBits),
            IdentifierLayout::new(LayoutConfig {
                timestamp_bits: 0,
                ..LayoutConfig::default()
            })
        );
        assert_eq!(
            Err(ConfigurationError::BitWidthOverflow { total: u32::MAX }),
            IdentifierLayout::new(LayoutConfig {
                sequence_bits: u32::MAX,
                ..LayoutConfig::default()
            })
        );
        // Segments may be empty as long as there is a timestamp
        assert!(IdentifierLayout::new(LayoutConfig {
            epoch: 0,
            timestamp_bits: 63,
            datacenter_bits: 0,
            worker_bits: 0,
            sequence_bits: 0,
        })
        .is_ok());
        assert_eq!(IdentifierLayout::default(), IdentifierLayout::new(LayoutConfig::default()).unwrap());
    }

    #[test]
    fn maxima() {
        let layout = IdentifierLayout::default();
        assert_eq!((1 << 41) - 1, layout.max_timestamp());
        assert_eq!(31, layout.max_datacenter_id());
        assert_eq!(31, layout.max_worker_id());
        assert_eq!(4095, layout.max_sequence());
        assert_eq!(0, self::layout(63, 0, 0, 0).max_sequence());
    }

    #[test]
    fn compose() {
        let layout = IdentifierLayout::default();
        assert_eq!(0, layout.compose(0, 0, 0, 0));
        assert_eq!(1 << 22, layout.compose(1, 0, 0, 0));
        assert_eq!(1 << 17, layout.compose(0, 1, 0, 0));
        assert_eq!(1 << 12, layout.compose(0, 0, 1, 0));
        assert_eq!(1, layout.compose(0, 0, 0, 1));

        // The largest identifier still has a leading 0
        let largest = layout.compose((1 << 41) - 1, 31, 31, 4095);
        assert_eq!(u64::MAX >> 1, largest);
        assert!(i64::try_from(largest).is_ok());
    }

    #[test]
    #[should_panic]
    fn extreme_timestamp() {
        let _ = IdentifierLayout::default().compose(1 << 41, 0, 0, 0);
    }

    #[test]
    #[should_panic]
    fn extreme_datacenter_id() {
        let _ = IdentifierLayout::default().compose(0, 32, 0, 0);
    }

    #[test]
    #[should_panic]
    fn extreme_worker_id() {
        let _ = IdentifierLayout::default().compose(0, 0, 32, 0);
    }

    #[test]
    #[should_panic]
    fn extreme_sequence() {
        let _ = IdentifierLayout::default().compose(0, 0, 0, 4096);
    }

    #[test]
    fn try_compose() {
        let layout = IdentifierLayout::default();
        assert_eq!(None, layout.try_compose(0, 0, 32, 0));
        assert_eq!(None, layout.try_compose(1 << 41, 0, 0, 0));
        assert_eq!(Some((5 << 22) | (2 << 17) | (3 << 12) | 4), layout.try_compose(5, 2, 3, 4));
    }

    #[test]
    fn round_trip() {
        // Boundary values of each segment for a few layouts, including ones with empty segments
        for layout in [
            IdentifierLayout::default(),
            layout(42, 3, 7, 11),
            layout(63, 0, 0, 0),
            layout(20, 0, 10, 0),
            layout(1, 1, 1, 1),
        ] {
            for timestamp_offset in [0, 1, layout.max_timestamp() / 2, layout.max_timestamp()] {
                for datacenter_id in [0, layout.max_datacenter_id()] {
                    for worker_id in [0, layout.max_worker_id() / 2, layout.max_worker_id()] {
                        for sequence in [0, layout.max_sequence()] {
                            let expected = Components {
                                timestamp_offset,
                                datacenter_id,
                                worker_id,
                                sequence,
                            };
                            let id = layout.compose(timestamp_offset, datacenter_id, worker_id, sequence);
                            assert!(layout.is_valid(id));
                            assert_eq!(expected, layout.decompose(id), "{layout:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn is_valid() {
        let layout = IdentifierLayout::default();
        assert!(layout.is_valid(u64::MAX >> 1));
        assert!(!layout.is_valid(1 << 63));

        // A layout smaller than 63 bits rejects everything above its timestamp segment
        let layout = layout_small();
        assert!(layout.is_valid((1 << 20) - 1));
        assert!(!layout.is_valid(1 << 20));
    }

    fn layout_small() -> IdentifierLayout {
        layout(10, 2, 2, 6)
    }

    #[test]
    fn timestamps() {
        let layout = IdentifierLayout::new(LayoutConfig {
            epoch: 1420070400000,
            ..LayoutConfig::default()
        })
        .unwrap();
        assert_eq!(Some(1420070400123), layout.unix_millis(123));
        assert_eq!(
            Some(SystemTime::UNIX_EPOCH + Duration::from_millis(1420070400123)),
            layout.system_time(123)
        );
        assert_eq!(None, layout.unix_millis(u64::MAX));
        assert_eq!(None, layout.system_time(u64::MAX));
    }
}
