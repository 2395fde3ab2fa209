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

//! The identifier type handed out by generators.

use crate::{Components, Error, IdentifierLayout, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// An identifier issued by a [`Generator`](crate::Generator).
///
/// Identifiers are plain 64-bit integers with their most significant bit unset. They are
/// * unique (no two generators with distinct node identities and no two calls on one generator return the same value)
/// * and monotonic per generator (an identifier `a` issued before `b` by the same generator satisfies `a < b`).
///
/// The identifier doesn't carry its layout. Decomposing it requires the [`IdentifierLayout`] it was issued with.
///
/// # Example
///
/// ```
/// use snowstamp::{GeneratedId, IdentifierLayout};
///
/// let id: GeneratedId = "1541815603606036480".parse().unwrap();
/// assert_eq!(1541815603606036480, id.get_i64());
///
/// let components = id.decompose(&IdentifierLayout::default());
/// assert_eq!(367597485448, components.timestamp_offset);
/// assert_eq!(11, components.datacenter_id);
/// assert_eq!(26, components.worker_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
#[repr(transparent)]
pub struct GeneratedId {
    inner: u64,
}

impl GeneratedId {
    /// Returns the identifier for the given integer representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the reserved most significant bit is set.
    pub fn from_raw(input: u64) -> Result<Self> {
        if input >> 63 != 0 {
            return Err(Error::InvalidId(format!("{input} has the reserved sign bit set")));
        }
        Ok(Self { inner: input })
    }

    #[inline]
    pub(crate) fn new_unchecked(inner: u64) -> Self {
        Self { inner }
    }

    /// Returns the integer representation of this identifier.
    #[inline]
    pub fn get(&self) -> u64 {
        self.inner
    }

    /// Returns this identifier as a non-negative signed integer.
    ///
    /// The reserved leading `0` bit guarantees that this conversion is lossless and order-preserving, so identifiers
    /// can be stored in signed 64-bit database columns.
    #[inline]
    pub fn get_i64(&self) -> i64 {
        self.inner as i64
    }

    /// Splits this identifier into its components under the given layout.
    #[inline]
    pub fn decompose(&self, layout: &IdentifierLayout) -> Components {
        layout.decompose(self.inner)
    }
}

impl Display for GeneratedId {
    /// Displays the identifier as a decimal-encoded integer.
    ///
    /// You can losslessly parse this method's output back into the same identifier.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl FromStr for GeneratedId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.parse::<u64>().map_err(|e| Error::InvalidId(format!("{s:?}: {e}")))?;
        Self::from_raw(input)
    }
}

impl From<GeneratedId> for u64 {
    #[inline]
    fn from(id: GeneratedId) -> Self {
        id.get()
    }
}

impl From<GeneratedId> for i64 {
    #[inline]
    fn from(id: GeneratedId) -> Self {
        id.get_i64()
    }
}

impl TryFrom<i64> for GeneratedId {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u64::try_from(value)
            .map_err(|_| Error::InvalidId(format!("{value} is negative")))
            .map(|inner| Self { inner })
    }
}

impl TryFrom<u64> for GeneratedId {
    type Error = Error;

    #[inline]
    fn try_from(value: u64) -> Result<Self> {
        Self::from_raw(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw() {
        assert_eq!(0, GeneratedId::from_raw(0).unwrap().get());
        assert_eq!(i64::MAX, GeneratedId::from_raw(u64::MAX >> 1).unwrap().get_i64());
        assert!(matches!(GeneratedId::from_raw(1 << 63), Err(Error::InvalidId(_))));
    }

    #[test]
    fn parse_and_display() {
        let id: GeneratedId = "42".parse().unwrap();
        assert_eq!("42", id.to_string());
        assert!("-1".parse::<GeneratedId>().is_err());
        assert!("abc".parse::<GeneratedId>().is_err());
        assert!(u64::MAX.to_string().parse::<GeneratedId>().is_err());
    }

    #[test]
    fn conversions() {
        let id = GeneratedId::try_from(7i64).unwrap();
        assert_eq!(7u64, u64::from(id));
        assert_eq!(7i64, i64::from(id));
        assert!(GeneratedId::try_from(-7i64).is_err());
        assert!(GeneratedId::try_from(u64::MAX).is_err());
    }

    #[test]
    fn ordering() {
        let a = GeneratedId::from_raw(1).unwrap();
        let b = GeneratedId::from_raw(2).unwrap();
        assert!(a < b);
        assert!(a.get_i64() < b.get_i64());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_as_integer() {
        let id = GeneratedId::from_raw(1541815603606036480).unwrap();
        assert_eq!("1541815603606036480", serde_json::to_string(&id).unwrap());
        assert_eq!(id, serde_json::from_str("1541815603606036480").unwrap());
        assert!(serde_json::from_str::<GeneratedId>("9223372036854775808").is_err());
    }
}
