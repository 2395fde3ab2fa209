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

//! Plain configuration values for layouts and generators.
//!
//! With the `serde` feature enabled, every type in this module can be deserialized from the host's configuration
//! files. Missing fields fall back to their defaults, so a configuration that only names the node identity is valid:
//!
//! ```
//! # #[cfg(feature = "serde")]
//! # {
//! use snowstamp::GeneratorConfig;
//!
//! let config: GeneratorConfig =
//!     serde_json::from_str(r#"{ "datacenter_id": 3, "worker_id": 7 }"#).unwrap();
//! assert_eq!(3, config.datacenter_id);
//! assert_eq!(12, config.layout.sequence_bits);
//! # }
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The epoch used by the classic snowflake layout: 2010-11-04T01:42:54.657Z.
pub const DEFAULT_EPOCH: u64 = 1_288_834_974_657;

/// The bit widths and epoch of an identifier layout.
///
/// This is the unvalidated input to [`IdentifierLayout::new`](crate::IdentifierLayout::new). The default matches the
/// classic snowflake layout: 41 timestamp bits, 5 datacenter bits, 5 worker bits, and 12 sequence bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LayoutConfig {
    /// The reference instant in milliseconds since the Unix epoch.
    pub epoch: u64,
    /// Bits dedicated to the number of milliseconds since the epoch.
    pub timestamp_bits: u32,
    /// Bits dedicated to the datacenter ID.
    pub datacenter_bits: u32,
    /// Bits dedicated to the worker ID.
    pub worker_bits: u32,
    /// Bits dedicated to the per-millisecond sequence number.
    pub sequence_bits: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            epoch: DEFAULT_EPOCH,
            timestamp_bits: 41,
            datacenter_bits: 5,
            worker_bits: 5,
            sequence_bits: 12,
        }
    }
}

/// What a generator does when the clock reports a time before the last issuance.
///
/// None of these policies ever produces a duplicate or non-monotonic identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RollbackPolicy {
    /// Fail the call with [`Error::ClockRollback`](crate::Error::ClockRollback) and keep the generator usable.
    ///
    /// Calls succeed again as soon as the clock has caught up with the last issuance.
    #[default]
    Reject,
    /// Fail the call and halt the generator.
    ///
    /// Every subsequent call returns [`Error::Halted`](crate::Error::Halted). Recovering requires constructing a new
    /// generator once the clock has been corrected.
    Halt,
    /// Wait for the clock to catch up if it fell behind by at most `max_drift_ms` milliseconds.
    ///
    /// Larger drifts, or clocks that don't catch up in time, fail like [`Reject`](Self::Reject). The wait happens
    /// while holding the generator's state, so concurrent callers wait as well.
    Wait {
        /// The largest drift the generator waits out.
        max_drift_ms: u64,
    },
}

/// Everything a host needs to construct a [`Generator`](crate::Generator) with the system clock.
///
/// The node identity has to be unique across all processes sharing an identifier space. Assigning it is the host's
/// responsibility; snowstamp only validates that it fits into the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeneratorConfig {
    /// The datacenter this process runs in.
    pub datacenter_id: u64,
    /// The worker ID of this process within its datacenter.
    pub worker_id: u64,
    /// The identifier layout shared by the whole deployment.
    pub layout: LayoutConfig,
    /// How to react to clock rollbacks.
    pub rollback: RollbackPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let layout = LayoutConfig::default();
        assert_eq!(
            63,
            layout.timestamp_bits + layout.datacenter_bits + layout.worker_bits + layout.sequence_bits
        );
        assert_eq!(DEFAULT_EPOCH, layout.epoch);
        assert_eq!(RollbackPolicy::Reject, GeneratorConfig::default().rollback);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_partial() {
        let config: GeneratorConfig = serde_json::from_str(
            r#"{
                "worker_id": 9,
                "layout": { "epoch": 1672531200000, "sequence_bits": 10 },
                "rollback": { "wait": { "max_drift_ms": 4 } }
            }"#,
        )
        .unwrap();
        assert_eq!(0, config.datacenter_id);
        assert_eq!(9, config.worker_id);
        assert_eq!(1672531200000, config.layout.epoch);
        assert_eq!(41, config.layout.timestamp_bits);
        assert_eq!(10, config.layout.sequence_bits);
        assert_eq!(RollbackPolicy::Wait { max_drift_ms: 4 }, config.rollback);

        let config: GeneratorConfig = serde_json::from_str(r#"{ "rollback": "halt" }"#).unwrap();
        assert_eq!(RollbackPolicy::Halt, config.rollback);
    }
}
