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

//! Error types returned when configuring a [`Generator`](crate::Generator) or issuing identifiers.

/// The primary result type of snowstamp.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that occur while validating an [`IdentifierLayout`](crate::IdentifierLayout) or a node identity.
///
/// These errors are fatal at construction time. A host process shouldn't start issuing identifiers with a
/// misconfigured generator, and retrying the construction with the same configuration will always fail again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// The layout's segments don't fit into 63 bits.
    ///
    /// One bit is always reserved so that identifiers remain non-negative when stored as signed 64-bit integers.
    #[error("layout needs {total} bits, but only 64 are available (including the reserved sign bit)")]
    BitWidthOverflow {
        /// The number of bits the layout requires, including the reserved sign bit.
        total: u32,
    },
    /// The layout doesn't dedicate any bits to the timestamp.
    #[error("layout must dedicate at least one bit to the timestamp")]
    ZeroTimestampBits,
    /// The datacenter ID doesn't fit into the layout's datacenter segment.
    #[error("datacenter ID {datacenter_id} exceeds the maximum of {max}")]
    DatacenterIdOutOfRange {
        /// The rejected datacenter ID.
        datacenter_id: u64,
        /// The largest datacenter ID supported by the layout.
        max: u64,
    },
    /// The worker ID doesn't fit into the layout's worker segment.
    #[error("worker ID {worker_id} exceeds the maximum of {max}")]
    WorkerIdOutOfRange {
        /// The rejected worker ID.
        worker_id: u64,
        /// The largest worker ID supported by the layout.
        max: u64,
    },
}

/// Errors that can occur when generating or using a [`GeneratedId`](crate::GeneratedId).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The generator's configuration is invalid.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    /// The clock reported a millisecond that precedes the last issued identifier.
    ///
    /// The generator never masks this by producing a duplicate or non-monotonic identifier. Depending on the
    /// generator's [`RollbackPolicy`](crate::RollbackPolicy), retrying after the clock has caught up may succeed.
    #[error(
        "the clock moved backwards by {drift_ms} ms (last issuance at {last_timestamp_ms}, observed {observed_ms}){}",
        halt_note(.halted)
    )]
    ClockRollback {
        /// How far the observed time lies behind the last issuance, in milliseconds.
        drift_ms: u64,
        /// The millisecond of the last issued identifier (Unix time).
        last_timestamp_ms: u64,
        /// The millisecond reported by the clock (Unix time).
        observed_ms: u64,
        /// Whether this rollback moved the generator into its terminal state.
        ///
        /// Set under [`RollbackPolicy::Halt`](crate::RollbackPolicy::Halt). Every later call returns
        /// [`Error::Halted`].
        halted: bool,
    },
    /// The clock reported a time before the layout's epoch.
    #[error("the clock reading {now_ms} precedes the epoch {epoch_ms}")]
    ClockBeforeEpoch {
        /// The millisecond reported by the clock (Unix time).
        now_ms: u64,
        /// The layout's epoch (Unix time).
        epoch_ms: u64,
    },
    /// The time since the epoch no longer fits into the layout's timestamp segment.
    ///
    /// Unlike [`SequenceExhausted`](Self::SequenceExhausted), this error indicates that it won't be possible to
    /// generate identifiers with this layout in the future.
    #[error("timestamp offset {timestamp_offset} exceeds the layout's maximum of {max}")]
    TimestampExhausted {
        /// The offset that didn't fit.
        timestamp_offset: u64,
        /// The largest offset supported by the layout.
        max: u64,
    },
    /// The sequence of the current millisecond is exhausted and the clock didn't advance within the wait bound.
    ///
    /// With a working clock source, this error never surfaces, as the generator waits for the next millisecond. It
    /// indicates a stalled clock.
    #[error("sequence exhausted at {timestamp_ms} and the clock didn't advance")]
    SequenceExhausted {
        /// The millisecond whose sequence is exhausted (Unix time).
        timestamp_ms: u64,
    },
    /// The generator halted after an unrecovered clock rollback and won't issue identifiers anymore.
    #[error("the generator halted after a clock rollback")]
    Halted,
    /// A string couldn't be parsed as an identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

fn halt_note(halted: &bool) -> &'static str {
    if *halted {
        ", generator halted"
    } else {
        ""
    }
}

impl Error {
    /// Returns whether retrying the failed operation later might succeed.
    ///
    /// Clock rollbacks that didn't halt the generator and sequence exhaustion are transient. All other errors require
    /// operator intervention or a new configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ClockRollback { halted: false, .. } | Error::SequenceExhausted { .. }
        )
    }
}
