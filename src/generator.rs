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

//! The thread-safe identifier generator.

use crate::{
    Clock, Components, ConfigurationError, Error, GeneratedId, GeneratorConfig, IdentifierLayout, Result,
    RollbackPolicy, SystemClock,
};
#[cfg(all(feature = "lock-free", loom))]
use loom::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "blocking")]
use parking_lot::Mutex;
#[cfg(all(feature = "lock-free", not(loom)))]
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{hint, thread};
use tracing::{debug, error, trace, warn};

/// How long a generator waits for the next millisecond after exhausting the sequence of the current one.
pub const DEFAULT_EXHAUSTION_WAIT: Duration = Duration::from_millis(5);

// Busy-waiting threads yield to the scheduler after this many spins
const SPINS_PER_YIELD: u32 = 64;

// Packed lock-free state words. Valid words are `timestamp_offset << sequence_bits | sequence`, which never exceeds
// 63 bits, so words with the top bit set are free to use as sentinels.
#[cfg(feature = "lock-free")]
const STATE_UNUSED: u64 = u64::MAX;
#[cfg(feature = "lock-free")]
const STATE_FAILED: u64 = u64::MAX - 1;

/// The lifecycle state of a [`Generator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorStatus {
    /// The generator issues identifiers.
    Ready,
    /// The generator halted after a clock rollback under [`RollbackPolicy::Halt`].
    ///
    /// This state is terminal. Every call returns [`Error::Halted`].
    Failed,
}

/// The synchronization primitive guarding a generator's state.
///
/// Both guards provide the same guarantees. The blocking guard holds a lock for the whole issuance, including any
/// wait for the clock. The lock-free guard packs the state into one atomic word and commits it with a CAS loop, so a
/// suspended thread can never block other callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// A [`parking_lot::Mutex`] around the state.
    #[cfg(feature = "blocking")]
    #[cfg_attr(docsrs, doc(cfg(feature = "blocking")))]
    Blocking,
    /// A compare-and-swap loop over a packed atomic state word.
    #[cfg(feature = "lock-free")]
    #[cfg_attr(docsrs, doc(cfg(feature = "lock-free")))]
    LockFree,
}

impl Default for Guard {
    /// Returns the blocking guard if the `blocking` feature is enabled, and the lock-free guard otherwise.
    fn default() -> Self {
        #[cfg(feature = "blocking")]
        {
            Guard::Blocking
        }
        #[cfg(not(feature = "blocking"))]
        {
            Guard::LockFree
        }
    }
}

#[cfg(feature = "blocking")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeneratorState {
    Unused,
    Issued { last_timestamp_ms: u64, sequence: u64 },
    Failed,
}

#[derive(Debug)]
enum State {
    #[cfg(feature = "blocking")]
    Blocking(Mutex<GeneratorState>),
    #[cfg(feature = "lock-free")]
    LockFree(AtomicU64),
}

/// A thread-safe generator of unique, time-ordered identifiers.
///
/// Every generator embeds its node identity (datacenter ID and worker ID) into the identifiers it issues. As long as
/// every process sharing an identifier space uses a distinct pair, identifiers never collide, without any coordination
/// between the processes. Within one generator, identifiers are strictly increasing as long as the clock doesn't go
/// backwards.
///
/// Cloning a generator returns another handle to the *same* state, so one generator can be shared by many threads.
/// Construct exactly one generator per node identity and pass it to whatever needs identifiers.
///
/// # Example
///
/// ```
/// use snowstamp::{Generator, IdentifierLayout, SystemClock};
/// use std::thread;
///
/// // The node identity usually comes from the deployment's configuration
/// let generator = Generator::new(IdentifierLayout::default(), 1, 7, SystemClock).unwrap();
///
/// let res1 = {
///     let generator = generator.clone();
///     thread::spawn(move || generator.generate().unwrap())
/// };
/// let res2 = {
///     let generator = generator.clone();
///     thread::spawn(move || generator.generate().unwrap())
/// };
/// let (id1, id2) = (res1.join().unwrap(), res2.join().unwrap());
/// assert_ne!(id1, id2);
/// assert_eq!(7, generator.decompose(id1).worker_id);
/// ```
#[derive(Debug)]
pub struct Generator<C = SystemClock>
where
    C: Clock,
{
    layout: IdentifierLayout,
    datacenter_id: u64,
    worker_id: u64,
    rollback: RollbackPolicy,
    exhaustion_wait: Duration,
    clock: C,
    state: Arc<State>,
}

impl<C> Clone for Generator<C>
where
    C: Clock + Clone,
{
    fn clone(&self) -> Self {
        Self {
            layout: self.layout,
            datacenter_id: self.datacenter_id,
            worker_id: self.worker_id,
            rollback: self.rollback,
            exhaustion_wait: self.exhaustion_wait,
            clock: self.clock.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl Generator<SystemClock> {
    /// Creates a generator that uses the system clock from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the layout is invalid or the node identity doesn't fit into it.
    ///
    /// # Example
    ///
    /// ```
    /// use snowstamp::{ConfigurationError, Generator, GeneratorConfig};
    ///
    /// let config = GeneratorConfig {
    ///     datacenter_id: 2,
    ///     worker_id: 32,
    ///     ..GeneratorConfig::default()
    /// };
    /// assert_eq!(
    ///     ConfigurationError::WorkerIdOutOfRange { worker_id: 32, max: 31 },
    ///     Generator::from_config(&config).unwrap_err()
    /// );
    /// ```
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, ConfigurationError> {
        let layout = IdentifierLayout::new(config.layout)?;
        Ok(Self::new(layout, config.datacenter_id, config.worker_id, SystemClock)?.rollback_policy(config.rollback))
    }
}

impl<C> Generator<C>
where
    C: Clock,
{
    /// Creates a generator for the given node identity using the default [`Guard`].
    ///
    /// The generator starts without any issued identifier, so its first identifier has the sequence number `0`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DatacenterIdOutOfRange`] or [`ConfigurationError::WorkerIdOutOfRange`] if the
    /// node identity doesn't fit into the layout.
    pub fn new(layout: IdentifierLayout, datacenter_id: u64, worker_id: u64, clock: C) -> Result<Self, ConfigurationError> {
        Self::with_guard(layout, datacenter_id, worker_id, clock, Guard::default())
    }

    /// Creates a generator for the given node identity using the given [`Guard`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DatacenterIdOutOfRange`] or [`ConfigurationError::WorkerIdOutOfRange`] if the
    /// node identity doesn't fit into the layout.
    pub fn with_guard(
        layout: IdentifierLayout,
        datacenter_id: u64,
        worker_id: u64,
        clock: C,
        guard: Guard,
    ) -> Result<Self, ConfigurationError> {
        if datacenter_id > layout.max_datacenter_id() {
            return Err(ConfigurationError::DatacenterIdOutOfRange {
                datacenter_id,
                max: layout.max_datacenter_id(),
            });
        }
        if worker_id > layout.max_worker_id() {
            return Err(ConfigurationError::WorkerIdOutOfRange {
                worker_id,
                max: layout.max_worker_id(),
            });
        }
        let state = match guard {
            #[cfg(feature = "blocking")]
            Guard::Blocking => State::Blocking(Mutex::new(GeneratorState::Unused)),
            #[cfg(feature = "lock-free")]
            Guard::LockFree => State::LockFree(AtomicU64::new(STATE_UNUSED)),
        };
        debug!(datacenter_id, worker_id, ?guard, ?layout, "created identifier generator");
        Ok(Self {
            layout,
            datacenter_id,
            worker_id,
            rollback: RollbackPolicy::default(),
            exhaustion_wait: DEFAULT_EXHAUSTION_WAIT,
            clock,
            state: Arc::new(state),
        })
    }

    /// Sets how this handle reacts to clock rollbacks.
    ///
    /// The policy belongs to the handle. Clones made before this call keep their previous policy.
    pub fn rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback = policy;
        self
    }

    /// Sets how long this handle waits for the next millisecond once the current one's sequence is exhausted.
    ///
    /// If the clock doesn't advance in time, issuance fails with [`Error::SequenceExhausted`]. Defaults to
    /// [`DEFAULT_EXHAUSTION_WAIT`].
    pub fn exhaustion_wait(mut self, wait: Duration) -> Self {
        self.exhaustion_wait = wait;
        self
    }

    /// Returns the layout of the identifiers this generator issues.
    #[inline]
    pub fn layout(&self) -> &IdentifierLayout {
        &self.layout
    }

    /// Returns the datacenter ID embedded into every identifier.
    #[inline]
    pub fn datacenter_id(&self) -> u64 {
        self.datacenter_id
    }

    /// Returns the worker ID embedded into every identifier.
    #[inline]
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Returns the guard protecting this generator's state.
    pub fn guard(&self) -> Guard {
        match &*self.state {
            #[cfg(feature = "blocking")]
            State::Blocking(_) => Guard::Blocking,
            #[cfg(feature = "lock-free")]
            State::LockFree(_) => Guard::LockFree,
        }
    }

    /// Returns whether this generator still issues identifiers.
    pub fn status(&self) -> GeneratorStatus {
        let failed = match &*self.state {
            #[cfg(feature = "blocking")]
            State::Blocking(state) => *state.lock() == GeneratorState::Failed,
            #[cfg(feature = "lock-free")]
            State::LockFree(state) => state.load(Ordering::Acquire) == STATE_FAILED,
        };
        if failed {
            GeneratorStatus::Failed
        } else {
            GeneratorStatus::Ready
        }
    }

    /// Splits an identifier into its components under this generator's layout.
    #[inline]
    pub fn decompose(&self, id: GeneratedId) -> Components {
        self.layout.decompose(id.get())
    }

    /// Issues a new identifier as a non-negative signed integer.
    ///
    /// This is [`generate`](Self::generate) for hosts that store identifiers in signed 64-bit columns.
    ///
    /// # Errors
    ///
    /// See [`generate`](Self::generate).
    #[inline]
    pub fn get_id(&self) -> Result<i64> {
        self.generate().map(|id| id.get_i64())
    }

    /// Issues a new identifier.
    ///
    /// The identifier is guaranteed to be unique and greater than every identifier previously issued by this
    /// generator. Reading the clock, comparing it with the last issuance, and updating the state happen as one atomic
    /// step, regardless of the generator's [`Guard`].
    ///
    /// If the current millisecond's sequence is exhausted, this waits for the clock to reach the next millisecond.
    ///
    /// # Errors
    ///
    /// If the clock went backwards, this returns [`Error::ClockRollback`] unless the [`RollbackPolicy`] allows waiting
    /// for the clock to catch up. Under [`RollbackPolicy::Halt`], the generator then fails permanently and returns
    /// [`Error::Halted`] from now on. If the clock precedes the layout's epoch, this returns
    /// [`Error::ClockBeforeEpoch`]; if the time since the epoch no longer fits into the layout, this returns
    /// [`Error::TimestampExhausted`]. If the clock doesn't advance while waiting for the next millisecond, this
    /// returns [`Error::SequenceExhausted`].
    pub fn generate(&self) -> Result<GeneratedId> {
        let id = match &*self.state {
            #[cfg(feature = "blocking")]
            State::Blocking(state) => self.generate_blocking(state)?,
            #[cfg(feature = "lock-free")]
            State::LockFree(state) => self.generate_lock_free(state)?,
        };
        Ok(GeneratedId::new_unchecked(id))
    }

    #[cfg(feature = "blocking")]
    fn generate_blocking(&self, state: &Mutex<GeneratorState>) -> Result<u64> {
        let mut state = state.lock();
        // The clock is read inside `next_slot`, i.e. *after* acquiring the lock, so a reading older than the last
        // issuance is a genuine rollback
        let last = match *state {
            GeneratorState::Unused => None,
            GeneratorState::Issued {
                last_timestamp_ms,
                sequence,
            } => Some((last_timestamp_ms, sequence)),
            GeneratorState::Failed => return Err(Error::Halted),
        };
        let (timestamp_ms, sequence) = match self.next_slot(last) {
            Ok(slot) => slot,
            Err(e) => {
                if self.halts_on(&e) {
                    *state = GeneratorState::Failed;
                }
                return Err(e);
            }
        };
        let timestamp_offset = self.timestamp_offset(timestamp_ms)?;
        *state = GeneratorState::Issued {
            last_timestamp_ms: timestamp_ms,
            sequence,
        };
        Ok(self
            .layout
            .compose(timestamp_offset, self.datacenter_id, self.worker_id, sequence))
    }

    #[cfg(feature = "lock-free")]
    fn generate_lock_free(&self, state: &AtomicU64) -> Result<u64> {
        // A stale value here only makes the CAS below fail and retry with the value it observed. The clock is read
        // after this load, so a reading older than the loaded issuance is a genuine rollback.
        let mut current = state.load(Ordering::Acquire);
        loop {
            if current == STATE_FAILED {
                return Err(Error::Halted);
            }
            let (timestamp_ms, sequence) = match self.next_slot(self.unpack(current)) {
                Ok(slot) => slot,
                Err(e) => {
                    if self.halts_on(&e) {
                        state.store(STATE_FAILED, Ordering::Release);
                    }
                    return Err(e);
                }
            };
            let timestamp_offset = self.timestamp_offset(timestamp_ms)?;
            let next = (timestamp_offset << self.layout.sequence_bits()) | sequence;
            match state.compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    return Ok(self
                        .layout
                        .compose(timestamp_offset, self.datacenter_id, self.worker_id, sequence))
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Unpacks a lock-free state word into the last issuance's Unix timestamp and sequence number.
    #[cfg(feature = "lock-free")]
    fn unpack(&self, word: u64) -> Option<(u64, u64)> {
        if word == STATE_UNUSED {
            return None;
        }
        let timestamp_offset = word >> self.layout.sequence_bits();
        // Offsets were computed by subtracting the epoch, so adding it back can't overflow
        Some((
            timestamp_offset + self.layout.epoch(),
            word & self.layout.max_sequence(),
        ))
    }

    /// Determines the timestamp and sequence number of the next identifier, given the last issuance.
    fn next_slot(&self, last: Option<(u64, u64)>) -> Result<(u64, u64)> {
        let mut now = self.clock.now_millis();
        let (last_timestamp_ms, last_sequence) = match last {
            Some(last) => last,
            None => return Ok((now, 0)),
        };
        if now < last_timestamp_ms {
            now = self.recover_rollback(last_timestamp_ms, now)?;
        }
        if now > last_timestamp_ms {
            return Ok((now, 0));
        }
        if last_sequence < self.layout.max_sequence() {
            return Ok((now, last_sequence + 1));
        }
        trace!(timestamp_ms = last_timestamp_ms, "sequence exhausted, waiting for the next millisecond");
        match self.wait_for_clock(last_timestamp_ms + 1, self.exhaustion_wait) {
            Some(now) => Ok((now, 0)),
            None => Err(Error::SequenceExhausted {
                timestamp_ms: last_timestamp_ms,
            }),
        }
    }

    /// Applies the rollback policy. Returns a clock reading that's at least `last_timestamp_ms` on recovery.
    #[cold]
    fn recover_rollback(&self, last_timestamp_ms: u64, observed_ms: u64) -> Result<u64> {
        let drift_ms = last_timestamp_ms - observed_ms;
        if let RollbackPolicy::Wait { max_drift_ms } = self.rollback {
            if drift_ms <= max_drift_ms {
                debug!(drift_ms, "clock moved backwards, waiting for it to catch up");
                let limit = Duration::from_millis(drift_ms.saturating_add(1));
                if let Some(now) = self.wait_for_clock(last_timestamp_ms, limit) {
                    return Ok(now);
                }
            }
        }
        warn!(drift_ms, last_timestamp_ms, observed_ms, "clock moved backwards");
        Err(Error::ClockRollback {
            drift_ms,
            last_timestamp_ms,
            observed_ms,
            halted: self.rollback == RollbackPolicy::Halt,
        })
    }

    /// Returns whether the given error moves this generator into its terminal state.
    fn halts_on(&self, err: &Error) -> bool {
        let halts = matches!(err, Error::ClockRollback { halted: true, .. });
        if halts {
            error!(%err, datacenter_id = self.datacenter_id, worker_id = self.worker_id, "generator halted");
        }
        halts
    }

    /// Busy-waits until the clock reports at least `at_least`, giving up after `limit` of real time.
    ///
    /// The clock is always read after checking the deadline, so the last reading is never older than the deadline.
    fn wait_for_clock(&self, at_least: u64, limit: Duration) -> Option<u64> {
        let start = Instant::now();
        let mut spins = 0u32;
        loop {
            let expired = start.elapsed() >= limit;
            let now = self.clock.now_millis();
            if now >= at_least {
                return Some(now);
            }
            if expired {
                return None;
            }
            spins = spins.wrapping_add(1);
            if spins % SPINS_PER_YIELD == 0 {
                thread::yield_now();
            } else {
                hint::spin_loop();
            }
        }
    }

    /// Converts a Unix timestamp into an offset that fits into this generator's layout.
    fn timestamp_offset(&self, timestamp_ms: u64) -> Result<u64> {
        let timestamp_offset = timestamp_ms
            .checked_sub(self.layout.epoch())
            .ok_or(Error::ClockBeforeEpoch {
                now_ms: timestamp_ms,
                epoch_ms: self.layout.epoch(),
            })?;
        if timestamp_offset > self.layout.max_timestamp() {
            return Err(Error::TimestampExhausted {
                timestamp_offset,
                max: self.layout.max_timestamp(),
            });
        }
        Ok(timestamp_offset)
    }
}
