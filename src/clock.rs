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

//! Clock sources used by generators to timestamp identifiers.

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// A source of wall-clock time in milliseconds since the Unix epoch.
///
/// Generators read their clock once per identifier (and repeatedly while waiting for the next millisecond), so
/// implementations should be cheap. Clocks are allowed to go backwards; generators detect this and never issue a
/// non-monotonic identifier.
///
/// # Example
///
/// ```
/// use snowstamp::Clock;
///
/// struct FixedTime;
///
/// impl Clock for FixedTime {
///     fn now_millis(&self) -> u64 {
///         1672531200000
///     }
/// }
///
/// assert_eq!(1672531200000, FixedTime.now_millis());
/// ```
pub trait Clock {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    #[inline]
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

impl<C> Clock for &C
where
    C: Clock + ?Sized,
{
    #[inline]
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// The system's wall clock.
///
/// Times before the Unix epoch are reported as `0`; generators then fail with
/// [`Error::ClockBeforeEpoch`](crate::Error::ClockBeforeEpoch) for any realistic epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_millis(&self) -> u64 {
        match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
            Ok(elapsed) => u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            Err(_) => 0,
        }
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and pass another to a generator. This makes it possible
/// to freeze time, advance it, or simulate the wall clock moving backwards.
///
/// # Example
///
/// ```
/// use snowstamp::{Clock, ManualClock};
///
/// let clock = ManualClock::new(100);
/// let handle = clock.clone();
/// handle.advance(5);
/// assert_eq!(105, clock.now_millis());
/// handle.rewind(10);
/// assert_eq!(95, clock.now_millis());
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at the given millisecond.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Sets the clock to the given millisecond.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Moves the clock forward.
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Moves the clock backwards.
    pub fn rewind(&self, millis: u64) {
        self.millis.fetch_sub(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn system_clock() {
        // 2023-01-01, so this only fails if the system clock is badly wrong
        assert!(SystemClock.now_millis() > 1672531200000);
    }

    #[test]
    fn manual_clock() {
        let clock = ManualClock::new(10);
        let shared = Arc::new(clock.clone());
        clock.set(20);
        assert_eq!(20, shared.now_millis());
        assert_eq!(20, (&clock).now_millis());
    }
}
