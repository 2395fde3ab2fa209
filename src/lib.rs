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

//! This crate generates compact, time-ordered, unique 64-bit identifiers for distributed systems.
//!
//! Identifiers consist of a timestamp (with millisecond precision), the issuing node's datacenter ID and worker ID,
//! and a sequence number that allows a node to issue multiple identifiers in the same millisecond. As every node
//! embeds its own identity, processes with distinct `(datacenter ID, worker ID)` pairs can issue identifiers without
//! any coordination and still never collide. Within one [`Generator`], identifiers are strictly increasing.
//!
//! The bit widths of the segments and the epoch are configured at runtime with an [`IdentifierLayout`]. The default
//! layout uses 41 bits for the timestamp, 5 bits each for the datacenter ID and the worker ID, and 12 bits for the
//! sequence number. The most significant bit is always `0`, so identifiers can be stored as signed 64-bit integers.
//!
//! Assigning node identities is up to the host application. There isn't a single "valid" way to do this, as it
//! depends on how you deploy your application; common approaches include static deployment configuration and IDs
//! handed out by an orchestrator. Snowstamp only validates that the identity fits into the layout.
//!
//! # Clock rollbacks
//!
//! If the wall clock moves backwards, a generator never issues a duplicate or smaller identifier. By default, it
//! fails with [`Error::ClockRollback`] until the clock has caught up. Other behaviours can be chosen with
//! [`RollbackPolicy`].
//!
//! # Example
//!
//! ```
//! use snowstamp::{Generator, GeneratorConfig, LayoutConfig};
//!
//! let config = GeneratorConfig {
//!     datacenter_id: 1,
//!     worker_id: 3,
//!     layout: LayoutConfig {
//!         // The first millisecond of 2023
//!         epoch: 1672531200000,
//!         ..LayoutConfig::default()
//!     },
//!     ..GeneratorConfig::default()
//! };
//! let generator = Generator::from_config(&config).unwrap();
//!
//! let first = generator.generate().unwrap();
//! let second = generator.generate().unwrap();
//! assert!(first < second);
//!
//! let components = generator.decompose(second);
//! assert_eq!(1, components.datacenter_id);
//! assert_eq!(3, components.worker_id);
//!
//! // Hosts that store identifiers in signed columns can use `get_id`
//! assert!(generator.get_id().unwrap() > second.get_i64());
//! ```
//!
//! # Features
//!
//! * `blocking` (default): the [`Guard::Blocking`] guard, a `parking_lot` mutex around the generator state.
//! * `lock-free` (default): the [`Guard::LockFree`] guard, a compare-and-swap loop over a packed atomic state word.
//! * `serde`: `Serialize`/`Deserialize` for identifiers, components, and configuration types.

#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(any(feature = "blocking", feature = "lock-free")))]
compile_error!("you must enable at least one generator implementation (blocking or lock-free)");

mod clock;
mod config;
mod error;
mod generator;
mod id;
mod layout;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{GeneratorConfig, LayoutConfig, RollbackPolicy, DEFAULT_EPOCH};
pub use crate::error::{ConfigurationError, Error, Result};
pub use crate::generator::{Generator, GeneratorStatus, Guard, DEFAULT_EXHAUSTION_WAIT};
pub use crate::id::GeneratedId;
pub use crate::layout::{Components, IdentifierLayout};
