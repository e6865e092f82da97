//! Per-key stream coordination
//!
//! The registry hands every routing key to exactly one [`Coordinator`], which
//! runs the upstream call once and fans its output out to every request that
//! attaches, whenever it arrives.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<CoordinatorRegistry>
//!                     ┌─────────────────────────────┐
//!                     │ coordinators: HashMap<Key,  │
//!                     │   Arc<Coordinator> {        │
//!                     │     state, chunks,          │
//!                     │     subscribers: [mpsc::Tx] │
//!                     │   }                         │
//!                     │ >                           │
//!                     └──────────────┬──────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//!    [Upstream]                [Subscription]             [Subscription]
//!    stream.next()             catch-up + live            catch-up + live
//!         │                          │                          │
//!         └──► publish() ──► chunks.push + tx.send ──► HTTP body ──► client
//! ```
//!
//! # Lifecycle
//!
//! `Idle → Active → Finalizing → Completed → Retired` on success, and
//! `Idle → Active → Failed → Retired` on upstream failure. A completed
//! coordinator stays mapped for the retirement grace period so requests that
//! miss a not-yet-visible archive are still served by replay.
//!
//! # Zero-Copy Design
//!
//! Chunks are `bytes::Bytes`. The buffer and every subscriber queue hold
//! reference-counted handles to the same allocation.

pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod key;
pub mod store;

pub use config::CoordinatorConfig;
pub use entry::{Coordinator, CoordinatorState, CoordinatorStats};
pub use error::CoordinatorError;
pub use event::{StreamEvent, Subscription};
pub use key::{KeyDeriver, RoutingKey};
pub use store::CoordinatorRegistry;
