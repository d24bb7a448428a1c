//! # Travio Queue
//!
//! Virtual waiting room for high-demand events.
//!
//! Users join a per-event FIFO; one admission worker per event releases a
//! batch every interval, minting a single-use ticket for each admitted user.
//! The gateway refuses protected purchase paths without a valid ticket.
//!
//! ## Example
//!
//! ```rust,ignore
//! use travio_queue::*;
//!
//! let controller = AdmissionController::new(store, SystemClock, QueueSettings::default());
//! controller
//!     .configure(QueueConfig::for_event("concert").with_batch_size(50))
//!     .await?;
//!
//! let outcome = controller.join("concert", "user-1", "session-1").await?;
//! println!("position {}", outcome.position);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod providers;
pub mod stores;

// Mock store (for testing)
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::{QueueConfig, QueueSettings};
pub use controller::{AdmissionController, IDLE_TICKS, mint_ticket};
pub use error::{QueueError, Result};
pub use model::{Admitted, EntryStatus, JoinOutcome, JoinStatus, QueueEntry, QueueStats, Ticket};
pub use providers::QueueStore;
