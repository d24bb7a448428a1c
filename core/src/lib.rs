//! # Travio Core
//!
//! Shared vocabulary for the Travio transactional backbone.
//!
//! Every service crate in the workspace (identity, queue, rate limiting,
//! ingest, pricing) depends on this crate for the handful of types that
//! cross their boundaries:
//!
//! - [`error::ErrorKind`]: the transport-agnostic error taxonomy and its status mapping
//! - [`environment::Clock`]: injected time, so services stay deterministic under test
//! - [`event::Envelope`]: the wire shape of every event on the bus
//! - [`event_bus::EventBus`]: publish/subscribe with explicit acknowledgement
//!
//! Services never own each other's data. Collaborators are passed in at
//! construction time as trait-typed values.

pub mod error;
pub mod event;
pub mod event_bus;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::ErrorKind;

/// Environment module - injected dependencies shared by every service.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait for time-based operations.
    ///
    /// Services read the time through this trait instead of calling
    /// `Utc::now()` directly. Production code uses [`SystemClock`];
    /// tests use the fixed and manual clocks from `travio-testing`.
    ///
    /// # Examples
    ///
    /// ```
    /// use travio_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let now = clock.now();
    /// assert!(now.timestamp() > 0);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock implementation of [`Clock`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
        fn now(&self) -> DateTime<Utc> {
            (**self).now()
        }
    }
}
