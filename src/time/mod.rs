//! Time utilities for bounded blocking I/O.
//!
//! - [`deadline`]: [`Deadline`] tracks the remaining budget of a timeout
//!   across retries of the same logical operation.
//!
//! # Example
//!
//! ```
//! use greensocket::time::Deadline;
//! use std::time::Duration;
//!
//! let deadline = Deadline::after(Some(Duration::from_millis(100)));
//! assert!(!deadline.is_expired());
//! ```

pub mod deadline;

pub use deadline::Deadline;
