#![forbid(unsafe_code)]
//! aqlflow-mem: the per-query resource monitor.
//!
//! This crate provides the concrete implementation of the *interfaces* defined
//! in `aqlflow-core::budget`. Every item block and every executor that buffers
//! values reserves its bytes here, so the query fails instead of exceeding the
//! configured ceiling. Reservations are RAII guards: dropping one returns its
//! bytes on every exit path, including errors and panics.

pub mod error;
pub mod guard;
pub mod tracking;

pub use guard::{Reservation, ResourceMonitor};
pub use tracking::PeakTracker;
