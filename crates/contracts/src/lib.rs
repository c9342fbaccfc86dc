//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Trace records are stamped with UTC wall-clock time at creation
//! - Delivery order is a dispatcher property, never derived from timestamps

mod config;
mod error;
mod record;
mod sink;

pub use config::*;
pub use error::*;
pub use record::{Severity, TraceRecord};
pub use sink::*;
