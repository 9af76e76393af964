//! # fieldkit Common Library
//!
//! Shared building blocks for the fieldkit engine:
//! - Quiescence counter (busy barrier for asynchronous field work)
//! - Process queue (ordered key → value scheduling structure)
//! - Canonical field values
//! - Event types (EngineEvent enum) and EventBus
//! - Configuration loading
//! - Error types

pub mod config;
pub mod error;
pub mod events;
pub mod process_queue;
pub mod quiescence;
pub mod value;

pub use error::{Error, Result};
pub use process_queue::{Placement, ProcessQueue};
pub use quiescence::{BusyGuard, QuiescenceCounter};
pub use value::FieldValue;
