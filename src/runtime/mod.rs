//! # Runtime
//!
//! Process bring-up and the controller manager.

pub mod error_policy;
pub mod initialization;
pub mod manager;

pub use initialization::{initialize, InitializationResult};
