//! Testing utilities for unit and integration tests
//!
//! Provides:
//! - ScriptedOperation: replays a fixed sequence of outcomes
//! - Recording doubles for every injectable collaborator
//! - Descriptor builders and latency assertions

pub mod doubles;
pub mod helpers;

pub use doubles::*;
pub use helpers::*;
