//! Shared setup for the Bulwark binaries

pub mod common;
