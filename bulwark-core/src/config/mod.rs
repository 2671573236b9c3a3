//! Policy configuration
//!
//! Plain in-memory values handed to executor constructors. Types derive serde
//! so embedding applications can carry them inside their own settings;
//! durations are encoded as integer milliseconds.

pub mod profiles;
pub mod types;

pub use profiles::{ConfigProfile, ProfileName};
pub use types::*;
