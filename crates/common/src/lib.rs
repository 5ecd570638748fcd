//! Shared types for the Exact Online login workspace
//!
//! Holds the redacting `Secret` wrapper, the mutable `Settings` the host
//! application owns, and the configuration error type.

mod error;
mod secret;
pub mod settings;

pub use error::{Error, Result};
pub use secret::Secret;
pub use settings::{Settings, SharedSettings};
