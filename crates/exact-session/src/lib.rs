//! Exact Online authorization coordinator
//!
//! Ties the scripted browser login, the token endpoint and the API probe
//! together behind `Authorizer`, and keeps the host application's
//! `SharedSettings` up to date where the operation says so.
//!
//! Lifecycle:
//! 1. Host creates `SharedSettings` at startup and hands a clone to `Authorizer`
//! 2. `authorize()` logs in and returns tokens; the host stores them
//! 3. `authorized()` / `authorize_division()` probe `/Current/Me`
//! 4. `refresh_authorization()` renews tokens and writes them to settings
//!
//! Nothing here guards against concurrent calls: two overlapping refreshes
//! both write settings, last write wins.

pub mod authorizer;
pub mod error;

pub use authorizer::{Authorizer, PROBE_PATH};
pub use error::{Error, Result};
