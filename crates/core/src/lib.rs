//! Core errors, constants and configuration for the `unwound` workspace.
//!
//! The scoped resource machinery itself lives in `unwound-scope`; this crate
//! only carries the ambient pieces every other crate shares.
//!
//! ## Key Components
//!
//! - **`errors`**: the `Error` enum and `Result` alias used for configuration
//!   and process setup, outside any protected call.
//! - **`config`**: environment-driven `Config` with its `ConfigSource`.
//! - **`constants`**: environment variable names and defaults.

pub mod config;
pub mod constants;
pub mod errors;

pub use self::{
    config::{Config, ConfigSource},
    constants::*,
    errors::{Error, Result, ResultExt},
};
