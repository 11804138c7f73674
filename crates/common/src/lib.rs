//! Common utilities and types shared across systemcheck crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
