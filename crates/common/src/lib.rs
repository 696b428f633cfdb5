//! Common utilities and types shared across the federation monitor crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
