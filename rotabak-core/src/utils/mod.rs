//! Utility modules for the core library.

pub mod errors;

pub use errors::{CoreError, Result};
