//! Common types for the data-service workspace

mod error;

pub use error::{Error, Result};
