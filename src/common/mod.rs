//! Common types shared across the custody backend.

pub mod error;

pub use error::{CustodyError, Result};
