//! REST API layer.

pub mod server;

pub use server::router;
