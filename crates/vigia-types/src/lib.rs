//! Shared domain types for the Vigia recognition client.

pub mod config;
pub mod detection;
pub mod events;
pub mod geometry;
pub mod protocol;

mod errors;

pub use errors::{Result, VigiaError};
