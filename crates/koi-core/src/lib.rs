//! Shared data model, canonical encoding, error taxonomy, and environment
//! parsing for the KOI-net mesh node. Every other `koi-*` crate depends on
//! this one rather than on each other for these cross-cutting concerns.

pub mod canonical;
pub mod env;
pub mod error;
pub mod model;

pub use error::{Error, Result};
pub use model::*;
