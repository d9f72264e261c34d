//! Core contracts for keylock: errors, the environment capability, and the
//! binding record that ties a key to the artifact it last produced.
//! This crate carries no crypto so it stays cheap to depend on.

pub mod binding;
pub mod environment;
pub mod error;
pub mod identity;

pub use error::{LockError, Result};
