//! Stash Core
//!
//! Shared vocabulary for the stash CI cache: the error type, compression
//! modes and the object metadata reported by a store. Every other crate in
//! the workspace depends on this one.

pub mod cache;
pub mod error;

pub use cache::{CompressionMode, ObjectMetadata, ObjectSummary};
pub use error::{Error, Result};
