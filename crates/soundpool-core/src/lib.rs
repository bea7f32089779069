//! # soundpool-core
//!
//! Core types and error handling shared by the soundpool playback engine.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Hardware ceiling on simultaneously playing streams, system-wide.
pub const MAX_CHANNELS: usize = 24;
