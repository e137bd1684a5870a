//! pktforge core library
//!
//! This crate provides the error type and the fixed-width value types
//! shared by the pktforge packet codec and its command line front-end.

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
