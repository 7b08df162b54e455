//! Vidproc Types
//!
//! Shared type definitions for video records, trigger payloads, job
//! identifiers and the error taxonomy used across vidproc services.

pub mod error;
pub mod job;
pub mod record;
pub mod trigger;

pub use error::*;
pub use job::*;
pub use record::*;
pub use trigger::*;
