//! `grognon-core`: configuration, shared identifiers, and the top-level
//! error type used by every Grognon crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::GrognonConfig;
pub use error::{GrognonError, Result};
pub use types::{ConnectionId, CronId};
