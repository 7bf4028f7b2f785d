//! `grognon-store`: the durable metadata store.
//!
//! A single SQLite file holds connection records, cron definitions, the
//! reflected schema cache, and per-cron output schemas. One physical table
//! per cron (`cron_<id>`) lives in the same file and is created by
//! `grognon-crons`.
//!
//! All subsystems share one [`Store`] handle. Multi-statement invariants go
//! through [`Store::transaction`].

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::Store;
