//! `grognon-connections`: live handles to external sources and the
//! reflected schema cache.
//!
//! # Overview
//!
//! A connection row is always persisted when an operator registers a
//! source; the [`registry::ConnectionRegistry`] only holds a
//! [`handle::LiveHandle`] for it once a connect + probe succeeded. The
//! [`reflect::SchemaReflector`] snapshots each source's tables and columns
//! into the `tables` / `columns` cache, replacing the previous snapshot in
//! one transaction.
//!
//! | Source kind | Connection URL                 |
//! |-------------|--------------------------------|
//! | `sqlite`    | Path to an existing SQLite file |

pub mod error;
pub mod handle;
pub mod reflect;
pub mod registry;
pub mod types;

pub use error::{ConnectionError, Result};
pub use handle::{LiveHandle, QueryOutput};
pub use reflect::SchemaReflector;
pub use registry::ConnectionRegistry;
pub use types::{ColumnMetadata, Connection, NewConnection, SourceKind, TableMetadata};
