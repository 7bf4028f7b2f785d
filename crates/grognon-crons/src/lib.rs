//! `grognon-crons`: periodic SQL queries with typed, append-only results.
//!
//! # Overview
//!
//! Creating a cron runs its command once against the live source and infers
//! a column schema from the returned values ([`infer`]). A result table
//! `cron_<id>` is then created with a `timestamp` column followed by the
//! inferred columns ([`table::DynamicTableManager`]). The schema is frozen:
//! a later command change is only accepted when it infers the same schema.
//!
//! The [`engine::CronEngine`] sweeps all crons on a fixed tick, runs the due
//! ones, and appends their rows.
//!
//! # Schedules
//!
//! | Variant  | Interval |
//! |----------|----------|
//! | `minute` | 60 s     |
//! | `hour`   | 1 h      |
//! | `day`    | 24 h     |
//! | `week`   | 7 days   |
//! | `month`  | 30 days  |
//! | `year`   | 365 days |

pub mod engine;
pub mod error;
pub mod ident;
pub mod infer;
pub mod manager;
pub mod schedule;
pub mod table;
pub mod types;

pub use engine::{CronEngine, SweepReport};
pub use error::{CronError, InferenceError, Result};
pub use manager::CronManager;
pub use table::DynamicTableManager;
pub use types::{
    CellValue, ColumnType, Cron, CronDataRow, CronOutput, CronUpdate, NewCron, OutputColumn,
    Schedule,
};
