/// Primary key of a row in the `connections` table.
///
/// Also the key of the in-memory live-handle map.
pub type ConnectionId = i64;

/// Primary key of a row in the `crons` table.
///
/// The dynamic result table of a cron is named after this id
/// (`cron_<id>`), so it is never reused once allocated.
pub type CronId = i64;
