use chrono::{DateTime, Duration, Utc};
use grognon_core::{ConnectionId, CronId};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::schedule::needs_to_run;

/// How often a cron may run. Each variant is a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Schedule {
    pub const ALL: [Schedule; 6] = [
        Schedule::Minute,
        Schedule::Hour,
        Schedule::Day,
        Schedule::Week,
        Schedule::Month,
        Schedule::Year,
    ];

    /// Calendar-naive interval: a month is 30 days, a year 365.
    pub fn interval(&self) -> Duration {
        match self {
            Schedule::Minute => Duration::minutes(1),
            Schedule::Hour => Duration::hours(1),
            Schedule::Day => Duration::days(1),
            Schedule::Week => Duration::days(7),
            Schedule::Month => Duration::days(30),
            Schedule::Year => Duration::days(365),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Schedule::Minute => "minute",
            Schedule::Hour => "hour",
            Schedule::Day => "day",
            Schedule::Week => "week",
            Schedule::Month => "month",
            Schedule::Year => "year",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "minute" => Ok(Schedule::Minute),
            "hour" => Ok(Schedule::Hour),
            "day" => Ok(Schedule::Day),
            "week" => Ok(Schedule::Week),
            "month" => Ok(Schedule::Month),
            "year" => Ok(Schedule::Year),
            other => Err(format!("unknown schedule: {other}")),
        }
    }
}

/// Canonical column type of a cron output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    /// SQL type keyword used in generated DDL and stored in `cron_outputs`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(ColumnType::Text),
            "INTEGER" => Ok(ColumnType::Integer),
            "REAL" => Ok(ColumnType::Real),
            other => Err(format!("unknown column type: {other}")),
        }
    }
}

/// A non-null scalar returned by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Text(_) => ColumnType::Text,
            CellValue::Integer(_) => ColumnType::Integer,
            CellValue::Real(_) => ColumnType::Real,
        }
    }

    /// Classify a raw SQLite value.
    ///
    /// `Ok(None)` is SQL NULL; `Err` carries the name of a kind that has no
    /// canonical column type.
    pub fn from_value(value: &Value) -> std::result::Result<Option<Self>, &'static str> {
        match value {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(CellValue::Integer(*i))),
            Value::Real(r) => Ok(Some(CellValue::Real(*r))),
            Value::Text(t) => Ok(Some(CellValue::Text(t.clone()))),
            Value::Blob(_) => Err("BLOB"),
        }
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            CellValue::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            CellValue::Text(t) => ToSqlOutput::Borrowed(ValueRef::Text(t.as_bytes())),
        })
    }
}

/// One inferred column: name + canonical type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl OutputColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A persisted output column of a cron; together they are the schema of
/// its result table, in `position` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronOutput {
    pub cron_id: CronId,
    pub position: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl CronOutput {
    pub fn column(&self) -> OutputColumn {
        OutputColumn::new(self.name.clone(), self.column_type)
    }
}

/// A persisted cron definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cron {
    pub id: CronId,
    pub connection_id: ConnectionId,
    pub name: String,
    /// SQL text run against the connection.
    pub command: String,
    pub schedule: Schedule,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Start of the most recent attempt, successful or not.
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Cron {
    pub fn needs_to_run(&self, now: DateTime<Utc>) -> bool {
        needs_to_run(self.schedule, self.last_run_at, now)
    }
}

/// Creation request coming from the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCron {
    pub connection_id: ConnectionId,
    pub name: String,
    pub command: String,
    pub schedule: Schedule,
}

/// Replacement name, command, and schedule for an existing cron.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronUpdate {
    pub name: String,
    pub command: String,
    pub schedule: Schedule,
}

/// One stored result row; `values` is aligned with the cron's outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronDataRow {
    pub timestamp: DateTime<Utc>,
    pub values: Vec<Option<CellValue>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_text_round_trip() {
        for schedule in Schedule::ALL {
            assert_eq!(schedule.to_string().parse::<Schedule>(), Ok(schedule));
        }
        assert!("fortnight".parse::<Schedule>().is_err());
    }

    #[test]
    fn column_type_text_round_trip() {
        for ty in [ColumnType::Text, ColumnType::Integer, ColumnType::Real] {
            assert_eq!(ty.as_sql().parse::<ColumnType>(), Ok(ty));
        }
        assert!("BLOB".parse::<ColumnType>().is_err());
    }

    #[test]
    fn classify_sqlite_values() {
        assert_eq!(CellValue::from_value(&Value::Null), Ok(None));
        assert_eq!(
            CellValue::from_value(&Value::Integer(5)),
            Ok(Some(CellValue::Integer(5)))
        );
        assert_eq!(
            CellValue::from_value(&Value::Real(1.5)).map(|v| v.map(|v| v.column_type())),
            Ok(Some(ColumnType::Real))
        );
        assert_eq!(
            CellValue::from_value(&Value::Text("x".into())),
            Ok(Some(CellValue::Text("x".into())))
        );
        assert_eq!(CellValue::from_value(&Value::Blob(vec![1])), Err("BLOB"));
    }

    #[test]
    fn cell_values_serialise_as_plain_json() {
        let row = vec![
            Some(CellValue::Integer(5)),
            Some(CellValue::Text("a".into())),
            None,
        ];
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"[5,"a",null]"#
        );
    }

    #[test]
    fn output_column_serialises_type_key() {
        let col = OutputColumn::new("n", ColumnType::Integer);
        assert_eq!(
            serde_json::to_value(&col).unwrap(),
            serde_json::json!({"name": "n", "type": "INTEGER"})
        );
    }
}
