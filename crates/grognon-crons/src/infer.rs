use std::time::Duration;

use grognon_connections::{LiveHandle, QueryOutput};
use tracing::debug;

use crate::error::{CronError, InferenceError, Result};
use crate::types::{CellValue, ColumnType, OutputColumn};

/// Run `command` once on `handle` and infer its output schema.
///
/// The whole result is buffered; inference looks at every row.
pub fn infer_command(
    handle: &LiveHandle,
    command: &str,
    timeout: Option<Duration>,
) -> Result<Vec<OutputColumn>> {
    let output = handle.query(command, timeout)?;
    debug!(
        connection_id = handle.connection_id(),
        rows = output.rows.len(),
        columns = output.columns.len(),
        "inference probe returned"
    );
    Ok(infer(&output)?)
}

/// Infer one canonical type per column from a buffered result.
///
/// Every value of every row must be non-null and of one consistent kind;
/// columns are returned in query order.
pub fn infer(output: &QueryOutput) -> std::result::Result<Vec<OutputColumn>, InferenceError> {
    if output.rows.is_empty() {
        return Err(InferenceError::EmptyResult);
    }

    output
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let mut inferred: Option<ColumnType> = None;
            for (r, row) in output.rows.iter().enumerate() {
                let found = match row.get(i).map(CellValue::from_value) {
                    None | Some(Ok(None)) => {
                        return Err(InferenceError::NullValue {
                            column: column.clone(),
                            row: r,
                        })
                    }
                    Some(Err(kind)) => {
                        return Err(InferenceError::UnknownType {
                            column: column.clone(),
                            kind: kind.to_string(),
                        })
                    }
                    Some(Ok(Some(value))) => value.column_type(),
                };
                match inferred {
                    None => inferred = Some(found),
                    Some(expected) if expected != found => {
                        return Err(InferenceError::MixedTypes {
                            column: column.clone(),
                            expected,
                            found,
                        })
                    }
                    Some(_) => {}
                }
            }
            // rows is non-empty, so every column saw at least one value
            let column_type = inferred.ok_or(InferenceError::EmptyResult)?;
            Ok(OutputColumn::new(column.clone(), column_type))
        })
        .collect()
}

/// Convert one row of a scheduled run, checking it against the frozen
/// schema. NULL is stored as NULL; any other value must match its
/// column's type.
pub(crate) fn conform_row(
    cron_id: grognon_core::CronId,
    columns: &[OutputColumn],
    row: &[rusqlite::types::Value],
) -> Result<Vec<Option<CellValue>>> {
    columns
        .iter()
        .zip(row)
        .map(|(col, raw)| {
            let cell = CellValue::from_value(raw).map_err(|kind| CronError::Execution {
                id: cron_id,
                reason: format!("column {} returned unsupported type {kind}", col.name),
            })?;
            match cell {
                Some(ref value) if value.column_type() != col.column_type => {
                    Err(CronError::Execution {
                        id: cron_id,
                        reason: format!(
                            "column {} returned {} but the table stores {}",
                            col.name,
                            value.column_type(),
                            col.column_type
                        ),
                    })
                }
                _ => Ok(cell),
            }
        })
        .collect()
}
