//! Row shaping - result sets to raw row batches
//!
//! Each [`StatementKind`] reads a result set differently. Shaping yields one
//! batch of [`RawRow`]s per event to publish; empty batches are dropped so an
//! empty result set produces no event.

use crate::connector::QueryResult;
use crate::normalize::{RawRow, parse_int};
use crate::statement::StatementKind;

/// Column kept by [`StatementKind::SlaveDelay`]
pub const SECONDS_BEHIND_MASTER: &str = "Seconds_Behind_Master";

/// Split a result set into per-event row batches
///
/// Fails only when the result cannot be read as the requested kind.
pub fn shape(kind: StatementKind, result: &QueryResult) -> Result<Vec<Vec<RawRow>>, String> {
    let batches = match kind {
        StatementKind::SingleRow => result
            .rows
            .first()
            .map(|row| columns_as_fields(&result.columns, row))
            .into_iter()
            .collect(),
        StatementKind::TwoColumns => {
            let mut batch = Vec::with_capacity(result.rows.len());
            for (index, row) in result.rows.iter().enumerate() {
                if row.len() < 2 {
                    return Err(format!(
                        "two-columns statement returned {} column(s) in row {}",
                        row.len(),
                        index + 1
                    ));
                }
                batch.push(RawRow::new(cell(&row[0]), cell(&row[1])));
            }
            vec![batch]
        }
        StatementKind::MultipleRows => result
            .rows
            .iter()
            .map(|row| columns_as_fields(&result.columns, row))
            .collect(),
        StatementKind::SlaveDelay => {
            let delay = result.rows.first().and_then(|row| {
                result
                    .columns
                    .iter()
                    .position(|c| c == SECONDS_BEHIND_MASTER)
                    .and_then(|i| row.get(i))
                    .and_then(|value| value.as_deref())
                    .filter(|value| parse_int(value).is_some())
            });
            vec![
                delay
                    .map(|value| RawRow::new(SECONDS_BEHIND_MASTER, value))
                    .into_iter()
                    .collect(),
            ]
        }
    };

    Ok(batches
        .into_iter()
        .filter(|batch: &Vec<RawRow>| !batch.is_empty())
        .collect())
}

fn columns_as_fields(columns: &[String], row: &[Option<String>]) -> Vec<RawRow> {
    columns
        .iter()
        .zip(row)
        .map(|(name, value)| RawRow::new(name.clone(), cell(value)))
        .collect()
}

/// SQL NULL reads as an empty string
fn cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: &[&[Option<&str>]]) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        }
    }

    #[test]
    fn test_two_columns_collects_every_row() {
        let res = result(
            &["Variable_name", "Value"],
            &[
                &[Some("Threads_connected"), Some("5")],
                &[Some("Uptime"), Some("86400")],
            ],
        );

        let batches = shape(StatementKind::TwoColumns, &res).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![
                RawRow::new("Threads_connected", "5"),
                RawRow::new("Uptime", "86400")
            ]
        );
    }

    #[test]
    fn test_two_columns_needs_two_columns() {
        let res = result(&["Value"], &[&[Some("5")]]);
        assert!(shape(StatementKind::TwoColumns, &res).is_err());
    }

    #[test]
    fn test_single_row_uses_first_row_only() {
        let res = result(
            &["connections", "uptime"],
            &[&[Some("10"), Some("99")], &[Some("11"), Some("100")]],
        );

        let batches = shape(StatementKind::SingleRow, &res).unwrap();
        assert_eq!(
            batches,
            vec![vec![
                RawRow::new("connections", "10"),
                RawRow::new("uptime", "99")
            ]]
        );
    }

    #[test]
    fn test_multiple_rows_yields_batch_per_row() {
        let res = result(
            &["db", "tables"],
            &[&[Some("app"), Some("12")], &[Some("audit"), None]],
        );

        let batches = shape(StatementKind::MultipleRows, &res).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1], vec![RawRow::new("db", "audit"), RawRow::new("tables", "")]);
    }

    #[test]
    fn test_slave_delay_keeps_integer_lag() {
        let res = result(
            &["Slave_IO_Running", "Seconds_Behind_Master"],
            &[&[Some("Yes"), Some("3")]],
        );

        let batches = shape(StatementKind::SlaveDelay, &res).unwrap();
        assert_eq!(batches, vec![vec![RawRow::new(SECONDS_BEHIND_MASTER, "3")]]);
    }

    #[test]
    fn test_slave_delay_null_lag_yields_nothing() {
        let res = result(
            &["Slave_IO_Running", "Seconds_Behind_Master"],
            &[&[Some("No"), None]],
        );
        assert!(shape(StatementKind::SlaveDelay, &res).unwrap().is_empty());
    }

    #[test]
    fn test_empty_result_yields_nothing() {
        let res = QueryResult::default();
        for kind in [
            StatementKind::SingleRow,
            StatementKind::TwoColumns,
            StatementKind::MultipleRows,
            StatementKind::SlaveDelay,
        ] {
            assert!(shape(kind, &res).unwrap().is_empty(), "{kind}");
        }
    }
}
