//! Column-oriented event table.
//!
//! The tabular representation of an event log: one row per event, with the
//! three required columns (`case_id`, `activity`, `time:timestamp`) plus any
//! number of categorical or numerical attribute columns. This is the input
//! contract of the encoder; the XES parser that produces it in a full
//! deployment is an external collaborator.

use crate::error::{DestilarError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Required column: case identifier.
pub const CASE_ID: &str = "case_id";
/// Required column: activity label.
pub const ACTIVITY: &str = "activity";
/// Required column: event timestamp.
pub const TIMESTAMP: &str = "time:timestamp";

/// A single typed column of the event table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    /// String-valued attribute (also used for case ids and activities).
    Categorical(Vec<String>),
    /// Float-valued attribute.
    Numerical(Vec<f64>),
    /// Event timestamps.
    Timestamp(Vec<DateTime<Utc>>),
}

impl Column {
    /// Number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            Column::Categorical(v) => v.len(),
            Column::Numerical(v) => v.len(),
            Column::Timestamp(v) => v.len(),
        }
    }

    /// True if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            Column::Categorical(_) => "categorical",
            Column::Numerical(_) => "numerical",
            Column::Timestamp(_) => "timestamp",
        }
    }
}

/// Summary statistics for a loaded event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    /// Distinct case count.
    pub num_cases: usize,
    /// Total event count.
    pub num_events: usize,
    /// Mean events per case.
    pub events_per_case: f64,
    /// Attribute columns beyond the three required ones.
    pub attributes: Vec<String>,
}

/// An event log as an ordered set of equal-length named columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventTable {
    columns: Vec<(String, Column)>,
}

impl EventTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, validating the row count against existing columns.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if let Some((_, first)) = self.columns.first() {
            if first.len() != column.len() {
                return Err(DestilarError::ColumnLengthMismatch {
                    column: name,
                    expected: first.len(),
                    actual: column.len(),
                });
            }
        }
        self.columns.push((name, column));
        Ok(())
    }

    /// Builder-style variant of [`push_column`](Self::push_column).
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.push_column(name, column)?;
        Ok(self)
    }

    /// Number of events (rows).
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Look up a column, failing with `MissingColumn` if absent.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| DestilarError::MissingColumn {
            column: name.to_string(),
        })
    }

    /// The `case_id` column as strings.
    pub fn case_ids(&self) -> Result<&[String]> {
        self.categorical(CASE_ID)
    }

    /// The `activity` column as strings.
    pub fn activities(&self) -> Result<&[String]> {
        self.categorical(ACTIVITY)
    }

    /// The `time:timestamp` column.
    pub fn timestamps(&self) -> Result<&[DateTime<Utc>]> {
        match self.require(TIMESTAMP)? {
            Column::Timestamp(v) => Ok(v),
            other => Err(DestilarError::schema(format!(
                "column '{TIMESTAMP}' is {}, expected timestamp",
                other.kind()
            ))),
        }
    }

    /// A named categorical column.
    pub fn categorical(&self, name: &str) -> Result<&[String]> {
        match self.require(name)? {
            Column::Categorical(v) => Ok(v),
            other => Err(DestilarError::schema(format!(
                "column '{name}' is {}, expected categorical",
                other.kind()
            ))),
        }
    }

    /// A named numerical column.
    pub fn numerical(&self, name: &str) -> Result<&[f64]> {
        match self.require(name)? {
            Column::Numerical(v) => Ok(v),
            other => Err(DestilarError::schema(format!(
                "column '{name}' is {}, expected numerical",
                other.kind()
            ))),
        }
    }

    /// Summary statistics in the shape the analyst sees after upload.
    pub fn stats(&self) -> Result<LogStats> {
        let case_ids = self.case_ids()?;
        let num_events = self.num_rows();
        let mut distinct: Vec<&String> = case_ids.iter().collect();
        distinct.sort();
        distinct.dedup();
        let num_cases = distinct.len();

        let attributes = self
            .columns
            .iter()
            .map(|(n, _)| n.clone())
            .filter(|n| n != CASE_ID && n != ACTIVITY && n != TIMESTAMP)
            .collect();

        Ok(LogStats {
            num_cases,
            num_events,
            events_per_case: if num_cases == 0 {
                0.0
            } else {
                num_events as f64 / num_cases as f64
            },
            attributes,
        })
    }

    /// Load an event table from a headered CSV file.
    ///
    /// Minimal ingestion for the CLI: comma-separated, no quoting. The three
    /// required columns must be present. `time:timestamp` is parsed as
    /// RFC 3339; any other column whose values all parse as `f64` becomes
    /// numerical, the rest stay categorical (`case_id` and `activity` are
    /// always categorical).
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DestilarError::io(format!("reading {}", path.display()), e))?;
        Self::from_csv_str(&content)
    }

    /// Parse CSV content; see [`from_csv`](Self::from_csv).
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header: Vec<String> = lines
            .next()
            .ok_or(DestilarError::EmptyTable)?
            .split(',')
            .map(|h| h.trim().to_string())
            .collect();

        for required in [CASE_ID, ACTIVITY, TIMESTAMP] {
            if !header.iter().any(|h| h == required) {
                return Err(DestilarError::MissingColumn {
                    column: required.to_string(),
                });
            }
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); header.len()];
        for (row, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != header.len() {
                return Err(DestilarError::schema(format!(
                    "row {} has {} fields, expected {}",
                    row + 1,
                    fields.len(),
                    header.len()
                )));
            }
            for (col, field) in fields.iter().enumerate() {
                cells[col].push((*field).to_string());
            }
        }
        if cells.first().is_none_or(|c| c.is_empty()) {
            return Err(DestilarError::EmptyTable);
        }

        let mut table = EventTable::new();
        for (name, values) in header.into_iter().zip(cells) {
            let column = if name == TIMESTAMP {
                let mut stamps = Vec::with_capacity(values.len());
                for v in &values {
                    let ts = DateTime::parse_from_rfc3339(v).map_err(|e| {
                        DestilarError::schema(format!("bad timestamp '{v}': {e}"))
                    })?;
                    stamps.push(ts.with_timezone(&Utc));
                }
                Column::Timestamp(stamps)
            } else if name != CASE_ID
                && name != ACTIVITY
                && values.iter().all(|v| v.parse::<f64>().is_ok())
            {
                Column::Numerical(values.iter().map(|v| v.parse().unwrap_or(0.0)).collect())
            } else {
                Column::Categorical(values)
            };
            table.push_column(name, column)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn sample_table() -> EventTable {
        EventTable::new()
            .with_column(
                CASE_ID,
                Column::Categorical(vec!["c1".into(), "c1".into(), "c2".into()]),
            )
            .and_then(|t| {
                t.with_column(
                    ACTIVITY,
                    Column::Categorical(vec!["A".into(), "B".into(), "A".into()]),
                )
            })
            .and_then(|t| t.with_column(TIMESTAMP, Column::Timestamp(vec![ts(0), ts(1), ts(2)])))
            .and_then(|t| t.with_column("amount", Column::Numerical(vec![1.0, 2.0, 3.0])))
            .expect("valid table")
    }

    #[test]
    fn test_required_accessors() {
        let table = sample_table();
        assert_eq!(table.case_ids().unwrap(), &["c1", "c1", "c2"]);
        assert_eq!(table.activities().unwrap(), &["A", "B", "A"]);
        assert_eq!(table.timestamps().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_column_is_named() {
        let table = EventTable::new();
        let err = table.case_ids().unwrap_err();
        match err {
            DestilarError::MissingColumn { column } => assert_eq!(column, CASE_ID),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_column_type_is_schema_error() {
        let table = EventTable::new()
            .with_column(CASE_ID, Column::Numerical(vec![1.0]))
            .unwrap();
        assert!(matches!(
            table.case_ids(),
            Err(DestilarError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_column_length_mismatch_rejected() {
        let result = EventTable::new()
            .with_column(CASE_ID, Column::Categorical(vec!["c1".into()]))
            .unwrap()
            .with_column(ACTIVITY, Column::Categorical(vec!["A".into(), "B".into()]));
        assert!(matches!(
            result,
            Err(DestilarError::ColumnLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_stats() {
        let stats = sample_table().stats().unwrap();
        assert_eq!(stats.num_cases, 2);
        assert_eq!(stats.num_events, 3);
        assert!((stats.events_per_case - 1.5).abs() < 1e-9);
        assert_eq!(stats.attributes, vec!["amount".to_string()]);
    }

    #[test]
    fn test_from_csv_str() {
        let csv = "\
case_id,activity,time:timestamp,resource,amount
c1,A,2024-01-01T00:00:00Z,alice,10.5
c1,B,2024-01-01T00:01:00Z,bob,11.0
c2,A,2024-01-01T00:02:00Z,alice,9.0
";
        let table = EventTable::from_csv_str(csv).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.categorical("resource").unwrap()[1], "bob");
        assert_eq!(table.numerical("amount").unwrap()[2], 9.0);
    }

    #[test]
    fn test_from_csv_missing_required_column() {
        let csv = "case_id,activity\nc1,A\n";
        let err = EventTable::from_csv_str(csv).unwrap_err();
        match err {
            DestilarError::MissingColumn { column } => assert_eq!(column, TIMESTAMP),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let table = sample_table();
        let json = serde_json::to_string(&table).unwrap();
        let back: EventTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.num_rows(), table.num_rows());
        assert_eq!(back.activities().unwrap(), table.activities().unwrap());
    }
}
