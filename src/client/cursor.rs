//! Result cursors

use super::outcome::RowShape;
use crate::driver::RowSet;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// One fetched row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    /// Positional values (plain cursor)
    Tuple(Vec<Value>),
    /// Column-name keyed values (dictionary cursor)
    Dict(Map<String, Value>),
}

impl Row {
    /// Value by column position (tuple rows only)
    pub fn get(&self, idx: usize) -> Option<&Value> {
        match self {
            Row::Tuple(values) => values.get(idx),
            Row::Dict(_) => None,
        }
    }

    /// Value by column name (dictionary rows only)
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Row::Tuple(_) => None,
            Row::Dict(map) => map.get(name),
        }
    }
}

/// Buffered result of the last statement run through this cursor
///
/// Lives inside the session's connection slot, so it is only reachable while
/// the connection is up.
#[derive(Debug)]
pub struct Cursor {
    shape: RowShape,
    columns: Arc<[String]>,
    rows: VecDeque<Vec<Value>>,
    rowcount: Option<u64>,
    has_result: bool,
}

impl Cursor {
    pub(crate) fn new(shape: RowShape) -> Self {
        Self {
            shape,
            columns: Arc::from(Vec::new()),
            rows: VecDeque::new(),
            rowcount: None,
            has_result: false,
        }
    }

    /// Row shape produced by this cursor
    pub fn shape(&self) -> RowShape {
        self.shape
    }

    /// Column names of the current result set
    pub fn description(&self) -> &[String] {
        &self.columns
    }

    /// Rows returned or affected by the last statement
    pub fn rowcount(&self) -> Option<u64> {
        self.rowcount
    }

    /// Rows still buffered
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn load(&mut self, set: RowSet) {
        self.has_result = set.has_columns();
        self.columns = Arc::from(set.columns);
        self.rows = set.rows.into();
        self.rowcount = Some(set.affected);
    }

    pub(crate) fn reset(&mut self) {
        self.columns = Arc::from(Vec::new());
        self.rows.clear();
        self.rowcount = None;
        self.has_result = false;
    }

    fn ensure_result(&self) -> Result<()> {
        if self.has_result {
            Ok(())
        } else {
            Err(Error::NoResults)
        }
    }

    fn shape_row(&self, values: Vec<Value>) -> Row {
        match self.shape {
            RowShape::Tuple => Row::Tuple(values),
            RowShape::Dict => Row::Dict(self.columns.iter().cloned().zip(values).collect()),
        }
    }

    /// Next row, or `None` when exhausted
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.ensure_result()?;
        Ok(self.rows.pop_front().map(|values| self.shape_row(values)))
    }

    /// Up to `n` rows
    pub fn fetch_many(&mut self, n: usize) -> Result<Vec<Row>> {
        self.ensure_result()?;
        let n = n.min(self.rows.len());
        let batch: Vec<_> = self.rows.drain(..n).collect();
        Ok(batch.into_iter().map(|values| self.shape_row(values)).collect())
    }

    /// All remaining rows
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.fetch_many(self.rows.len())
    }
}

/// Cursor decorator that logs every fetched row
///
/// Fetch errors are logged and returned unchanged.
#[derive(Debug)]
pub struct LoggingCursor<'a> {
    inner: &'a mut Cursor,
}

impl<'a> LoggingCursor<'a> {
    /// Wrap a cursor
    pub fn new(inner: &'a mut Cursor) -> Self {
        Self { inner }
    }

    /// Wrapped cursor
    pub fn inner(&mut self) -> &mut Cursor {
        &mut *self.inner
    }

    /// Next row, logged
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        match self.inner.fetch_one() {
            Ok(Some(row)) => {
                log_row(&row);
                Ok(Some(row))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::error!(error = %e, "fetch failed");
                Err(e)
            }
        }
    }

    /// Up to `n` rows, each logged
    pub fn fetch_many(&mut self, n: usize) -> Result<Vec<Row>> {
        let rows = self.inner.fetch_many(n).map_err(|e| {
            tracing::error!(error = %e, "fetch failed");
            e
        })?;
        rows.iter().for_each(log_row);
        Ok(rows)
    }

    /// All remaining rows, each logged
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let remaining = self.inner.remaining();
        self.fetch_many(remaining)
    }
}

fn log_row(row: &Row) {
    tracing::debug!(row = %serde_json::to_string(row).unwrap_or_default(), "fetched row");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RowSet {
        RowSet {
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec![json!(1), json!("alpha")],
                vec![json!(2), json!("beta")],
                vec![json!(3), Value::Null],
            ],
            affected: 3,
        }
    }

    #[test]
    fn test_fetch_before_execute_fails() {
        let mut cursor = Cursor::new(RowShape::Tuple);
        assert!(matches!(cursor.fetch_one(), Err(Error::NoResults)));
    }

    #[test]
    fn test_command_result_has_nothing_to_fetch() {
        let mut cursor = Cursor::new(RowShape::Tuple);
        cursor.load(RowSet::command(5));
        assert_eq!(cursor.rowcount(), Some(5));
        assert!(matches!(cursor.fetch_all(), Err(Error::NoResults)));
    }

    #[test]
    fn test_tuple_rows() {
        let mut cursor = Cursor::new(RowShape::Tuple);
        cursor.load(sample());
        assert_eq!(
            cursor.fetch_one().unwrap(),
            Some(Row::Tuple(vec![json!(1), json!("alpha")]))
        );
        assert_eq!(cursor.fetch_many(10).unwrap().len(), 2);
        assert_eq!(cursor.fetch_one().unwrap(), None);
    }

    #[test]
    fn test_dict_rows_by_column_name() {
        let mut cursor = Cursor::new(RowShape::Dict);
        cursor.load(sample());
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].field("name"), Some(&json!("beta")));
        assert_eq!(rows[2].field("name"), Some(&Value::Null));
        assert_eq!(
            serde_json::to_string(&rows[0]).unwrap(),
            r#"{"id":1,"name":"alpha"}"#
        );
    }

    #[test]
    fn test_reset_clears_results() {
        let mut cursor = Cursor::new(RowShape::Tuple);
        cursor.load(sample());
        cursor.reset();
        assert_eq!(cursor.rowcount(), None);
        assert!(cursor.description().is_empty());
        assert!(cursor.fetch_one().is_err());
    }

    #[test]
    fn test_logging_cursor_passes_rows_through() {
        let mut cursor = Cursor::new(RowShape::Tuple);
        cursor.load(sample());
        let mut logging = LoggingCursor::new(&mut cursor);
        assert!(logging.fetch_one().unwrap().is_some());
        assert_eq!(logging.fetch_many(1).unwrap().len(), 1);
        assert_eq!(logging.fetch_all().unwrap().len(), 1);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_logging_cursor_returns_fetch_errors() {
        let mut cursor = Cursor::new(RowShape::Dict);
        let mut logging = LoggingCursor::new(&mut cursor);
        assert!(matches!(logging.fetch_many(3), Err(Error::NoResults)));
    }
}
