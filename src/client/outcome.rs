//! Operation options and outcomes

/// Sentinel the legacy tri-state `run` contract used for "no connection"
pub const NO_CONNECTION_SENTINEL: &str = "-999";

/// Which cursor executes a statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowShape {
    /// Plain cursor: rows as positional sequences
    #[default]
    Tuple,
    /// Dictionary cursor: rows as column-name to value maps
    Dict,
}

/// Per-call execution options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Cursor to execute on
    pub shape: RowShape,
    /// Block in the reconnect loop when the connection is gone
    pub reconnect: bool,
}

impl ExecOptions {
    /// Plain cursor, no reconnect
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain cursor, reconnect on connection loss
    pub fn reconnecting() -> Self {
        Self {
            reconnect: true,
            ..Self::default()
        }
    }

    /// Select the cursor
    pub fn shape(mut self, shape: RowShape) -> Self {
        self.shape = shape;
        self
    }

    /// Execute on the dictionary cursor
    pub fn dict(self) -> Self {
        self.shape(RowShape::Dict)
    }

    /// Enable or disable reconnect
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Result of [`ResilientSession::run`](crate::ResilientSession::run)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Statement executed
    Success,
    /// Statement failed; the transaction was rolled back
    Failed {
        /// SQLSTATE, if the driver reported one
        code: Option<String>,
    },
    /// The connection died and reconnect was not requested
    ConnectionLost {
        /// SQLSTATE, if the driver reported one
        code: Option<String>,
    },
    /// The connection died, the session reconnected, the statement did not run
    Reconnected,
    /// No connection and reconnect was not requested; nothing was sent
    NoConnection,
}

impl RunOutcome {
    /// Whether the statement ran
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }

    /// SQLSTATE of a failure
    pub fn code(&self) -> Option<&str> {
        match self {
            RunOutcome::Failed { code } | RunOutcome::ConnectionLost { code } => code.as_deref(),
            _ => None,
        }
    }

    /// Legacy string contract: `"0"` on success, the vendor code on failure,
    /// `"-999"` without a connection
    ///
    /// Failures without a code render as an empty string.
    pub fn legacy_code(&self) -> String {
        match self {
            RunOutcome::Success => "0".to_string(),
            RunOutcome::NoConnection => NO_CONNECTION_SENTINEL.to_string(),
            RunOutcome::Reconnected => String::new(),
            RunOutcome::Failed { code } | RunOutcome::ConnectionLost { code } => {
                code.clone().unwrap_or_default()
            }
        }
    }
}

/// Result of a bulk copy
///
/// Both `copy_from` and `copy_expert` use this one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Load failed (rolled back, or connection lost without reconnect)
    Failed,
    /// Load committed
    Committed {
        /// Rows loaded
        rows: u64,
    },
    /// Connection was lost and re-established; the payload was not resubmitted
    Reconnected,
}

impl CopyOutcome {
    /// Numeric contract: failed = 0, committed = 1, reconnected-not-retried = 2
    pub fn as_code(&self) -> i32 {
        match self {
            CopyOutcome::Failed => 0,
            CopyOutcome::Committed { .. } => 1,
            CopyOutcome::Reconnected => 2,
        }
    }

    /// Whether the load committed
    pub fn is_committed(&self) -> bool {
        matches!(self, CopyOutcome::Committed { .. })
    }
}

/// Options for [`ResilientSession::copy_from`](crate::ResilientSession::copy_from)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    /// Column delimiter (default tab)
    pub delimiter: char,
    /// NULL marker (default `\N`)
    pub null: String,
    /// Target columns; empty means all columns in table order
    pub columns: Vec<String>,
    /// Block in the reconnect loop when the connection is gone
    pub reconnect: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            null: "\\N".to_string(),
            columns: Vec::new(),
            reconnect: false,
        }
    }
}

impl CopyOptions {
    /// Set the delimiter
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the NULL marker
    pub fn null(mut self, null: impl Into<String>) -> Self {
        self.null = null.into();
        self
    }

    /// Set target columns
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable reconnect
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Build the `COPY ... FROM STDIN` command for `table`
    pub fn to_sql(&self, table: &str) -> String {
        let columns = if self.columns.is_empty() {
            String::new()
        } else {
            format!(" ({})", self.columns.join(", "))
        };
        format!(
            "COPY {}{} FROM STDIN WITH (FORMAT text, DELIMITER {}, NULL {})",
            table,
            columns,
            quote_literal(&self.delimiter.to_string()),
            quote_literal(&self.null)
        )
    }
}

/// Quote a string literal, using the `E''` form when backslashes are present
fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_codes() {
        assert_eq!(RunOutcome::Success.legacy_code(), "0");
        assert_eq!(RunOutcome::NoConnection.legacy_code(), "-999");
        assert_eq!(
            RunOutcome::Failed {
                code: Some("42P01".into())
            }
            .legacy_code(),
            "42P01"
        );
    }

    #[test]
    fn test_copy_outcome_codes() {
        assert_eq!(CopyOutcome::Failed.as_code(), 0);
        assert_eq!(CopyOutcome::Committed { rows: 4 }.as_code(), 1);
        assert_eq!(CopyOutcome::Reconnected.as_code(), 2);
    }

    #[test]
    fn test_default_copy_sql() {
        let sql = CopyOptions::default().to_sql("staging.sales");
        assert_eq!(
            sql,
            "COPY staging.sales FROM STDIN WITH (FORMAT text, DELIMITER '\t', NULL E'\\\\N')"
        );
    }

    #[test]
    fn test_copy_sql_with_columns_and_delimiter() {
        let sql = CopyOptions::default()
            .delimiter('|')
            .null("")
            .columns(["id", "amount"])
            .to_sql("sales");
        assert_eq!(
            sql,
            "COPY sales (id, amount) FROM STDIN WITH (FORMAT text, DELIMITER '|', NULL '')"
        );
    }

    #[test]
    fn test_quote_literal_doubles_quotes() {
        assert_eq!(quote_literal("'"), "''''");
    }

    #[test]
    fn test_exec_options_builders() {
        let opts = ExecOptions::reconnecting().dict();
        assert!(opts.reconnect);
        assert_eq!(opts.shape, RowShape::Dict);
        assert_eq!(ExecOptions::new(), ExecOptions::default());
    }
}
