//! Session characteristics

use crate::Error;
use serde::{Deserialize, Serialize};

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// `READ UNCOMMITTED` (behaves as read committed in Postgres)
    ReadUncommitted,
    /// `READ COMMITTED`
    ReadCommitted,
    /// `REPEATABLE READ`
    RepeatableRead,
    /// `SERIALIZABLE`
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl std::str::FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "read uncommitted" => Ok(Self::ReadUncommitted),
            "read committed" => Ok(Self::ReadCommitted),
            "repeatable read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            _ => Err(Error::Config(format!(
                "invalid isolation level '{}': expected read committed, repeatable read, or serializable",
                s
            ))),
        }
    }
}

/// Session characteristics applied after every successful connect
///
/// `None` leaves the server default untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Commit every statement on its own (no implicit transaction)
    pub autocommit: bool,
    /// Default isolation level for new transactions
    pub isolation_level: Option<IsolationLevel>,
    /// Default read-only mode for new transactions
    pub read_only: Option<bool>,
    /// Default deferrable mode for new transactions
    pub deferrable: Option<bool>,
}

impl SessionOptions {
    /// Autocommit on, everything else default
    pub fn autocommit() -> Self {
        Self {
            autocommit: true,
            ..Self::default()
        }
    }

    /// Set isolation level
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Set read-only mode
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    /// Set deferrable mode
    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = Some(deferrable);
        self
    }

    /// `SET SESSION CHARACTERISTICS` statement, if any characteristic is set
    pub fn characteristics_sql(&self) -> Option<String> {
        let mut modes = Vec::new();
        if let Some(level) = self.isolation_level {
            modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
        }
        if let Some(read_only) = self.read_only {
            modes.push(if read_only { "READ ONLY" } else { "READ WRITE" }.to_string());
        }
        if let Some(deferrable) = self.deferrable {
            modes.push(if deferrable { "DEFERRABLE" } else { "NOT DEFERRABLE" }.to_string());
        }

        if modes.is_empty() {
            None
        } else {
            Some(format!(
                "SET SESSION CHARACTERISTICS AS TRANSACTION {}",
                modes.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_transactional() {
        let options = SessionOptions::default();
        assert!(!options.autocommit);
        assert_eq!(options.characteristics_sql(), None);
    }

    #[test]
    fn test_characteristics_sql() {
        let options = SessionOptions::autocommit()
            .isolation_level(IsolationLevel::Serializable)
            .read_only(true)
            .deferrable(true);
        assert_eq!(
            options.characteristics_sql().as_deref(),
            Some("SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY, DEFERRABLE")
        );
    }

    #[test]
    fn test_isolation_level_from_str() {
        assert_eq!(
            "repeatable_read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!(
            "READ COMMITTED".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert!("snapshot".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_deserialize_partial_options() {
        let options: SessionOptions =
            serde_json::from_str(r#"{"autocommit": true, "isolation_level": "serializable"}"#)
                .unwrap();
        assert!(options.autocommit);
        assert_eq!(options.isolation_level, Some(IsolationLevel::Serializable));
        assert_eq!(options.read_only, None);
    }
}
