//! `.pgpass` password file
//!
//! Format, one entry per line: `hostname:port:database:username:password`.
//! Any of the first four fields may be `*`. `\:` and `\\` escape a literal
//! colon or backslash. Lines starting with `#` are comments. The first
//! matching entry wins.

use crate::connection::ConnectionConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Parsed password file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgPass {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    host: String,
    port: String,
    database: String,
    user: String,
    password: String,
}

impl Entry {
    fn matches(&self, host: &str, port: &str, database: &str, user: &str) -> bool {
        field_matches(&self.host, host)
            && field_matches(&self.port, port)
            && field_matches(&self.database, database)
            && field_matches(&self.user, user)
    }
}

fn field_matches(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

impl PgPass {
    /// `PGPASSFILE` if set, otherwise `$HOME/.pgpass`
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PGPASSFILE") {
            return Some(PathBuf::from(path));
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".pgpass"))
    }

    /// Load a password file
    ///
    /// Returns `Ok(None)` when the file does not exist or, on unix, when it is
    /// readable by group or others (the file is then ignored, as libpq does).
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    "password file has group or world access; permissions should be u=rw (0600) or less"
                );
                return Ok(None);
            }
        }
        #[cfg(not(unix))]
        let _ = metadata;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map(Some)
    }

    /// Parse password file content
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let fields = split_fields(line)
                .map_err(|e| Error::Credentials(format!("line {}: {}", lineno + 1, e)))?;
            let [host, port, database, user, password]: [String; 5] = match fields.try_into() {
                Ok(fields) => fields,
                Err(_) => {
                    tracing::debug!(line = lineno + 1, "skipping malformed password file entry");
                    continue;
                }
            };

            entries.push(Entry {
                host,
                port,
                database,
                user,
                password,
            });
        }

        Ok(Self { entries })
    }

    /// First password matching the given parameters
    pub fn lookup(&self, host: &str, port: u16, database: &str, user: &str) -> Option<&str> {
        let port = port.to_string();
        self.entries
            .iter()
            .find(|entry| entry.matches(host, &port, database, user))
            .map(|entry| entry.password.as_str())
    }

    /// Lookup for a connection config; socket directories match as `localhost`
    pub fn lookup_for(&self, config: &ConnectionConfig) -> Option<&str> {
        let host = if config.is_unix_socket() {
            "localhost"
        } else {
            config.host.as_str()
        };
        self.lookup(host, config.port, &config.database, &config.user)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the file held no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a line on unescaped colons; the fifth field takes the rest of the line
fn split_fields(line: &str) -> std::result::Result<Vec<String>, &'static str> {
    let mut fields = Vec::with_capacity(5);
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => return Err("trailing backslash"),
            },
            ':' if fields.len() < 4 => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    Ok(fields)
}
