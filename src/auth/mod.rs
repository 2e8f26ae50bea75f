//! Credential resolution
//!
//! Passwords are never required in code. Resolution order:
//! * explicit password in [`ConnectionConfig`]
//! * `PGPASSWORD` environment variable
//! * `.pgpass` file (`PGPASSFILE` or `~/.pgpass`)

mod pgpass;

pub use pgpass::PgPass;

use crate::connection::ConnectionConfig;

/// Resolve the password for `config`, if any source provides one
pub fn resolve_password(config: &ConnectionConfig) -> Option<String> {
    if let Some(password) = &config.password {
        return Some(password.clone());
    }

    if let Ok(password) = std::env::var("PGPASSWORD") {
        if !password.is_empty() {
            return Some(password);
        }
    }

    let path = PgPass::default_path()?;
    match PgPass::load(&path) {
        Ok(Some(pgpass)) => pgpass.lookup_for(config).map(str::to_string),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable password file");
            None
        }
    }
}
