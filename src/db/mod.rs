// src/db/mod.rs

//! Database connection handling for dbmig.
//!
//! The engine supports exactly one backend dialect at this revision:
//! SQLite via `rusqlite`. [`open`] is the sole entry point; it creates the
//! database file if absent (a fresh file with no changelog table is a
//! legitimate pre-first-migration state, not an error - see
//! [`crate::changelog::Changelog::installed`]).

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::debug;

/// Resolves a `--target` connection string to the SQLite file path it
/// names, or rejects it as an unsupported backend.
///
/// A bare path (`./db.sqlite`, `/var/lib/dbmig/db.sqlite`) or one prefixed
/// with the `sqlite:` scheme is accepted; any other `scheme://` prefix
/// (`postgres://`, `mysql://`, ...) names a backend this revision has no
/// dialect registered for.
fn resolve_sqlite_path(target: &str) -> Result<&str> {
    match target.find("://") {
        Some(pos) => {
            let scheme = &target[..pos];
            if scheme.eq_ignore_ascii_case("sqlite") || scheme.eq_ignore_ascii_case("file") {
                Ok(&target[pos + 3..])
            } else {
                Err(Error::UnsupportedBackend(scheme.to_string()))
            }
        }
        None => match target.strip_prefix("sqlite:") {
            Some(path) => Ok(path),
            None => Ok(target),
        },
    }
}

/// Opens (creating if necessary) the SQLite database named by `target`.
pub fn open(target: &str) -> Result<Connection> {
    let db_path = resolve_sqlite_path(target)?;
    debug!(db_path, "opening database");
    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn open_creates_database_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();
        drop(temp_file);

        let conn = open(&db_path).unwrap();
        drop(conn);
        assert!(std::path::Path::new(&db_path).exists());
    }

    #[test]
    fn open_is_idempotent() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        open(db_path).unwrap();
        open(db_path).unwrap();
    }

    #[test]
    fn open_accepts_sqlite_scheme_prefix() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();
        drop(temp_file);

        let conn = open(&format!("sqlite://{db_path}")).unwrap();
        drop(conn);
        assert!(std::path::Path::new(&db_path).exists());
    }

    #[test]
    fn open_rejects_unsupported_backend_scheme() {
        let err = open("postgres://user@localhost/mydb").unwrap_err();
        match err {
            Error::UnsupportedBackend(scheme) => assert_eq!(scheme, "postgres"),
            other => panic!("expected UnsupportedBackend, got {other:?}"),
        }
    }

    #[test]
    fn resolve_sqlite_path_strips_bare_scheme_colon() {
        assert_eq!(resolve_sqlite_path("sqlite:db.sqlite").unwrap(), "db.sqlite");
        assert_eq!(resolve_sqlite_path("db.sqlite").unwrap(), "db.sqlite");
    }
}
