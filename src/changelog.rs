// src/changelog.rs

//! The persisted changelog: a totally-ordered, per-changeset sequence of
//! applied actions, used to compute the current version, reconstruct a
//! clean contiguous history, and plan a rollback. See spec §3 and §4.5.

use crate::error::{Error, Result};
use crate::semver::SemVer;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fmt;
use tracing::{debug, info};

/// The four things that can appear as a changelog row's action. Unlike
/// [`crate::action::ScriptAction`], `Override` is a member here: it is a
/// pseudo-action that only ever exists in the changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangelogAction {
    Install,
    Upgrade,
    Rollback,
    Override,
}

impl ChangelogAction {
    fn as_str(self) -> &'static str {
        match self {
            ChangelogAction::Install => "install",
            ChangelogAction::Upgrade => "upgrade",
            ChangelogAction::Rollback => "rollback",
            ChangelogAction::Override => "override",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "install" => Ok(ChangelogAction::Install),
            "upgrade" => Ok(ChangelogAction::Upgrade),
            "rollback" => Ok(ChangelogAction::Rollback),
            "override" => Ok(ChangelogAction::Override),
            other => Err(Error::Parse(format!("Unknown changelog action: {other}"))),
        }
    }
}

impl From<crate::action::ScriptAction> for ChangelogAction {
    fn from(a: crate::action::ScriptAction) -> Self {
        match a {
            crate::action::ScriptAction::Install => ChangelogAction::Install,
            crate::action::ScriptAction::Upgrade => ChangelogAction::Upgrade,
            crate::action::ScriptAction::Rollback => ChangelogAction::Rollback,
        }
    }
}

impl fmt::Display for ChangelogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the persisted changelog table.
#[derive(Debug, Clone)]
pub struct ChangelogRow {
    pub id: i64,
    pub script_path: String,
    pub action: ChangelogAction,
    pub from_version: Option<SemVer>,
    pub to_version: SemVer,
    pub sha256_hash: String,
    pub changed_by: String,
    pub time_taken_ms: i64,
}

/// A single step of a rollback plan: running it takes the database from
/// `from_version` to `to_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackStep {
    pub from_version: SemVer,
    pub to_version: SemVer,
    pub sha256_hash: String,
}

fn ensure_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS changelog (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            changeset       TEXT NOT NULL,
            applied         TEXT NOT NULL,
            decommissioned  TEXT,
            script_path     TEXT NOT NULL,
            action          TEXT NOT NULL,
            from_version    TEXT,
            to_version      TEXT NOT NULL,
            sha256_hash     TEXT NOT NULL,
            changed_by      TEXT NOT NULL,
            time_taken_ms   INTEGER NOT NULL
        );

        CREATE TRIGGER IF NOT EXISTS changelog_decommission_prior
        AFTER INSERT ON changelog
        BEGIN
            UPDATE changelog SET decommissioned = NEW.applied
            WHERE changeset = NEW.changeset AND id <> NEW.id AND decommissioned IS NULL;
        END;
        ",
    )?;
    Ok(())
}

fn fetch_rows(conn: &Connection, changeset: &str) -> Result<Vec<ChangelogRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, script_path, action, from_version, to_version, sha256_hash, changed_by, \
         time_taken_ms FROM changelog WHERE changeset = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![changeset], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(id, script_path, action, from_version, to_version, hash, changed_by, time_taken_ms)| {
            Ok(ChangelogRow {
                id,
                script_path,
                action: ChangelogAction::parse(&action)?,
                from_version: from_version.map(|s| SemVer::parse(&s)).transpose()?,
                to_version: SemVer::parse(&to_version)?,
                sha256_hash: hash,
                changed_by,
                time_taken_ms,
            })
        })
        .collect()
}

/// Scans `rows` (ascending) newest-first, cancelling each `rollback` row
/// against the non-rollback row immediately preceding it in that scan.
/// Returns the surviving rows back in chronological order. See spec §4.5.
fn skip_counter_filter(rows: &[ChangelogRow]) -> Vec<ChangelogRow> {
    let mut skip: i64 = 0;
    let mut kept_rev = Vec::new();
    for row in rows.iter().rev() {
        if row.action == ChangelogAction::Rollback {
            skip += 1;
            continue;
        }
        if skip > 0 {
            skip -= 1;
            continue;
        }
        kept_rev.push(row.clone());
    }
    kept_rev.reverse();
    kept_rev
}

/// An open changelog against one SQLite connection, scoped to one
/// changeset. Exclusively owns its connection; released when dropped.
pub struct Changelog {
    conn: Connection,
    changeset: String,
}

impl Changelog {
    pub fn open(conn: Connection, changeset: impl Into<String>) -> Self {
        Changelog {
            conn,
            changeset: changeset.into(),
        }
    }

    pub fn changeset(&self) -> &str {
        &self.changeset
    }

    /// Whether the changelog table exists yet. A fresh database with no
    /// table is a legitimate pre-first-migration state, not an error.
    pub fn installed(&self) -> Result<bool> {
        let exists: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'changelog'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    fn rows(&self) -> Result<Vec<ChangelogRow>> {
        if !self.installed()? {
            return Ok(Vec::new());
        }
        fetch_rows(&self.conn, &self.changeset)
    }

    /// `to_version` of the most recent row, or zero if none.
    pub fn version(&self) -> Result<SemVer> {
        Ok(self
            .rows()?
            .last()
            .map(|r| r.to_version.clone())
            .unwrap_or_else(SemVer::zero))
    }

    /// `from_version` of the most recent row, or zero if none/null.
    pub fn previous_version(&self) -> Result<SemVer> {
        Ok(self
            .rows()?
            .last()
            .and_then(|r| r.from_version.clone())
            .unwrap_or_else(SemVer::zero))
    }

    /// The window from the most recent install-or-override row (inclusive)
    /// to the end of history, chronological.
    fn history_window(&self) -> Result<Vec<ChangelogRow>> {
        let rows = self.rows()?;
        let boundary = rows
            .iter()
            .rposition(|r| matches!(r.action, ChangelogAction::Install | ChangelogAction::Override));
        Ok(match boundary {
            Some(idx) => rows[idx..].to_vec(),
            None => rows,
        })
    }

    /// Rows from the most recent install boundary to the current row,
    /// chronological, with `override` pseudo-rows filtered out. If
    /// `exclude_rolled_back`, rolled-back excursions are also filtered via
    /// the skip-counter algorithm.
    pub fn contiguous_history(&self, exclude_rolled_back: bool) -> Result<Vec<ChangelogRow>> {
        let window: Vec<ChangelogRow> = self
            .history_window()?
            .into_iter()
            .filter(|r| r.action != ChangelogAction::Override)
            .collect();
        if exclude_rolled_back {
            Ok(skip_counter_filter(&window))
        } else {
            Ok(window)
        }
    }

    /// The ordered list of [`RollbackStep`]s needed to return to `target`,
    /// or empty if `target` is not reachable within the current install
    /// boundary's window.
    pub fn rollback_steps(&self, target: &SemVer) -> Result<Vec<RollbackStep>> {
        let window = self.history_window()?;
        let mut skip: i64 = 0;
        let mut steps = Vec::new();
        for row in window.iter().rev() {
            if row.action == ChangelogAction::Rollback {
                skip += 1;
                continue;
            }
            if skip > 0 {
                skip -= 1;
                continue;
            }
            let landed_at = row.from_version.clone().unwrap_or_else(SemVer::zero);
            steps.push(RollbackStep {
                from_version: row.to_version.clone(),
                to_version: landed_at.clone(),
                sha256_hash: row.sha256_hash.clone(),
            });
            if &landed_at == target {
                return Ok(steps);
            }
        }
        Ok(Vec::new())
    }

    /// Forces the changelog to `v` without running any script. Creates the
    /// table first if absent.
    pub fn override_version(&mut self, v: &SemVer, changed_by: &str) -> Result<()> {
        ensure_table(&self.conn)?;
        let tx = self.conn.transaction()?;
        insert_row(
            &tx,
            &self.changeset,
            ChangelogAction::Override,
            None,
            v,
            "",
            &crate::script_stream::empty_string_hash(),
            changed_by,
            0,
        )?;
        tx.commit()?;
        info!(version = %v, "overrode changelog version");
        Ok(())
    }

    /// Opens a transaction for the migrate driver, ensuring the table
    /// exists first. The caller runs script statements and calls
    /// [`write`] against the same transaction before committing, so the
    /// schema change and its changelog row are atomic.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        ensure_table(&self.conn)?;
        Ok(self.conn.transaction()?)
    }
}

/// Inserts one changelog row against an open transaction. Does not commit.
#[allow(clippy::too_many_arguments)]
pub fn write(
    tx: &Transaction,
    changeset: &str,
    action: ChangelogAction,
    from_version: Option<&SemVer>,
    to_version: &SemVer,
    script_path: &str,
    sha256_hash: &str,
    changed_by: &str,
    time_taken_ms: i64,
) -> Result<()> {
    insert_row(
        tx,
        changeset,
        action,
        from_version,
        to_version,
        script_path,
        sha256_hash,
        changed_by,
        time_taken_ms,
    )
}

#[allow(clippy::too_many_arguments)]
fn insert_row(
    conn: &Connection,
    changeset: &str,
    action: ChangelogAction,
    from_version: Option<&SemVer>,
    to_version: &SemVer,
    script_path: &str,
    sha256_hash: &str,
    changed_by: &str,
    time_taken_ms: i64,
) -> Result<()> {
    let applied = Utc::now().to_rfc3339();
    debug!(changeset, action = %action, to_version = %to_version, "writing changelog row");
    conn.execute(
        "INSERT INTO changelog \
         (changeset, applied, script_path, action, from_version, to_version, sha256_hash, \
          changed_by, time_taken_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            changeset,
            applied,
            script_path,
            action.as_str(),
            from_version.map(|v| v.to_str()),
            to_version.to_str(),
            sha256_hash,
            changed_by,
            time_taken_ms,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_changelog() -> Changelog {
        let temp = NamedTempFile::new().unwrap();
        let conn = crate::db::open(temp.path().to_str().unwrap()).unwrap();
        std::mem::forget(temp); // keep file alive for the test's duration
        Changelog::open(conn, "default")
    }

    fn commit_row(
        cl: &mut Changelog,
        action: ChangelogAction,
        from: Option<&str>,
        to: &str,
        hash: &str,
    ) {
        let from_version = from.map(|s| SemVer::parse(s).unwrap());
        let to_version = SemVer::parse(to).unwrap();
        let tx = cl.transaction().unwrap();
        write(
            &tx,
            "default",
            action,
            from_version.as_ref(),
            &to_version,
            "some/path.sql",
            hash,
            "test",
            0,
        )
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn not_installed_until_first_write() {
        let cl = open_changelog();
        assert!(!cl.installed().unwrap());
        assert!(cl.version().unwrap().is_zero());
    }

    #[test]
    fn version_tracks_most_recent_row() {
        let mut cl = open_changelog();
        commit_row(&mut cl, ChangelogAction::Install, None, "1.0.0+script.1", "h1");
        assert!(cl.installed().unwrap());
        assert_eq!(cl.version().unwrap(), SemVer::script_version(1, 0, 0, 1));

        commit_row(
            &mut cl,
            ChangelogAction::Upgrade,
            Some("1.0.0+script.1"),
            "1.1.0+script.1",
            "h2",
        );
        assert_eq!(cl.version().unwrap(), SemVer::script_version(1, 1, 0, 1));
        assert_eq!(cl.previous_version().unwrap(), SemVer::script_version(1, 0, 0, 1));
    }

    #[test]
    fn contiguous_history_excludes_rolled_back_excursion() {
        let mut cl = open_changelog();
        commit_row(&mut cl, ChangelogAction::Install, None, "1.0.0+script.1", "h1");
        commit_row(
            &mut cl,
            ChangelogAction::Upgrade,
            Some("1.0.0+script.1"),
            "1.1.0+script.1",
            "h2",
        );
        commit_row(
            &mut cl,
            ChangelogAction::Rollback,
            Some("1.1.0+script.1"),
            "1.0.0+script.1",
            "h2",
        );

        let full = cl.contiguous_history(false).unwrap();
        assert_eq!(full.len(), 3);

        let clean = cl.contiguous_history(true).unwrap();
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].action, ChangelogAction::Install);
    }

    #[test]
    fn override_establishes_new_install_boundary() {
        let mut cl = open_changelog();
        commit_row(&mut cl, ChangelogAction::Install, None, "1.0.0+script.1", "h1");
        commit_row(
            &mut cl,
            ChangelogAction::Upgrade,
            Some("1.0.0+script.1"),
            "1.1.0+script.1",
            "h2",
        );
        cl.override_version(&SemVer::parse("2.0.0").unwrap(), "test").unwrap();
        commit_row(
            &mut cl,
            ChangelogAction::Upgrade,
            Some("2.0.0"),
            "2.1.0+script.1",
            "h3",
        );

        let history = cl.contiguous_history(false).unwrap();
        // override itself is filtered out, but it ends the previous window
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to_version, SemVer::script_version(2, 1, 0, 1));
    }

    #[test]
    fn rollback_steps_walk_back_to_target() {
        let mut cl = open_changelog();
        commit_row(&mut cl, ChangelogAction::Install, None, "1.0.0+script.1", "h1");
        commit_row(
            &mut cl,
            ChangelogAction::Upgrade,
            Some("1.0.0+script.1"),
            "1.1.0+script.1",
            "h2",
        );
        commit_row(
            &mut cl,
            ChangelogAction::Upgrade,
            Some("1.1.0+script.1"),
            "1.2.0+script.1",
            "h3",
        );

        let steps = cl.rollback_steps(&SemVer::script_version(1, 0, 0, 1)).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].from_version, SemVer::script_version(1, 2, 0, 1));
        assert_eq!(steps[0].to_version, SemVer::script_version(1, 1, 0, 1));
        assert_eq!(steps[1].from_version, SemVer::script_version(1, 1, 0, 1));
        assert_eq!(steps[1].to_version, SemVer::script_version(1, 0, 0, 1));
    }

    #[test]
    fn rollback_steps_empty_when_target_unreachable() {
        let mut cl = open_changelog();
        commit_row(&mut cl, ChangelogAction::Install, None, "1.0.0+script.1", "h1");
        let steps = cl.rollback_steps(&SemVer::parse("9.9.9").unwrap()).unwrap();
        assert!(steps.is_empty());
    }
}
