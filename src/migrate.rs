// src/migrate.rs

//! Orchestrates install / upgrade / rollback to bring a database from its
//! current changelog version to a requested target. See spec §4.8.
//!
//! Each single script execution is one transaction: the statements it
//! runs and the changelog row recording them commit together or not at
//! all (spec §4.8, §5).

use crate::action::ScriptAction;
use crate::changelog::{self, Changelog};
use crate::error::{Error, Result};
use crate::repository::{Repository, ScriptCategory};
use crate::semver::SemVer;
use std::time::Instant;
use tracing::{info, warn};

/// Gates a single migration step on caller approval. `--force` bypasses
/// this with [`AutoConfirm`]; an interactive CLI implements it over
/// stdin (see `main.rs`).
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Approves every step without asking - used when the caller passed
/// `--force`.
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&mut self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}

fn require_confirmation(confirm: &mut dyn Confirm, message: &str) -> Result<()> {
    if confirm.confirm(message)? {
        Ok(())
    } else {
        Err(Error::UserCancelled)
    }
}

/// Reads and tokenises one script, optionally verifying its hash against
/// what the changelog expects (rollback only), runs its statements and
/// the matching changelog write in one transaction.
#[allow(clippy::too_many_arguments)]
fn run_step(
    repo: &Repository,
    changelog: &mut Changelog,
    changeset: &str,
    category: ScriptCategory,
    relative_path: &str,
    action: ScriptAction,
    from_version: Option<&SemVer>,
    to_version: &SemVer,
    changed_by: &str,
    expected_hash: Option<&str>,
) -> Result<()> {
    let script = repo.read_script(category, relative_path, action)?;
    if let Some(expected) = expected_hash {
        if script.hash != expected {
            return Err(Error::ScriptChangedSinceDeployment {
                changelog_sum: expected.to_string(),
                script_sum: script.hash,
                script_path: relative_path.to_string(),
            });
        }
    }

    let start = Instant::now();
    let tx = changelog.transaction()?;
    for statement in &script.statements {
        tx.execute(statement, [])?;
    }
    let elapsed_ms = start.elapsed().as_millis() as i64;
    changelog::write(
        &tx,
        changeset,
        action.into(),
        from_version,
        to_version,
        relative_path,
        &script.hash,
        changed_by,
        elapsed_ms,
    )?;
    tx.commit()?;
    info!(%action, to = %to_version, path = relative_path, "applied script");
    Ok(())
}

fn install_baseline(
    repo: &Repository,
    changelog: &mut Changelog,
    changeset: &str,
    target: &SemVer,
    changed_by: &str,
    confirm: &mut dyn Confirm,
) -> Result<()> {
    let (version, path) = repo
        .nearest_install_script(target)
        .ok_or_else(|| Error::NoSuitableInstall(target.to_str()))?;
    require_confirmation(confirm, &format!("install {version} using {path}"))?;
    run_step(
        repo,
        changelog,
        changeset,
        ScriptCategory::Install,
        &path,
        ScriptAction::Install,
        None,
        &version,
        changed_by,
        None,
    )
}

fn upgrade(
    repo: &Repository,
    changelog: &mut Changelog,
    changeset: &str,
    current: &SemVer,
    target: &SemVer,
    changed_by: &str,
    confirm: &mut dyn Confirm,
) -> Result<()> {
    let scripts = repo.upgrade_scripts(current, target)?;
    let mut from = current.clone();
    for (version, path) in scripts {
        require_confirmation(confirm, &format!("upgrade from {from} to {version} using {path}"))?;
        run_step(
            repo,
            changelog,
            changeset,
            ScriptCategory::Upgrade,
            &path,
            ScriptAction::Upgrade,
            Some(&from),
            &version,
            changed_by,
            None,
        )?;
        from = version;
    }
    Ok(())
}

fn rollback(
    repo: &Repository,
    changelog: &mut Changelog,
    changeset: &str,
    current: &SemVer,
    target: &SemVer,
    changed_by: &str,
    confirm: &mut dyn Confirm,
) -> Result<()> {
    let steps = changelog.rollback_steps(target)?;
    let first = steps
        .first()
        .ok_or_else(|| Error::NoRollbackPath(target.to_str()))?;
    if &first.from_version != current {
        return Err(Error::InternalInconsistency {
            changelog_version: current.clone(),
            expected_version: first.from_version.clone(),
        });
    }

    for step in &steps {
        let path = repo
            .upgrade_script_at(&step.from_version)
            .ok_or_else(|| Error::NoRollbackPath(step.from_version.to_str()))?;
        require_confirmation(
            confirm,
            &format!(
                "rollback from {} to {} using {path}",
                step.from_version, step.to_version
            ),
        )?;
        run_step(
            repo,
            changelog,
            changeset,
            ScriptCategory::Upgrade,
            &path,
            ScriptAction::Rollback,
            Some(&step.from_version),
            &step.to_version,
            changed_by,
            Some(&step.sha256_hash),
        )?;
    }
    Ok(())
}

/// Migrates the database to `target`, running whatever install, upgrade,
/// or rollback scripts are needed. Returns the version actually reached;
/// the caller should warn (not fail) if it differs from `target` (spec
/// §4.8 step 5) - this function does the warning itself via `tracing`,
/// and also returns the reached version so the CLI can report it.
pub fn migrate(
    repo: &Repository,
    changelog: &mut Changelog,
    changeset: &str,
    target: &SemVer,
    changed_by: &str,
    confirm: &mut dyn Confirm,
) -> Result<SemVer> {
    let mut current = changelog.version()?;

    if current.is_zero() {
        install_baseline(repo, changelog, changeset, target, changed_by, confirm)?;
        current = changelog.version()?;
    }

    if current < *target {
        upgrade(repo, changelog, changeset, &current, target, changed_by, confirm)?;
    } else if current > *target {
        rollback(repo, changelog, changeset, &current, target, changed_by, confirm)?;
    }

    let reached = changelog.version()?;
    if &reached != target {
        warn!(target = %target, reached = %reached, "migration did not reach the requested target");
    }
    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, NamedTempFile};

    fn open_changelog() -> Changelog {
        let temp = NamedTempFile::new().unwrap();
        let conn = crate::db::open(temp.path().to_str().unwrap()).unwrap();
        std::mem::forget(temp);
        Changelog::open(conn, "default")
    }

    fn make_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("install")).unwrap();
        fs::create_dir(dir.path().join("upgrade")).unwrap();
        fs::write(
            dir.path().join("install/1.0.0+script.1_init.sql"),
            "CREATE TABLE t (id INTEGER);\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("upgrade/1.1.0+script.1_add_col.sql"),
            "ALTER TABLE t ADD COLUMN name TEXT;\n--//@UNDO\nALTER TABLE t DROP COLUMN name;\n",
        )
        .unwrap();
        let repo = Repository::load(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn installs_baseline_when_starting_from_zero() {
        let (_dir, repo) = make_repo();
        let mut cl = open_changelog();
        let target = SemVer::script_version(1, 0, 0, 1);
        let reached = migrate(&repo, &mut cl, "default", &target, "test", &mut AutoConfirm).unwrap();
        assert_eq!(reached, target);
        assert_eq!(cl.version().unwrap(), target);
    }

    #[test]
    fn upgrades_after_baseline_install() {
        let (_dir, repo) = make_repo();
        let mut cl = open_changelog();
        let target = SemVer::script_version(1, 1, 0, 1);
        let reached = migrate(&repo, &mut cl, "default", &target, "test", &mut AutoConfirm).unwrap();
        assert_eq!(reached, target);
    }

    #[test]
    fn rolls_back_to_prior_version() {
        let (_dir, repo) = make_repo();
        let mut cl = open_changelog();
        let top = SemVer::script_version(1, 1, 0, 1);
        migrate(&repo, &mut cl, "default", &top, "test", &mut AutoConfirm).unwrap();

        let baseline = SemVer::script_version(1, 0, 0, 1);
        let reached =
            migrate(&repo, &mut cl, "default", &baseline, "test", &mut AutoConfirm).unwrap();
        assert_eq!(reached, baseline);
        assert_eq!(cl.version().unwrap(), baseline);
    }

    #[test]
    fn rollback_to_current_version_is_a_no_op() {
        let (_dir, repo) = make_repo();
        let mut cl = open_changelog();
        let target = SemVer::script_version(1, 0, 0, 1);
        migrate(&repo, &mut cl, "default", &target, "test", &mut AutoConfirm).unwrap();
        let reached = migrate(&repo, &mut cl, "default", &target, "test", &mut AutoConfirm).unwrap();
        assert_eq!(reached, target);
    }

    #[test]
    fn no_suitable_install_when_repository_is_empty() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("install")).unwrap();
        fs::create_dir(dir.path().join("upgrade")).unwrap();
        let repo = Repository::load(dir.path()).unwrap();
        let mut cl = open_changelog();
        let err = migrate(
            &repo,
            &mut cl,
            "default",
            &SemVer::parse("1.0.0").unwrap(),
            "test",
            &mut AutoConfirm,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoSuitableInstall(_)));
    }

    struct DenyAll;
    impl Confirm for DenyAll {
        fn confirm(&mut self, _message: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn declined_confirmation_cancels_without_partial_effect() {
        let (_dir, repo) = make_repo();
        let mut cl = open_changelog();
        let target = SemVer::script_version(1, 0, 0, 1);
        let err = migrate(&repo, &mut cl, "default", &target, "test", &mut DenyAll).unwrap_err();
        assert!(matches!(err, Error::UserCancelled));
        assert!(cl.version().unwrap().is_zero());
    }
}
