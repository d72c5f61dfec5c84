// src/check.rs

//! Cross-references the changelog's applied history against what the
//! repository says should be on disk, and reports every discrepancy. See
//! spec §4.7. Read-only: never mutates the database, and never stops
//! early on finding an issue - every issue found is collected.

use crate::action::ScriptAction;
use crate::changelog::{Changelog, ChangelogAction, ChangelogRow};
use crate::diff;
use crate::error::Result;
use crate::repository::{Repository, ScriptCategory};
use crate::semver::SemVer;
use std::fmt;

/// One discrepancy found between the changelog and the repository.
#[derive(Debug, Clone)]
pub enum CheckIssue {
    /// The changelog recorded this script as applied, but the repository
    /// no longer has a file providing it.
    MissingFromRepository {
        version: SemVer,
        action: ChangelogAction,
        script_path: String,
        sha256_hash: String,
    },
    /// The repository has a script in the checked range that the
    /// changelog never recorded as applied.
    MissingFromChangelog {
        version: SemVer,
        action: ScriptAction,
        script_path: String,
        sha256_hash: String,
    },
    /// Both sides have this version, but the action, path, or hash
    /// disagree - the file drifted, was renamed, or was re-tagged since
    /// deployment.
    HashMismatch {
        version: SemVer,
        changelog_action: ChangelogAction,
        changelog_path: String,
        changelog_hash: String,
        repository_action: ScriptAction,
        repository_path: String,
        repository_hash: String,
    },
}

impl fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckIssue::MissingFromRepository { version, action, script_path, .. } => {
                write!(
                    f,
                    "{version}: changelog records a {action} at {script_path} with no matching \
                     repository script"
                )
            }
            CheckIssue::MissingFromChangelog { version, action, script_path, .. } => {
                write!(
                    f,
                    "{version}: repository {action} script {script_path} was never recorded in \
                     the changelog"
                )
            }
            CheckIssue::HashMismatch {
                version,
                changelog_path,
                repository_path,
                ..
            } => {
                write!(
                    f,
                    "{version}: changelog entry for {changelog_path} does not match repository \
                     script {repository_path} (action, path, or hash differ)"
                )
            }
        }
    }
}

struct RepoScript {
    version: SemVer,
    action: ScriptAction,
    path: String,
}

/// Runs the check. Returns an empty report when the changelog's
/// contiguous history is empty or its most recent version is zero - a
/// database that has never been migrated has nothing to check.
pub fn run_check(repo: &Repository, changelog: &Changelog) -> Result<Vec<CheckIssue>> {
    let history = changelog.contiguous_history(true)?;
    let ceiling = match history.last() {
        Some(row) => row.to_version.clone(),
        None => return Ok(Vec::new()),
    };
    if ceiling.is_zero() {
        return Ok(Vec::new());
    }
    let first_version = history[0].to_version.clone();

    let mut repo_scripts = Vec::new();
    let lower = match repo.nearest_install_script(&first_version) {
        Some((version, path)) => {
            let lower = version.clone();
            repo_scripts.push(RepoScript { version, action: ScriptAction::Install, path });
            lower
        }
        None => first_version,
    };
    for (version, path) in repo.upgrade_scripts(&lower, &ceiling)? {
        repo_scripts.push(RepoScript { version, action: ScriptAction::Upgrade, path });
    }

    let mut issues = Vec::new();
    diff::diff(
        &history,
        &repo_scripts,
        |cl: &ChangelogRow, rs: &RepoScript| cl.to_version < rs.version,
        |cl: &ChangelogRow, rs: &RepoScript| cl.to_version == rs.version,
        |cl: &ChangelogRow| {
            issues.push(CheckIssue::MissingFromRepository {
                version: cl.to_version.clone(),
                action: cl.action,
                script_path: cl.script_path.clone(),
                sha256_hash: cl.sha256_hash.clone(),
            });
        },
        |rs: &RepoScript| {
            if let Ok(hash) = repository_hash(repo, rs) {
                issues.push(CheckIssue::MissingFromChangelog {
                    version: rs.version.clone(),
                    action: rs.action,
                    script_path: rs.path.clone(),
                    sha256_hash: hash,
                });
            }
        },
        |cl: &ChangelogRow, rs: &RepoScript| {
            if let Ok(hash) = repository_hash(repo, rs) {
                let expected_action = ChangelogAction::from(rs.action);
                if hash != cl.sha256_hash || cl.action != expected_action || cl.script_path != rs.path {
                    issues.push(CheckIssue::HashMismatch {
                        version: cl.to_version.clone(),
                        changelog_action: cl.action,
                        changelog_path: cl.script_path.clone(),
                        changelog_hash: cl.sha256_hash.clone(),
                        repository_action: rs.action,
                        repository_path: rs.path.clone(),
                        repository_hash: hash,
                    });
                }
            }
        },
    );

    Ok(issues)
}

fn repository_hash(repo: &Repository, rs: &RepoScript) -> Result<String> {
    let category = match rs.action {
        ScriptAction::Install => ScriptCategory::Install,
        ScriptAction::Upgrade | ScriptAction::Rollback => ScriptCategory::Upgrade,
    };
    Ok(repo.read_script(category, &rs.path, rs.action)?.hash)
}
