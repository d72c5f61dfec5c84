// src/repository.rs

//! Composes the install and upgrade [`ScriptDir`]s under one repository
//! root and answers the queries the migrate and check drivers need.

use crate::action::ScriptAction;
use crate::error::{Error, Result};
use crate::script_dir::ScriptDir;
use crate::script_stream::{self, ScriptResult};
use crate::semver::SemVer;
use std::path::{Path, PathBuf};

const DEFAULT_EXTENSION: &str = ".sql";

/// Which of the two script directories a relative path is rooted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptCategory {
    Install,
    Upgrade,
}

/// A loaded repository: the `install/` and `upgrade/` script directories
/// under one root. `latest/` is not represented here - it is out of scope
/// for the migration engine (spec §3).
pub struct Repository {
    root: PathBuf,
    install_dir: ScriptDir,
    upgrade_dir: ScriptDir,
}

impl Repository {
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_with_extension(root, DEFAULT_EXTENSION)
    }

    pub fn load_with_extension(root: &Path, extension: &str) -> Result<Self> {
        let install_dir = ScriptDir::load(&root.join("install"), extension)?;
        let upgrade_dir = ScriptDir::load(&root.join("upgrade"), extension)?;
        Ok(Repository {
            root: root.to_path_buf(),
            install_dir,
            upgrade_dir,
        })
    }

    pub fn install_dir(&self) -> &ScriptDir {
        &self.install_dir
    }

    pub fn upgrade_dir(&self) -> &ScriptDir {
        &self.upgrade_dir
    }

    /// The greater of the two directories' maximum keys, or zero if both
    /// are empty.
    pub fn latest_version(&self) -> SemVer {
        let install_max = self.install_dir.max_key();
        let upgrade_max = self.upgrade_dir.max_key();
        match (install_max, upgrade_max) {
            (Some(a), Some(b)) => a.max(b).clone(),
            (Some(a), None) => a.clone(),
            (None, Some(b)) => b.clone(),
            (None, None) => SemVer::zero(),
        }
    }

    /// The single install entry with the greatest key ≤ `target`, if any.
    pub fn nearest_install_script(&self, target: &SemVer) -> Option<(SemVer, String)> {
        self.install_dir
            .greatest_at_or_below(target)
            .map(|(v, p)| (v.clone(), p.to_string()))
    }

    /// The single upgrade entry whose key equals `ver` exactly, if any.
    pub fn upgrade_script_at(&self, ver: &SemVer) -> Option<String> {
        self.upgrade_dir.get(ver).map(str::to_string)
    }

    /// The contiguous sequence of upgrade scripts in `(start, target]`, or
    /// [`Error::ScriptNonContiguous`] if the sequence skips a step. See the
    /// contiguity rule in spec §4.4.
    pub fn upgrade_scripts(&self, start: &SemVer, target: &SemVer) -> Result<Vec<(SemVer, String)>> {
        let range = self.upgrade_dir.range(start, target);
        let mut prev = start.clone();
        let mut result = Vec::with_capacity(range.len());
        for (version, path) in range {
            if !is_contiguous_step(&prev, version) {
                return Err(Error::ScriptNonContiguous {
                    base_version: prev,
                    script_version: version.clone(),
                    script_path: path.to_string(),
                });
            }
            prev = version.clone();
            result.push((version.clone(), path.to_string()));
        }
        Ok(result)
    }

    /// Reads, tokenises and hashes the script at `relative_path` within
    /// `category`, for `action`.
    pub fn read_script(
        &self,
        category: ScriptCategory,
        relative_path: &str,
        action: ScriptAction,
    ) -> Result<ScriptResult> {
        let base = match category {
            ScriptCategory::Install => self.root.join("install"),
            ScriptCategory::Upgrade => self.root.join("upgrade"),
        };
        let content = std::fs::read(base.join(relative_path))?;
        script_stream::read_script(&content, action)
    }
}

/// The contiguity rule: `next` must advance `prev` by exactly one script
/// bump at the same `X.Y.Z`, or by exactly one patch, minor, or major step.
fn is_contiguous_step(prev: &SemVer, next: &SemVer) -> bool {
    let (pmaj, pmin, ppat) = (prev.major(), prev.minor(), prev.patch());
    let (nmaj, nmin, npat) = (next.major(), next.minor(), next.patch());

    (nmaj == pmaj && nmin == pmin && npat == ppat)
        || (nmaj == pmaj && nmin == pmin && npat == ppat + 1)
        || (nmaj == pmaj && nmin == pmin + 1 && npat == 0)
        || (nmaj == pmaj + 1 && nmin == 0 && npat == 0)
}
