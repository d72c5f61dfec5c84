// src/script_dir.rs

//! Scans a directory of versioned SQL scripts into an ordered, uniqueness-
//! checked map from script version to relative path, and answers the
//! semver-aware range queries the repository and migrate driver need.

use crate::error::{Error, Result};
use crate::semver::SemVer;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

/// Which side of a same-`X.Y.Z` tie a bare (non-script) query version
/// sorts on when compared against a script version. See spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// A bare version sorts below any script of the same `X.Y.Z`.
    Low,
    /// A bare version sorts above any script of the same `X.Y.Z`.
    High,
}

/// Compares a query version against a map entry's key. Every entry in a
/// [`ScriptDir`] is guaranteed to be a script version (enforced at load
/// time), so the only ambiguity this resolves is a bare query version
/// landing at the same `major.minor.patch` as a script entry.
fn compare_query_to_entry(query: &SemVer, entry: &SemVer, alignment: Alignment) -> Ordering {
    let strict = query.cmp_strict(entry);
    if strict != Ordering::Equal {
        return strict;
    }
    match query.script_number() {
        Some(qn) => qn.cmp(&entry.script_number().expect("ScriptDir entries are script versions")),
        None => match alignment {
            Alignment::Low => Ordering::Less,
            Alignment::High => Ordering::Greater,
        },
    }
}

fn strip_extension<'a>(name: &'a str, extension: &str) -> Option<&'a str> {
    if name.len() <= extension.len() {
        return None;
    }
    let (stem, ext) = name.split_at(name.len() - extension.len());
    if ext.eq_ignore_ascii_case(extension) {
        Some(stem)
    } else {
        None
    }
}

fn version_and_description(stem: &str) -> &str {
    match stem.split_once('_') {
        Some((version, _)) => version,
        None => stem,
    }
}

/// Parses a top-level filename: `X.Y.Z+script.N[_DESC].ext`. The build
/// metadata's `script.N` piece is mandatory at top level.
fn parse_toplevel_filename(filename: &str, extension: &str) -> Result<SemVer> {
    let stem = strip_extension(filename, extension)
        .ok_or_else(|| Error::BadToplevelFilename(filename.to_string()))?;
    let version_part = version_and_description(stem);
    let parsed = SemVer::parse(version_part)
        .map_err(|_| Error::BadToplevelFilename(filename.to_string()))?;
    let script_number = parsed
        .script_number()
        .ok_or_else(|| Error::IncompleteFilename(filename.to_string()))?;
    Ok(SemVer::script_version(
        parsed.major(),
        parsed.minor(),
        parsed.patch(),
        script_number,
    ))
}

/// Parses a subdirectory filename: `[X.Y.Z+][script.]N[_DESC].ext`, where
/// the enclosing directory name supplies `X.Y.Z` when the filename doesn't
/// spell it out.
fn parse_subdir_filename(subdir: &str, filename: &str, extension: &str) -> Result<SemVer> {
    let rel_path = format!("{subdir}/{filename}");
    let stem = strip_extension(filename, extension)
        .ok_or_else(|| Error::BadSubdirFilename(rel_path.clone()))?;
    let version_part = version_and_description(stem);

    let base = SemVer::parse(subdir).map_err(|_| Error::BadSubdirFilename(rel_path.clone()))?;
    if !base.pre_release_ids().is_empty() || !base.build_metadata_ids().is_empty() {
        return Err(Error::BadSubdirFilename(rel_path));
    }

    if version_part.contains('+') {
        let parsed = SemVer::parse(version_part)
            .map_err(|_| Error::BadSubdirFilename(rel_path.clone()))?;
        let script_number = parsed
            .script_number()
            .ok_or_else(|| Error::IncompleteFilename(rel_path.clone()))?;
        return Ok(SemVer::script_version(
            parsed.major(),
            parsed.minor(),
            parsed.patch(),
            script_number,
        ));
    }

    let number_str = version_part.strip_prefix("script.").unwrap_or(version_part);
    if number_str.is_empty() || !number_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::BadSubdirFilename(rel_path));
    }
    let n: u64 = number_str
        .parse()
        .map_err(|_| Error::BadSubdirFilename(rel_path.clone()))?;
    Ok(SemVer::script_version(base.major(), base.minor(), base.patch(), n))
}

/// An ordered, load-once map from script version to the path of the file
/// (relative to the `ScriptDir`'s root) that provides it.
#[derive(Debug)]
pub struct ScriptDir {
    entries: BTreeMap<SemVer, String>,
}

impl ScriptDir {
    /// Scans `root` for scripts named with extension `extension`
    /// (including the leading dot, e.g. `.sql`). See spec §4.3 for the
    /// grammar and load-time invariants enforced here.
    pub fn load(root: &Path, extension: &str) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::ScriptDirNotFound(root.display().to_string()));
        }

        let mut entries: BTreeMap<SemVer, String> = BTreeMap::new();
        let mut dir_entries: Vec<_> = std::fs::read_dir(root)?.collect::<std::io::Result<_>>()?;
        dir_entries.sort_by_key(|e| e.file_name());

        for entry in dir_entries {
            let file_type = entry.file_type()?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if file_type.is_file() {
                if strip_extension(&name, extension).is_none() {
                    continue;
                }
                let version = parse_toplevel_filename(&name, extension)?;
                insert_unique(&mut entries, version, name.to_string())?;
                tracing::debug!(file = %name, "parsed top-level script");
            } else if file_type.is_dir() {
                let subdir_path = entry.path();
                let mut children: Vec<_> =
                    std::fs::read_dir(&subdir_path)?.collect::<std::io::Result<_>>()?;
                children.sort_by_key(|e| e.file_name());
                for child in children {
                    if !child.file_type()?.is_file() {
                        continue;
                    }
                    let child_name = child.file_name();
                    let child_name = child_name.to_string_lossy();
                    if strip_extension(&child_name, extension).is_none() {
                        continue;
                    }
                    let version = parse_subdir_filename(&name, &child_name, extension)?;
                    let rel_path = format!("{name}/{child_name}");
                    insert_unique(&mut entries, version, rel_path.clone())?;
                    tracing::debug!(file = %rel_path, "parsed subdirectory script");
                }
            }
        }

        tracing::info!(root = %root.display(), count = entries.len(), "loaded script directory");
        Ok(ScriptDir { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All entries in ascending order.
    pub fn entries(&self) -> impl Iterator<Item = (&SemVer, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// The greatest key, if any.
    pub fn max_key(&self) -> Option<&SemVer> {
        self.entries.keys().next_back()
    }

    /// The path for a script version that exactly matches `v`, if present.
    pub fn get(&self, v: &SemVer) -> Option<&str> {
        self.entries.get(v).map(String::as_str)
    }

    /// All entries with key strictly greater than `v` under low alignment,
    /// ascending.
    pub fn first_greater(&self, v: &SemVer) -> Vec<(&SemVer, &str)> {
        self.entries
            .iter()
            .filter(|(k, _)| compare_query_to_entry(v, k, Alignment::Low) == Ordering::Less)
            .map(|(k, s)| (k, s.as_str()))
            .collect()
    }

    /// All entries with key less than or equal to `v` under high alignment,
    /// ascending.
    pub fn less_equal(&self, v: &SemVer) -> Vec<(&SemVer, &str)> {
        self.entries
            .iter()
            .filter(|(k, _)| compare_query_to_entry(v, k, Alignment::High) != Ordering::Less)
            .map(|(k, s)| (k, s.as_str()))
            .collect()
    }

    /// The entry with the greatest key less than or equal to `v`, under
    /// high alignment.
    pub fn greatest_at_or_below(&self, v: &SemVer) -> Option<(&SemVer, &str)> {
        self.less_equal(v).into_iter().next_back()
    }

    /// Half-open range `(from, to]`: strictly greater than `from` (low
    /// alignment), up to and including `to` (high alignment), ascending.
    pub fn range(&self, from: &SemVer, to: &SemVer) -> Vec<(&SemVer, &str)> {
        self.entries
            .iter()
            .filter(|(k, _)| {
                compare_query_to_entry(from, k, Alignment::Low) == Ordering::Less
                    && compare_query_to_entry(to, k, Alignment::High) != Ordering::Less
            })
            .map(|(k, s)| (k, s.as_str()))
            .collect()
    }
}

fn insert_unique(map: &mut BTreeMap<SemVer, String>, version: SemVer, path: String) -> Result<()> {
    if let Some(existing) = map.get(&version) {
        return Err(Error::ScriptDirUniqueness {
            version,
            path1: existing.clone(),
            path2: path,
        });
    }
    map.insert(version, path);
    Ok(())
}
