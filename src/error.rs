// src/error.rs

use crate::semver::SemVer;
use thiserror::Error;

/// Core error types for dbmig
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A semantic version string could not be parsed
    #[error("Invalid version: {0}")]
    Parse(String),

    /// A top-level script file's name did not match the required grammar
    #[error(
        "Scripts not under sub-directories must be named X.Y.Z+script.N_desc.sql, file: {0}"
    )]
    BadToplevelFilename(String),

    /// A sub-directory script file's name did not match the required grammar
    #[error(
        "Scripts under sub-directories must be named X.Y.Z/[X.Y.Z+][script.]N_desc.sql, file: {0}"
    )]
    BadSubdirFilename(String),

    /// A filename parsed as a version but lacked `script.N` build metadata
    #[error(
        "Directory and/or filename must begin with a parseable semantic version, containing \
         build metadata matching 'script.nnn', and followed by an optional underscore before \
         any remaining filename data: {0}"
    )]
    IncompleteFilename(String),

    /// Two files in one ScriptDir resolve to the same script version
    #[error("Two different files resolve to script version {version}: {path1} and {path2}")]
    ScriptDirUniqueness {
        version: SemVer,
        path1: String,
        path2: String,
    },

    /// An upgrade script range contained a non-contiguous step
    #[error("Script {script_path} is not a contiguous increment from version {base_version}")]
    ScriptNonContiguous {
        base_version: SemVer,
        script_version: SemVer,
        script_path: String,
    },

    /// A script's hash on disk does not match the hash recorded at deployment
    #[error(
        "Script {script_path} has changed since being deployed, original hash = {changelog_sum}, \
         hash of script on disk = {script_sum}"
    )]
    ScriptChangedSinceDeployment {
        changelog_sum: String,
        script_sum: String,
        script_path: String,
    },

    /// A baseline install was requested but no suitable install script exists
    #[error("No suitable install script earlier than {0} in repository")]
    NoSuitableInstall(String),

    /// A rollback was requested but the changelog has no path to the target
    #[error("No known path to rollback to target version {0} in changelog")]
    NoRollbackPath(String),

    /// The changelog's recorded current version does not match what the
    /// driver expected when computing a rollback plan
    #[error(
        "The latest version in the changelog is {changelog_version} but dbmig has got confused \
         and thinks we're starting from {expected_version}"
    )]
    InternalInconsistency {
        changelog_version: SemVer,
        expected_version: SemVer,
    },

    /// The database session reports a backend with no registered dialect
    #[error("Backend '{0}' is not supported")]
    UnsupportedBackend(String),

    /// An interactive confirmation prompt was declined
    #[error("Operation cancelled by user")]
    UserCancelled,

    /// The script directory path does not exist or is not a directory
    #[error("Script directory path does not exist: {0}")]
    ScriptDirNotFound(String),
}

/// Result type alias using dbmig's Error type
pub type Result<T> = std::result::Result<T, Error>;
