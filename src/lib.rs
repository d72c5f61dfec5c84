// src/lib.rs

//! dbmig: a semantic-versioned SQL schema migration engine.
//!
//! Given a repository of install and upgrade scripts named with
//! `X.Y.Z+script.N` versions, installs, upgrades, or rolls back a target
//! database to a requested version, recording every applied action in a
//! persistent changelog table kept inside the database itself.
//!
//! # Architecture
//!
//! - [`semver`] - version values and their strict/metadata comparators.
//! - [`script_stream`] - tokenises and hashes one script file.
//! - [`script_dir`] - loads one directory of versioned scripts.
//! - [`repository`] - composes the install and upgrade script directories.
//! - [`changelog`] - the persisted, per-changeset applied-action history.
//! - [`diff`] - a generic sorted-range comparator.
//! - [`check`] - cross-references the changelog against the repository.
//! - [`migrate`] - the install/upgrade/rollback driver.
//! - [`db`] - opens the one supported backend (SQLite).

pub mod action;
pub mod changelog;
pub mod check;
pub mod db;
mod error;
pub mod migrate;
pub mod repository;
pub mod script_dir;
pub mod script_stream;
pub mod semver;
pub mod diff;

pub use error::{Error, Result};
