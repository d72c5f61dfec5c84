// src/action.rs

//! The closed set of actions a script execution can record.

use crate::error::{Error, Result};
use std::fmt;

/// An action the migrate driver can perform against a single script.
///
/// `Override` is deliberately not a member of this enum: it is a
/// changelog-only pseudo-action (see [`crate::changelog::ChangelogAction`])
/// that never corresponds to a script on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
    Install,
    Upgrade,
    Rollback,
}

impl ScriptAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptAction::Install => "install",
            ScriptAction::Upgrade => "upgrade",
            ScriptAction::Rollback => "rollback",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "install" => Ok(ScriptAction::Install),
            "upgrade" => Ok(ScriptAction::Upgrade),
            "rollback" => Ok(ScriptAction::Rollback),
            other => Err(Error::Parse(format!("Unknown script action: {other}"))),
        }
    }
}

impl fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
