// Identity of the resources a cursor talks about: team, project, name and
// label. Every part is checked once on construction and stored lower-case.

use std::fmt;

use crate::error::{Error, Result};

pub const DEFAULT_LABEL: &str = "canary";
pub const STABLE_LABEL: &str = "stable";
const MAX_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    team: String,
    project: String,
    name: Option<String>,
    label: String,
}

impl Identity {
    /// `team` and `project` are required. `name` may be omitted for
    /// project-scoped work (reload, config). An empty `label` falls back to
    /// `canary`.
    pub fn new(team: &str, project: &str, name: Option<&str>, label: Option<&str>) -> Result<Self> {
        let team = required("TEAM", team)?;
        let project = required("PROJECT", project)?;
        let name = name.map(|n| required("NAME", n)).transpose()?;
        let label = match label {
            Some(l) if !l.is_empty() => normalize("LABEL", l)?,
            _ => DEFAULT_LABEL.to_string(),
        };
        Ok(Identity {
            team,
            project,
            name,
            label,
        })
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The name, for operations that address a single model or module.
    pub fn require_name(&self) -> Result<&str> {
        self.name
            .as_deref()
            .ok_or(Error::MissingParameter("Parameter NAME is required for this operation"))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TEAM: {}\nPROJECT: {}\nNAME: {}\nLABEL: {}",
            self.team,
            self.project,
            self.name.as_deref().unwrap_or(""),
            self.label
        )
    }
}

/// Check `value` against `[a-zA-Z0-9_]{0,32}` and lower-case it.
pub fn normalize(field: &'static str, value: &str) -> Result<String> {
    let valid = value.chars().count() <= MAX_LEN
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(Error::InvalidParameter {
            field,
            value: value.to_string(),
        });
    }
    Ok(value.to_ascii_lowercase())
}

pub(crate) fn required(field: &'static str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(Error::InvalidParameter {
            field,
            value: String::new(),
        });
    }
    normalize(field, value)
}
