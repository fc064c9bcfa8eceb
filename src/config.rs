// Defaults for the command-line tool.
//
// Values are resolved in this order: command-line flag, environment
// variable (handled by clap), the defaults file, the built-in default. The
// defaults file is a small JSON document kept in the user's home directory
// (or wherever `TFD_CONFIG` points) and written by `tfd save-defaults`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::DEFAULT_PORT;
use crate::error::{IoContext, Result};

pub const DEFAULT_HOST: &str = "localhost.service";
pub const CONFIG_ENV: &str = "TFD_CONFIG";
const DEFAULTS_FILE: &str = ".tfd_defaults.json";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Where the service lives once every source has been consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// `$TFD_CONFIG`, or `~/.tfd_defaults.json`.
pub fn defaults_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULTS_FILE),
    }
}

impl Defaults {
    /// Read the defaults file. A missing file means no defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no defaults file");
            return Ok(Defaults::default());
        }
        let data = fs::read_to_string(path)
            .io_context(|| format!("read defaults {}", path.display()))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .io_context(|| format!("create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).io_context(|| format!("write defaults {}", path.display()))
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: Defaults) -> Defaults {
        Defaults {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            team: other.team.or(self.team),
            project: other.project.or(self.project),
        }
    }

    pub fn endpoint(&self, host: Option<String>, port: Option<u16>) -> Endpoint {
        Endpoint {
            host: host
                .or_else(|| self.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: port.or(self.port).unwrap_or(DEFAULT_PORT),
        }
    }

    pub fn team(&self, team: Option<String>) -> Option<String> {
        team.or_else(|| self.team.clone())
    }

    pub fn project(&self, project: Option<String>) -> Option<String> {
        project.or_else(|| self.project.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_builtin_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = Defaults::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(defaults, Defaults::default());
        assert_eq!(
            defaults.endpoint(None, None),
            Endpoint {
                host: DEFAULT_HOST.into(),
                port: DEFAULT_PORT
            }
        );
    }

    #[test]
    fn flags_win_over_file() {
        let defaults = Defaults {
            host: Some("tfd.internal".into()),
            port: Some(9600),
            team: Some("search".into()),
            project: None,
        };
        let endpoint = defaults.endpoint(Some("override".into()), None);
        assert_eq!(endpoint.host, "override");
        assert_eq!(endpoint.port, 9600);
        assert_eq!(defaults.team(None).as_deref(), Some("search"));
        assert_eq!(defaults.team(Some("ads".into())).as_deref(), Some("ads"));
        assert_eq!(defaults.project(None), None);
    }

    #[test]
    fn saved_defaults_round_trip_through_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("defaults.json");
        let first = Defaults {
            host: Some("a".into()),
            team: Some("t".into()),
            ..Defaults::default()
        };
        first.save(&path).unwrap();

        let update = Defaults {
            host: Some("b".into()),
            port: Some(1234),
            ..Defaults::default()
        };
        let merged = Defaults::load(&path).unwrap().merge(update);
        merged.save(&path).unwrap();

        let loaded = Defaults::load(&path).unwrap();
        assert_eq!(loaded.host.as_deref(), Some("b"));
        assert_eq!(loaded.port, Some(1234));
        assert_eq!(loaded.team.as_deref(), Some("t"));
    }

    #[test]
    fn corrupt_file_is_a_payload_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defaults.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Defaults::load(&path),
            Err(crate::error::Error::Payload(_))
        ));
    }
}
