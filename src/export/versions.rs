//! The titledb version directory (`versions.json`).
//!
//! Maps an application id to `{ "<version code>": "<release date>" }`.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::error::{Result, ToolError};
use crate::model::title::TitleId;

/// Latest known release of an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestVersion {
    pub version_code: u32,
    pub release_date: String,
}

/// Parsed `versions.json`.
#[derive(Debug, Clone, Default)]
pub struct VersionDirectory {
    apps: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl VersionDirectory {
    /// Load from a local file. A missing file is a prerequisite error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ToolError::open(path, e))?;
        let directory = Self::parse(&text)
            .map_err(|e| ToolError::Export(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), apps = directory.apps.len(), "Loaded version directory");
        Ok(directory)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, BTreeMap<String, serde_json::Value>> = serde_json::from_str(text)?;
        let apps = raw
            .into_iter()
            .map(|(app, versions)| (app.to_ascii_lowercase(), versions))
            .collect();
        Ok(Self { apps })
    }

    /// The highest version code listed for `app`.
    pub fn latest(&self, app: TitleId) -> Option<LatestVersion> {
        self.apps
            .get(&app.to_string())?
            .iter()
            .filter_map(|(code, date)| {
                let version_code = code.parse::<u32>().ok()?;
                let release_date = match date {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some(LatestVersion {
                    version_code,
                    release_date,
                })
            })
            .max_by_key(|v| v.version_code)
    }
}
