//! Analyzer configuration.
//!
//! Loaded from `promise-misuse.yaml` in the working directory, or from the
//! user configuration directory when no local file exists.

use directories::ProjectDirs;
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::observation::AsyncId;

/// Config file names searched for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["promise-misuse.yaml", ".promise-misuse.yaml"];

/// Frames belonging to the runtime itself.
pub const DEFAULT_INTERNAL_FRAME_PATTERNS: &[&str] =
    &[r"^node:", r"^internal/", r"\(node:", r"\(internal/"];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub version: String,
    /// Also report the context that was still running at end of stream
    #[serde(default)]
    pub verbose: Option<bool>,
    /// Promise ids whose raw state is written to the debug log
    #[serde(default)]
    pub raw_ids: Vec<AsyncId>,
    /// Additional regexes identifying runtime-internal stack frames
    #[serde(default)]
    pub internal_frame_patterns: Vec<String>,
    /// Glob patterns for allocation sites to ignore (e.g., "**/node_modules/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    /// "pretty" (default) or "json"
    #[serde(default)]
    pub format: Option<String>,
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Returns whether verbose reporting is enabled (defaults to false).
    pub fn is_verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    /// Returns the output format (defaults to "pretty").
    pub fn get_format(&self) -> &str {
        self.format.as_deref().unwrap_or("pretty")
    }

    /// Compile the built-in and configured runtime-internal frame patterns.
    pub fn internal_frames(&self) -> anyhow::Result<RegexSet> {
        let patterns = DEFAULT_INTERNAL_FRAME_PATTERNS
            .iter()
            .copied()
            .chain(self.internal_frame_patterns.iter().map(String::as_str));
        RegexSet::new(patterns).map_err(|e| anyhow::anyhow!("invalid internal frame pattern: {}", e))
    }

    /// Compile the excluded path globs.
    pub fn excluded_path_set(&self) -> anyhow::Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded_paths {
            let glob = Glob::new(pattern).map_err(|e| {
                anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e)
            })?;
            builder.add(glob);
        }
        Ok(builder.build()?)
    }
}

/// Find a config file: working directory first, then the user config dir.
pub fn discover() -> Option<PathBuf> {
    for name in DEFAULT_CONFIG_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Some(path);
        }
    }

    ProjectDirs::from("", "", "promise-misuse")
        .map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_NAMES[0]))
        .filter(|path| path.exists())
}

/// Validate a config for correctness.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    // Validate format
    if let Some(format) = &config.format {
        if format != "pretty" && format != "json" {
            anyhow::bail!("invalid format {:?}, must be 'pretty' or 'json'", format);
        }
    }

    // Validate frame patterns compile
    for pattern in &config.internal_frame_patterns {
        regex::Regex::new(pattern).map_err(|e| {
            anyhow::anyhow!("invalid internal frame pattern {:?}: {}", pattern, e)
        })?;
    }

    // Validate excluded_paths glob patterns compile
    for pattern in &config.excluded_paths {
        Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
version: "1"
verbose: true
raw_ids: [12, 40]
internal_frame_patterns:
  - "/vendor/instrumentation/"
excluded_paths:
  - "**/node_modules/**"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.is_verbose());
        assert_eq!(config.raw_ids, vec![12, 40]);
        assert_eq!(config.get_format(), "pretty");
        assert!(validate(&config).is_ok());

        let frames = config.internal_frames().unwrap();
        assert!(frames.is_match("node:internal/process/task_queues:95:5"));
        assert!(frames.is_match("file:///srv/vendor/instrumentation/hook.js:3:1"));
        assert!(!frames.is_match("file:///srv/app/index.js:3:1"));

        let excluded = config.excluded_path_set().unwrap();
        assert!(excluded.is_match("/srv/app/node_modules/pg/lib/client.js"));
        assert!(!excluded.is_match("/srv/app/lib/client.js"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.is_verbose());
        assert_eq!(config.get_format(), "pretty");
        assert!(config.excluded_path_set().unwrap().is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_patterns() {
        let config = Config {
            internal_frame_patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        assert!(validate(&config).is_err());

        let config = Config {
            excluded_paths: vec!["a/{b".to_string()],
            ..Default::default()
        };
        assert!(validate(&config).is_err());

        let config = Config {
            format: Some("sarif".to_string()),
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }
}
