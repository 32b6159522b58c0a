//! Settings file support.
//!
//! Every option of the `compare` command can also be given in a YAML or
//! TOML file passed with `--config`. Flags on the command line win over
//! the file, which wins over built-in defaults.
//!
//! ```yaml
//! mode: quick
//! ttl_tolerance: 500ms
//! traversal: both
//! threads: 16
//! key_include: ["user:*"]
//! ignore_hash_fields: [updated_at]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Comparison options read from a settings file. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// `quick` or `full`
    pub mode: Option<String>,
    pub ttl_tolerance: Option<String>,
    pub compare_stream_ids: Option<bool>,
    pub score_tolerance: Option<f64>,
    pub show_diffs: Option<bool>,
    pub diff_output: Option<PathBuf>,
    /// `source`, `target` or `both`
    pub traversal: Option<String>,
    pub threads: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub status_interval: Option<String>,
    pub scan_partitions: Option<usize>,
    pub key_include: Vec<String>,
    pub key_exclude: Vec<String>,
    pub key_slots: Vec<String>,
    pub key_type: Vec<String>,
    pub source_prefix: Option<String>,
    pub target_prefix: Option<String>,
    pub ignore_hash_fields: Vec<String>,
    pub retry_attempts: Option<u32>,
    pub lookup_timeout: Option<String>,
}

impl Settings {
    /// Load settings, choosing the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let (format, parse): (&str, fn(&str) -> Result<Self>) = match extension.as_deref() {
            Some("yaml") | Some("yml") => ("YAML", Self::from_yaml),
            Some("toml") => ("TOML", Self::from_toml),
            _ => bail!("Unsupported settings file {path:?} (expected .yaml, .yml or .toml)"),
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {path:?}"))?;
        parse(&content).with_context(|| format!("Failed to parse settings {format}: {path:?}"))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml() {
        let settings = Settings::from_yaml(
            r#"
mode: quick
ttl_tolerance: 500ms
threads: 4
key_include: ["user:*", "order:*"]
"#,
        )
        .unwrap();
        assert_eq!(settings.mode.as_deref(), Some("quick"));
        assert_eq!(settings.ttl_tolerance.as_deref(), Some("500ms"));
        assert_eq!(settings.threads, Some(4));
        assert_eq!(settings.key_include.len(), 2);
        assert!(settings.key_exclude.is_empty());
    }

    #[test]
    fn test_toml() {
        let settings = Settings::from_toml(
            r#"
traversal = "both"
compare_stream_ids = false
ignore_hash_fields = ["id"]
"#,
        )
        .unwrap();
        assert_eq!(settings.traversal.as_deref(), Some("both"));
        assert_eq!(settings.compare_stream_ids, Some(false));
        assert_eq!(settings.ignore_hash_fields, vec!["id".to_string()]);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(Settings::from_yaml("thread: 4").is_err());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(Settings::load(Path::new("settings.ini")).is_err());
    }
}
