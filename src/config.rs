// src/config.rs

//! Assembler configuration
//!
//! Replaces the process-wide build number, verbosity and distribution
//! settings with one value threaded into the assembler. Loaded from TOML;
//! every key is optional.
//!
//! ```toml
//! build_number = 1234
//! build_suffix = "rc1"
//! distribution = "stretch"
//! alternation_allowlist = ["makedev", "debconf-2.0"]
//! hooks_dir = "opx-onie-installer/inst-hooks"
//! parallel_sets = true
//! fetch_jobs = 8
//! fetch_retries = 2
//!
//! [[mirror_rules]]
//! contains = "openswitch.net"
//! unless_contains = "contrib"
//! ```

use crate::error::{Error, Result};
use crate::model::{LoadOptions, MirrorRule};
use crate::resolver::{AlternationPolicy, DEFAULT_ALTERNATION_ALLOWLIST};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Build number used when none is given
pub const DEFAULT_BUILD_NUMBER: u32 = 99999;

/// Settings for one assembly run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Build number; 0 leaves it out of artifact names
    pub build_number: u32,

    /// Release suffix, joined to artifact names with a hyphen
    pub build_suffix: String,

    /// Release distribution forced onto mirror sources
    pub distribution: String,

    /// OR-group alternatives that may be ignored
    pub alternation_allowlist: Vec<String>,

    /// Sources whose distribution follows `distribution`
    pub mirror_rules: Vec<MirrorRule>,

    /// Directory install hooks are resolved against
    pub hooks_dir: PathBuf,

    /// Architecture written into `sources.list` entries
    pub architecture: String,

    /// URL fragments of repositories that are trusted without signatures
    pub trusted_url_markers: Vec<String>,

    /// Resolve package sets concurrently
    pub parallel_sets: bool,

    /// Parallel archive downloads per package set
    pub fetch_jobs: usize,

    /// Extra attempts for a failed archive download
    pub fetch_retries: u32,

    /// Prefix of `OS_NAME` in the release version file
    pub os_name_prefix: String,

    /// Holder named in the `COPYRIGHT` line
    pub copyright_holder: String,

    /// Fixed build date; the current time when unset
    pub build_date: Option<String>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            build_number: DEFAULT_BUILD_NUMBER,
            build_suffix: String::new(),
            distribution: "unstable".to_string(),
            alternation_allowlist: DEFAULT_ALTERNATION_ALLOWLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mirror_rules: vec![
                MirrorRule::new("copy:/mnt", None),
                MirrorRule::new("openswitch.net", Some("contrib")),
            ],
            hooks_dir: PathBuf::from("opx-onie-installer/inst-hooks"),
            architecture: "amd64".to_string(),
            trusted_url_markers: vec!["copy:/mnt".to_string()],
            parallel_sets: false,
            fetch_jobs: 4,
            fetch_retries: 0,
            os_name_prefix: "Dell EMC Networking".to_string(),
            copyright_holder: "Dell EMC Inc.".to_string(),
            build_date: None,
        }
    }
}

impl AssemblerConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigurationError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::ConfigurationError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_jobs == 0 {
            return Err(Error::ConfigurationError(
                "fetch_jobs must be at least 1".to_string(),
            ));
        }
        if self.distribution.trim().is_empty() {
            return Err(Error::ConfigurationError(
                "distribution must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn alternation_policy(&self) -> AlternationPolicy {
        AlternationPolicy::new(self.alternation_allowlist.iter().cloned())
    }

    /// Blueprint loading options derived from this configuration
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            hooks_dir: self.hooks_dir.clone(),
            distribution: Some(self.distribution.clone()),
            mirror_rules: self.mirror_rules.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssemblerConfig::default();
        assert_eq!(config.build_number, 99999);
        assert_eq!(config.distribution, "unstable");
        assert_eq!(config.alternation_allowlist, vec!["makedev", "debconf-2.0"]);
        assert!(config.mirror_rules[1].matches("http://deb.openswitch.net"));
        assert!(!config.mirror_rules[1].matches("http://deb.openswitch.net/contrib"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AssemblerConfig::from_toml(
            r#"
            build_number = 12
            build_suffix = "rc1"

            [[mirror_rules]]
            contains = "mirror.local"
            "#,
        )
        .unwrap();
        assert_eq!(config.build_number, 12);
        assert_eq!(config.build_suffix, "rc1");
        assert_eq!(config.fetch_jobs, 4);
        assert_eq!(config.fetch_retries, 0);
        assert_eq!(config.mirror_rules, vec![MirrorRule::new("mirror.local", None)]);
    }

    #[test]
    fn test_invalid_values() {
        assert!(AssemblerConfig::from_toml("fetch_jobs = 0").is_err());
        assert!(AssemblerConfig::from_toml("build_number = \"x\"").is_err());
    }

    #[test]
    fn test_load_options() {
        let mut config = AssemblerConfig::default();
        config.distribution = "stretch".to_string();
        let options = config.load_options();
        assert_eq!(options.distribution.as_deref(), Some("stretch"));
        assert_eq!(options.mirror_rules.len(), 2);
    }
}
