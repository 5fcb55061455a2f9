// src/assembler/release.rs

//! Release version information
//!
//! Rendered as `KEY="value"` lines into the image's release version file
//! and handed to the installer builder as `INSTALLER_<KEY>` variables.

use crate::config::AssemblerConfig;
use crate::model::Blueprint;
use chrono::{DateTime, Datelike, Local};

/// Version details of one release build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub name: String,
    pub version: String,
    pub build_number: u32,
    /// Suffix as rendered in versions: empty or `-<suffix>`
    pub build_suffix: String,
    pub platform: String,
    pub architecture: String,
    pub description: String,
    pub blueprint_version: String,
    pub build_date: String,
    pub os_name: String,
    pub copyright: String,
}

impl ReleaseInfo {
    pub fn new(blueprint: &Blueprint, config: &AssemblerConfig, now: DateTime<Local>) -> Self {
        let build_suffix = if config.build_suffix.is_empty() {
            String::new()
        } else {
            format!("-{}", config.build_suffix)
        };
        let build_date = config
            .build_date
            .clone()
            .unwrap_or_else(|| now.format("%Y-%m-%dT%H:%M:%S%z").to_string());

        Self {
            name: blueprint.output.name.clone(),
            version: blueprint.output.version.clone(),
            build_number: config.build_number,
            build_suffix,
            platform: blueprint.platform.clone(),
            architecture: blueprint.architecture.clone(),
            description: blueprint.description.clone(),
            blueprint_version: blueprint.version.clone(),
            build_date,
            os_name: format!("{} {}", config.os_name_prefix, blueprint.output.name),
            copyright: format!(
                "Copyright (c) 1999-{} by {} All Rights Reserved.",
                now.year(),
                config.copyright_holder
            ),
        }
    }

    /// Key/value pairs in file order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("COPYRIGHT", self.copyright.clone()),
            ("OS_NAME", self.os_name.clone()),
            ("OS_VERSION", self.version.clone()),
            ("PLATFORM", self.platform.clone()),
            ("ARCHITECTURE", self.architecture.clone()),
            (
                "INTERNAL_BUILD_ID",
                format!("{} {}", self.description, self.blueprint_version),
            ),
            (
                "BUILD_VERSION",
                format!("{}({}){}", self.version, self.build_number, self.build_suffix),
            ),
            ("BUILD_DATE", self.build_date.clone()),
        ]
    }

    /// `KEY="value"` lines
    pub fn lines(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .map(|(key, value)| format!("{}=\"{}\"", key, value))
            .collect()
    }

    /// Environment for the installer builder; values keep their quotes
    pub fn installer_env(&self) -> Vec<(String, String)> {
        self.fields()
            .into_iter()
            .map(|(key, value)| (format!("INSTALLER_{}", key), format!("\"{}\"", value)))
            .collect()
    }

    /// Contents of the release version file
    pub fn file_contents(&self) -> String {
        let mut out = self.lines().join("\n");
        out.push('\n');
        out
    }
}
