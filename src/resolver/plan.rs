// src/resolver/plan.rs

//! Resolution plan data structures
//!
//! Contains the result types for dependency resolution.

use crate::index::VersionedPackage;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Result of resolving one package set
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionPlan {
    /// Everything the index has marked for install, in marking order
    pub install: Vec<VersionedPackage>,
    /// Local archive paths produced by the fetch
    pub archives: Vec<PathBuf>,
}

impl ResolutionPlan {
    pub fn contains(&self, name: &str) -> bool {
        self.install.iter().any(|p| p.package == name)
    }
}

impl fmt::Display for ResolutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Install ({} packages):", self.install.len())?;
        for package in &self.install {
            writeln!(f, "  {} {}", package.package, package.version)?;
        }
        if !self.archives.is_empty() {
            writeln!(f, "Archives:")?;
            for archive in &self.archives {
                writeln!(f, "  {}", archive.display())?;
            }
        }
        Ok(())
    }
}
