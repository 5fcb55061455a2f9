// src/error.rs

//! Error types for blueprint loading, dependency resolution and assembly
//!
//! Every failure is fatal to the package set being processed: nothing in
//! this crate retries internally, and the assembler fails closed.

use std::collections::BTreeSet;
use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed version, package or blueprint text
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Requested package is unknown to the index
    #[error("Can't find {0} in package index")]
    PackageNotFound(String),

    /// No known version satisfies every restriction on a requested package
    #[error("Failed to locate {package} that satisfies revision specifications [{restrictions}]")]
    UnsatisfiableConstraint {
        package: String,
        restrictions: String,
    },

    /// A dependency of a package in the closure has no acceptable version
    #[error("Unable to satisfy dependency: {package} {dependency} (via {})", .chain.join(" -> "))]
    UnsatisfiableTransitiveDependency {
        package: String,
        dependency: String,
        chain: Vec<String>,
    },

    /// Multi-way OR-dependency after the alternation policy was applied
    #[error("Can't handle or-dependencies of {package}: {}", .alternatives.join(" | "))]
    UnresolvableAlternation {
        package: String,
        alternatives: Vec<String>,
    },

    /// The index's own solver could not install a package
    #[error("Could not install {0} due to version conflicts")]
    SolverConflict(String),

    /// Broken install state that the index could not repair
    #[error("We have broken dependencies: {0}")]
    BrokenDependencies(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Fetch cancelled")]
    FetchCancelled,

    /// Post-fetch verification found requested packages without archives
    #[error("Missing packages: {}", .0.iter().cloned().collect::<Vec<_>>().join(", "))]
    MissingPackages(BTreeSet<String>),

    /// The index refused to mark a package for install
    #[error("Failed to mark {package} for install: {reason}")]
    MarkInstallFailed { package: String, reason: String },

    /// Invalid blueprint or assembler configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Assembly was cancelled between package sets
    #[error("Cancelled before package set {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Download error: {0}")]
    DownloadError(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors produced by the dependency resolver
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::PackageNotFound(_)
                | Error::UnsatisfiableConstraint { .. }
                | Error::UnsatisfiableTransitiveDependency { .. }
                | Error::UnresolvableAlternation { .. }
                | Error::SolverConflict(_)
                | Error::BrokenDependencies(_)
                | Error::MarkInstallFailed { .. }
        )
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitive_error_shows_backtrace() {
        let err = Error::UnsatisfiableTransitiveDependency {
            package: "b".to_string(),
            dependency: "c".to_string(),
            chain: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unable to satisfy dependency: b c (via a -> b)"
        );
        assert!(err.is_resolution_error());
    }

    #[test]
    fn test_missing_packages_lists_names() {
        let missing: BTreeSet<String> = ["zlib", "bash"].iter().map(|s| s.to_string()).collect();
        let err = Error::MissingPackages(missing);
        assert_eq!(err.to_string(), "Missing packages: bash, zlib");
        assert!(!err.is_resolution_error());
    }
}
