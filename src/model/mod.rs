// src/model/mod.rs

//! Release model - blueprints, package sets and package references
//!
//! The model is the declarative input of an assembly run. A blueprint is
//! parsed once at start-up, validated, optionally re-targeted at a release
//! distribution, and then only read.

pub mod blueprint;
pub mod package;
pub mod package_set;
mod xml;

pub use blueprint::{
    ArtifactNames, Blueprint, BlueprintSummary, InstallHook, LoadOptions, OutputFormat,
    RootfsDescriptor, parse_bool,
};
pub use package::{PackageList, PackageRef};
pub use package_set::{MirrorRule, PackageSet, RepositorySource};
