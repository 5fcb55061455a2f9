// src/lib.rs

//! pkgasm - release image assembler
//!
//! Builds an installable image from a release blueprint: every package set
//! in the blueprint is resolved against its own Debian repositories, the
//! transitive closure is fetched into the rootfs package cache and the
//! requested artifacts are produced.
//!
//! # Architecture
//!
//! - `model`: blueprints, package sets and package references (XML in/out)
//! - `version`: dpkg version ordering, relations and version restrictions
//! - `index`: the package index seam plus an in-memory implementation fed
//!   from `Packages`/`status` files and a parallel archive fetcher
//! - `resolver`: version selection and the depth-first closure walk
//! - `assembler`: the end-to-end pipeline around a rootfs builder

pub mod assembler;
pub mod config;
mod error;
pub mod index;
pub mod model;
pub mod resolver;
pub mod version;

pub use assembler::{
    Assembler, AssemblyReport, DirectoryRootfs, IndexProvider, ReleaseInfo,
    RepositoryIndexProvider, RootfsBuilder,
};
pub use config::AssemblerConfig;
pub use error::{Error, Result};
pub use index::{DependencyClause, MemoryIndex, PackageIndex, VersionedPackage};
pub use model::{Blueprint, LoadOptions, PackageList, PackageRef, PackageSet};
pub use resolver::{AlternationPolicy, ResolutionPlan, Resolver};
pub use version::{DebianVersion, DpkgOrder, Relation, VersionOrder, VersionRestriction};
