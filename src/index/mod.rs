// src/index/mod.rs

//! Package index abstraction
//!
//! The resolver never talks to a repository directly. It asks a
//! [`PackageIndex`] which versions exist, what they depend on and what is
//! already installed, and it tells the index what to mark, repair and
//! fetch. [`MemoryIndex`] is the in-process implementation, fed from Debian
//! `Packages` and dpkg `status` files.

pub mod fetch;
pub mod memory;
pub mod packages_file;

use crate::error::{Error, Result};
use crate::version::{Relation, VersionOrder};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use fetch::{ArchiveFetcher, ArchiveRequest, HttpFetcher};
pub use memory::{MemoryIndex, PackageRecord, Provide};

/// A concrete version of a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VersionedPackage {
    pub package: String,
    pub version: String,
}

impl VersionedPackage {
    pub fn new(package: &str, version: &str) -> Self {
        Self {
            package: package.to_string(),
            version: version.to_string(),
        }
    }
}

impl fmt::Display for VersionedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.package, self.version)
    }
}

/// One alternative of a Debian dependency: target name plus optional relation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyClause {
    pub target: String,
    pub relation: Option<(Relation, String)>,
}

impl DependencyClause {
    pub fn new(target: &str, relation: Option<(Relation, &str)>) -> Self {
        Self {
            target: target.to_string(),
            relation: relation.map(|(r, v)| (r, v.to_string())),
        }
    }

    /// Parse a single alternative such as `libc6:any (>= 2.24) [amd64]`
    ///
    /// `[arch]` and `<profile>` annotations are dropped.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();

        let (name_part, relation) = match text.find('(') {
            Some(open) => {
                let close = text[open..].find(')').ok_or_else(|| {
                    Error::ParseError(format!("Unterminated relation in '{}'", text))
                })?;
                let inner = &text[open + 1..open + close];
                (&text[..open], Some(parse_relation(inner.trim(), text)?))
            }
            None => {
                let end = text.find(['[', '<']).unwrap_or(text.len());
                (&text[..end], None)
            }
        };

        // Multi-arch qualifier: "python3:any"
        let name_part = name_part.trim();
        let target = name_part.split(':').next().unwrap_or(name_part);
        if target.is_empty() || target.contains(char::is_whitespace) {
            return Err(Error::ParseError(format!(
                "Invalid dependency '{}'",
                text
            )));
        }

        Ok(Self {
            target: target.to_string(),
            relation,
        })
    }

    /// Whether a concrete version of the target satisfies this clause
    pub fn accepts(&self, version: &str, order: &dyn VersionOrder) -> bool {
        match self.relation {
            Some((relation, ref bound)) => order.satisfies(version, relation, bound),
            None => true,
        }
    }
}

fn parse_relation(text: &str, whole: &str) -> Result<(Relation, String)> {
    let split = text
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '!'))
        .unwrap_or(text.len());
    let (op, version) = text.split_at(split);
    let relation = Relation::from_str(op.trim()).map_err(|_| {
        Error::ParseError(format!("Unknown relation '{}' in '{}'", op, whole))
    })?;
    let version = version.trim();
    if version.is_empty() {
        return Err(Error::ParseError(format!(
            "Missing version in '{}'",
            whole
        )));
    }
    Ok((relation, version.to_string()))
}

impl fmt::Display for DependencyClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.relation {
            Some((relation, ref version)) => write!(f, "{} ({} {})", self.target, relation, version),
            None => write!(f, "{}", self.target),
        }
    }
}

/// Alternatives of which any one satisfies the requirement
pub type OrGroup = Vec<DependencyClause>;

/// Parse a `Depends:` field into OR-groups
pub fn parse_depends(field: &str) -> Result<Vec<OrGroup>> {
    field
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(|group| group.split('|').map(DependencyClause::parse).collect())
        .collect()
}

/// What the resolver needs from a package repository
///
/// Package identity is the package name. Marking and candidate selection
/// are side effects on the index; [`PackageIndex::fetch_all`] downloads
/// whatever ended up marked.
pub trait PackageIndex {
    /// The version ordering of this repository
    fn order(&self) -> &dyn VersionOrder;

    /// Every known version of `name`, in enumeration order
    fn versions(&self, name: &str) -> Result<Vec<VersionedPackage>>;

    /// Dependency OR-groups of a concrete version
    fn dependencies_of(&self, package: &VersionedPackage) -> Result<Vec<OrGroup>>;

    /// Concrete versions (of any package, via Provides) satisfying a clause
    fn satisfying_versions(&self, clause: &DependencyClause) -> Vec<VersionedPackage>;

    fn is_installed(&self, name: &str) -> bool;

    fn is_marked_for_install(&self, name: &str) -> bool;

    /// Currently selected version of `name`, if any
    fn candidate(&self, name: &str) -> Option<VersionedPackage>;

    fn set_candidate(&mut self, package: &VersionedPackage) -> Result<()>;

    fn mark_install(&mut self, package: &VersionedPackage) -> Result<()>;

    /// Mark a package using the index's own dependency solver
    fn install_with_default_solver(&mut self, package: &VersionedPackage) -> Result<()>;

    /// Fix dependencies left unsatisfied by marking; fails if impossible
    fn repair_broken(&mut self) -> Result<()>;

    /// Everything marked for install, in marking order
    fn marked(&self) -> Vec<VersionedPackage>;

    /// Download archives of every marked package
    fn fetch_all(&mut self) -> Result<Vec<PathBuf>>;

    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.order().compare(a, b)
    }
}
