// src/model/package.rs

//! Package references and package lists
//!
//! A package reference names a Debian package and, optionally, the version
//! interval it must fall into. References come from blueprint `<package>`
//! elements, either as `name`/`version` attributes or as legacy inline text
//! such as `libfoo (>= 1.2)`.

use crate::error::{Error, Result};
use crate::version::restriction::VERSION_PATTERN;
use crate::version::{Relation, VersionRestriction};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Debian package name grammar (at least two characters)
pub(crate) const NAME_PATTERN: &str = r"[A-Za-z0-9][A-Za-z0-9+.-]+";

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\A{}\z", NAME_PATTERN)).unwrap_or_else(|e| panic!("name grammar: {e}"))
});

/// Legacy inline form: `name` or `name (op version)`
static INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\A({n})\s*(?:\(\s*(<<|<=|!=|=|>=|>>|<|>)\s*({v})\s*\))?\z",
        n = NAME_PATTERN,
        v = VERSION_PATTERN
    ))
    .unwrap_or_else(|e| panic!("inline package grammar: {e}"))
});

/// A request for a package, optionally restricted to a version interval
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRef {
    name: String,
    restriction: Option<VersionRestriction>,
}

impl PackageRef {
    /// Create a reference after validating the package name
    pub fn new(name: &str, restriction: Option<VersionRestriction>) -> Result<Self> {
        let name = name.trim();
        if !NAME_RE.is_match(name) {
            return Err(Error::ParseError(format!(
                "Invalid package name: '{}'",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            restriction,
        })
    }

    /// Build from `<package name=".." version=".."/>` attributes
    pub fn from_attributes(name: &str, version: Option<&str>) -> Result<Self> {
        let restriction = version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(VersionRestriction::parse)
            .transpose()?;
        Self::new(name, restriction)
    }

    /// Parse package text
    ///
    /// Accepts the legacy inline form (`libfoo (>= 1.2)`) and the form
    /// produced by `Display` (`libfoo [1.2,)`).
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();

        if let Some(caps) = INLINE_RE.captures(text) {
            let restriction = match (caps.get(2), caps.get(3)) {
                (Some(op), Some(version)) => {
                    let relation = Relation::from_str(op.as_str()).map_err(|_| {
                        Error::ParseError(format!("Unknown relation in '{}'", text))
                    })?;
                    Some(VersionRestriction::from_relation(relation, version.as_str()))
                }
                _ => None,
            };
            return Self::new(&caps[1], restriction);
        }

        match text.split_once(char::is_whitespace) {
            Some((name, spec)) => {
                Self::new(name, Some(VersionRestriction::parse(spec.trim())?))
            }
            None => Err(Error::ParseError(format!(
                "Can't parse package: ->{}<-",
                text
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn restriction(&self) -> Option<&VersionRestriction> {
        self.restriction.as_ref()
    }

    /// Debian-format clauses, one per bound: `["foo(>=1.0)", "foo(<<2.0)"]`
    pub fn to_debian(&self) -> Vec<String> {
        match self.restriction {
            Some(ref restriction) => restriction
                .to_debian()
                .into_iter()
                .map(|r| format!("{}({})", self.name, r))
                .collect(),
            None => vec![self.name.clone()],
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.restriction {
            Some(ref restriction) => write!(f, "{} {}", self.name, restriction),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for PackageRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// An ordered list of package references
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageList {
    /// Keep packages even when the base rootfs already has them
    pub no_filter: bool,
    pub packages: Vec<PackageRef>,
}

impl PackageList {
    pub fn new(packages: Vec<PackageRef>, no_filter: bool) -> Self {
        Self {
            no_filter,
            packages,
        }
    }

    /// Drop references to packages that are already installed
    ///
    /// Lists marked `no_filter` come back unchanged.
    pub fn filter_installed(&self, installed: &BTreeSet<String>) -> PackageList {
        if self.no_filter {
            return self.clone();
        }

        PackageList {
            no_filter: false,
            packages: self
                .packages
                .iter()
                .filter(|p| !installed.contains(p.name()))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
