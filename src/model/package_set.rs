// src/model/package_set.rs

//! Package sets and the repositories they resolve against
//!
//! Every package set is resolved independently: it carries its own
//! repository sources, its own package lists and its own choice of solver.

use super::package::{PackageList, PackageRef};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One `deb` source: base URL, distribution and component
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositorySource {
    pub url: String,
    pub distribution: String,
    pub component: String,
}

impl RepositorySource {
    pub fn new(url: &str, distribution: &str, component: &str) -> Self {
        Self {
            url: url.to_string(),
            distribution: distribution.to_string(),
            component: component.to_string(),
        }
    }

    /// Render as a `sources.list` line
    ///
    /// Sources whose URL contains one of `trusted_markers` are written with
    /// `trusted=yes` so unsigned local mirrors are accepted.
    pub fn deb_line(&self, architecture: &str, trusted_markers: &[String]) -> String {
        let trusted = trusted_markers.iter().any(|m| self.url.contains(m.as_str()));
        let options = if trusted {
            format!("arch={} trusted=yes", architecture)
        } else {
            format!("arch={}", architecture)
        };
        format!(
            "deb [{}] {} {} {}",
            options, self.url, self.distribution, self.component
        )
    }
}

impl fmt::Display for RepositorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.url, self.distribution, self.component)
    }
}

/// Rule selecting which sources follow a release-wide distribution override
///
/// A source matches when its URL contains `contains` and, if set, does not
/// contain `unless_contains`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRule {
    pub contains: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless_contains: Option<String>,
}

impl MirrorRule {
    pub fn new(contains: &str, unless_contains: Option<&str>) -> Self {
        Self {
            contains: contains.to_string(),
            unless_contains: unless_contains.map(str::to_string),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        url.contains(self.contains.as_str())
            && !self
                .unless_contains
                .as_deref()
                .is_some_and(|excluded| url.contains(excluded))
    }
}

/// A named group of package lists resolved as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSet {
    pub name: String,
    /// Free-form kind tag, carried but not interpreted
    pub kind: String,
    pub use_default_solver: bool,
    pub platform: Option<String>,
    pub flavor: Option<String>,
    pub sources: Vec<RepositorySource>,
    pub lists: Vec<PackageList>,
}

impl PackageSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: String::new(),
            use_default_solver: false,
            platform: None,
            flavor: None,
            sources: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// A set with packages to resolve needs somewhere to resolve them from
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() && self.requested().next().is_some() {
            return Err(Error::ConfigurationError(format!(
                "Package set '{}' lists packages but has no repository sources",
                self.name
            )));
        }
        Ok(())
    }

    /// Every requested reference, across all lists, in document order
    pub fn requested(&self) -> impl Iterator<Item = &PackageRef> {
        self.lists.iter().flat_map(|l| l.packages.iter())
    }

    /// Requested package names, in document order, without duplicates
    pub fn package_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for package in self.requested() {
            if !names.iter().any(|n| n == package.name()) {
                names.push(package.name().to_string());
            }
        }
        names
    }

    /// Debian-format clauses for every requested reference
    pub fn debian_clauses(&self) -> Vec<String> {
        self.requested().flat_map(PackageRef::to_debian).collect()
    }

    /// Contents of the `sources.list` used to resolve this set
    pub fn sources_list(&self, architecture: &str, trusted_markers: &[String]) -> String {
        let mut out = String::new();
        for source in &self.sources {
            out.push_str(&source.deb_line(architecture, trusted_markers));
            out.push('\n');
        }
        out
    }

    /// Rewrite the distribution of every source matched by `rules`
    pub fn apply_distribution(&mut self, distribution: &str, rules: &[MirrorRule]) {
        for source in &mut self.sources {
            if rules.iter().any(|r| r.matches(&source.url)) {
                tracing::debug!(
                    "Package set {}: {} distribution {} -> {}",
                    self.name,
                    source.url,
                    source.distribution,
                    distribution
                );
                source.distribution = distribution.to_string();
            }
        }
    }
}

impl fmt::Display for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Package Set: {}", self.name)?;
        if !self.kind.is_empty() {
            writeln!(f, "  Kind: {}", self.kind)?;
        }
        if let Some(ref platform) = self.platform {
            writeln!(f, "  Platform: {}", platform)?;
        }
        if let Some(ref flavor) = self.flavor {
            writeln!(f, "  Flavor: {}", flavor)?;
        }
        writeln!(
            f,
            "  Solver: {}",
            if self.use_default_solver {
                "default"
            } else {
                "closure"
            }
        )?;
        for source in &self.sources {
            writeln!(f, "  Repository: {}", source)?;
        }
        for list in &self.lists {
            let suffix = if list.no_filter { " (no filter)" } else { "" };
            writeln!(f, "  Package list{}:", suffix)?;
            for package in &list.packages {
                writeln!(f, "    {}", package)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(packages: &[&str]) -> PackageSet {
        let mut set = PackageSet::new("base");
        set.sources.push(RepositorySource::new(
            "http://deb.openswitch.net",
            "stretch",
            "main",
        ));
        set.lists.push(PackageList::new(
            packages.iter().map(|p| PackageRef::parse(p).unwrap()).collect(),
            false,
        ));
        set
    }

    #[test]
    fn test_deb_line_trusted_marker() {
        let markers = vec!["copy:/mnt".to_string()];
        let local = RepositorySource::new("copy:/mnt/pool", "unstable", "main");
        assert_eq!(
            local.deb_line("amd64", &markers),
            "deb [arch=amd64 trusted=yes] copy:/mnt/pool unstable main"
        );
        let remote = RepositorySource::new("http://deb.debian.org/debian", "stretch", "main");
        assert_eq!(
            remote.deb_line("amd64", &markers),
            "deb [arch=amd64] http://deb.debian.org/debian stretch main"
        );
    }

    #[test]
    fn test_mirror_rule_exclusion() {
        let rule = MirrorRule::new("openswitch.net", Some("contrib"));
        assert!(rule.matches("http://deb.openswitch.net"));
        assert!(!rule.matches("http://deb.openswitch.net/contrib"));
        assert!(!rule.matches("http://deb.debian.org"));
    }

    #[test]
    fn test_apply_distribution() {
        let mut set = set_with(&["opx-base"]);
        set.sources.push(RepositorySource::new(
            "http://deb.openswitch.net/contrib",
            "stable",
            "main",
        ));
        set.apply_distribution("testing", &[MirrorRule::new("openswitch.net", Some("contrib"))]);
        assert_eq!(set.sources[0].distribution, "testing");
        assert_eq!(set.sources[1].distribution, "stable");
    }

    #[test]
    fn test_validate_requires_sources() {
        let mut set = set_with(&["opx-base"]);
        assert!(set.validate().is_ok());
        set.sources.clear();
        assert!(matches!(set.validate(), Err(Error::ConfigurationError(_))));
        set.lists.clear();
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_package_names_dedup() {
        let set = set_with(&["foo (>= 1.0)", "bar", "foo (<< 2.0)"]);
        assert_eq!(set.package_names(), vec!["foo", "bar"]);
        assert_eq!(set.debian_clauses(), vec!["foo(>=1.0)", "bar", "foo(<<2.0)"]);
    }
}
