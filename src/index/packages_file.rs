// src/index/packages_file.rs

//! Debian `Packages` and dpkg `status` file loading
//!
//! Both files are sequences of RFC 822 style stanzas separated by blank
//! lines. Only the fields the resolver and fetcher need are decoded; the
//! rest are ignored.

use super::memory::{MemoryIndex, PackageRecord, Provide};
use super::parse_depends;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// A stanza of a repository `Packages` file
#[derive(Debug, Deserialize)]
struct PackagesStanza {
    #[serde(rename = "Package")]
    package: String,
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Depends")]
    depends: Option<String>,
    #[serde(rename = "Pre-Depends")]
    pre_depends: Option<String>,
    #[serde(rename = "Provides")]
    provides: Option<String>,
    #[serde(rename = "Filename")]
    filename: Option<String>,
    #[serde(rename = "Size")]
    size: Option<String>,
    #[serde(rename = "SHA256")]
    sha256: Option<String>,
}

/// A stanza of the dpkg `status` database
#[derive(Debug, Deserialize)]
struct StatusStanza {
    #[serde(rename = "Package")]
    package: String,
    #[serde(rename = "Version")]
    version: Option<String>,
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "Depends")]
    depends: Option<String>,
    #[serde(rename = "Pre-Depends")]
    pre_depends: Option<String>,
    #[serde(rename = "Provides")]
    provides: Option<String>,
}

fn parse_provides(field: &str) -> Result<Vec<Provide>> {
    parse_depends(field)?
        .into_iter()
        .flatten()
        .map(|clause| {
            Ok(Provide {
                name: clause.target,
                version: clause.relation.map(|(_, v)| v),
            })
        })
        .collect()
}

impl PackageRecord {
    fn from_stanza(stanza: PackagesStanza, base_url: Option<&str>) -> Result<Self> {
        let context = |e: Error| {
            Error::ParseError(format!("{} {}: {}", stanza.package, stanza.version, e))
        };

        let mut depends = Vec::new();
        if let Some(ref field) = stanza.pre_depends {
            depends.extend(parse_depends(field).map_err(context)?);
        }
        if let Some(ref field) = stanza.depends {
            depends.extend(parse_depends(field).map_err(context)?);
        }
        let provides = match stanza.provides {
            Some(ref field) => parse_provides(field).map_err(context)?,
            None => Vec::new(),
        };
        let size = match stanza.size {
            Some(ref size) => Some(size.trim().parse::<u64>().map_err(|e| {
                Error::ParseError(format!("{}: invalid Size '{}': {}", stanza.package, size, e))
            })?),
            None => None,
        };

        Ok(Self {
            name: stanza.package,
            version: stanza.version,
            depends,
            provides,
            filename: stanza.filename,
            size,
            sha256: stanza.sha256,
            base_url: base_url.map(str::to_string),
            installed_only: false,
        })
    }
}

impl MemoryIndex {
    /// Build an index from the text of a `Packages` file
    ///
    /// `base_url` is the repository root that `Filename` paths are relative
    /// to.
    pub fn from_packages_str(text: &str, base_url: Option<&str>) -> Result<Self> {
        let mut index = Self::new();
        index.add_packages_str(text, base_url)?;
        Ok(index)
    }

    /// Add every stanza of a `Packages` file
    pub fn add_packages_str(&mut self, text: &str, base_url: Option<&str>) -> Result<usize> {
        let stanzas: Vec<PackagesStanza> = rfc822_like::from_str(text)
            .map_err(|e| Error::ParseError(format!("Invalid Packages data: {}", e)))?;

        let count = stanzas.len();
        for stanza in stanzas {
            self.insert(PackageRecord::from_stanza(stanza, base_url)?);
        }
        debug!("Loaded {} package records", count);
        Ok(count)
    }

    pub fn add_packages_file(&mut self, path: &Path, base_url: Option<&str>) -> Result<usize> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.add_packages_str(&text, base_url)
    }

    /// Mark packages installed from the text of a dpkg `status` file
    ///
    /// Only stanzas whose `Status` ends in `installed` count. Installed
    /// versions become known versions, so dependencies on packages that
    /// only the target has are still satisfiable.
    pub fn load_status_str(&mut self, text: &str) -> Result<usize> {
        let stanzas: Vec<StatusStanza> = rfc822_like::from_str(text)
            .map_err(|e| Error::ParseError(format!("Invalid status data: {}", e)))?;

        let mut count = 0;
        for stanza in stanzas {
            let installed = stanza
                .status
                .as_deref()
                .and_then(|s| s.split_whitespace().last())
                == Some("installed");
            if !installed {
                continue;
            }
            let Some(version) = stanza.version else {
                warn!("Installed package {} has no version", stanza.package);
                continue;
            };
            let record = PackageRecord::from_stanza(
                PackagesStanza {
                    package: stanza.package,
                    version,
                    depends: stanza.depends,
                    pre_depends: stanza.pre_depends,
                    provides: stanza.provides,
                    filename: None,
                    size: None,
                    sha256: None,
                },
                None,
            )?;
            self.insert_installed(record);
            count += 1;
        }
        debug!("{} packages installed", count);
        Ok(count)
    }

    pub fn load_status_file(&mut self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.load_status_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DependencyClause, PackageIndex, VersionedPackage};

    const PACKAGES: &str = "\
Package: foo
Version: 2.0
Pre-Depends: dpkg (>= 1.15)
Depends: bar (= 3.0), libc6 (>= 2.24) | libc6.1
Provides: foo-api (= 2)
Filename: pool/main/f/foo/foo_2.0_amd64.deb
Size: 1024
SHA256: 0123abcd
Description: the foo
 with a long description

Package: bar
Version: 3.0
Filename: pool/main/b/bar/bar_3.0_amd64.deb
";

    const STATUS: &str = "\
Package: dpkg
Status: install ok installed
Version: 1.18.25
Pre-Depends: libc6 (>= 2.14)

Package: removed
Status: deinstall ok config-files
Version: 1.0
";

    #[test]
    fn test_load_packages() {
        let index = MemoryIndex::from_packages_str(PACKAGES, Some("http://deb.example.org")).unwrap();
        assert_eq!(index.len(), 2);

        let foo = VersionedPackage::new("foo", "2.0");
        let deps = index.dependencies_of(&foo).unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0][0].target, "dpkg");
        assert_eq!(deps[2].len(), 2);

        let api = index.satisfying_versions(&DependencyClause::parse("foo-api (>= 2)").unwrap());
        assert_eq!(api, vec![foo]);
    }

    #[test]
    fn test_load_status() {
        let mut index = MemoryIndex::new();
        assert_eq!(index.load_status_str(STATUS).unwrap(), 1);
        assert!(index.is_installed("dpkg"));
        assert!(!index.is_installed("removed"));

        let dpkg = VersionedPackage::new("dpkg", "1.18.25");
        assert_eq!(index.versions("dpkg").unwrap(), vec![dpkg.clone()]);
        assert_eq!(index.dependencies_of(&dpkg).unwrap()[0][0].target, "libc6");
    }

    #[test]
    fn test_installed_only_dependency_resolves() {
        use crate::model::PackageRef;
        use crate::resolver::Resolver;

        let packages = "\
Package: foo
Version: 2.0
Pre-Depends: dpkg (>= 1.15)
Depends: bar (= 3.0)

Package: bar
Version: 3.0
";
        let mut index = MemoryIndex::from_packages_str(packages, None).unwrap();
        index.load_status_str(STATUS).unwrap();

        let plan = Resolver::default()
            .resolve(&[PackageRef::parse("foo").unwrap()], &mut index, false)
            .unwrap();
        let names: Vec<&str> = plan.install.iter().map(|p| p.package.as_str()).collect();
        assert_eq!(names, vec!["bar", "foo"]);
        assert!(!index.is_marked_for_install("dpkg"));
    }

    #[test]
    fn test_bad_size_is_parse_error() {
        let text = "Package: x\nVersion: 1\nSize: big\n";
        assert!(matches!(
            MemoryIndex::from_packages_str(text, None),
            Err(Error::ParseError(_))
        ));
    }
}
