// src/index/memory.rs

//! In-process package index
//!
//! Holds package records, installed state, candidates and marks in memory.
//! It backs the command line fetcher (fed from `Packages`/`status` files)
//! and every resolver test.

use super::fetch::{ArchiveFetcher, ArchiveRequest};
use super::{DependencyClause, OrGroup, PackageIndex, VersionedPackage};
use crate::error::{Error, Result};
use crate::version::{DpkgOrder, VersionOrder};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A virtual name a package provides, optionally at a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provide {
    pub name: String,
    pub version: Option<String>,
}

/// One version of one package, as described by a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub depends: Vec<OrGroup>,
    pub provides: Vec<Provide>,
    /// Archive path relative to `base_url`
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub base_url: Option<String>,
    /// Known only from the installed state; there is no archive to fetch
    pub installed_only: bool,
}

impl PackageRecord {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    pub fn with_depends(mut self, depends: Vec<OrGroup>) -> Self {
        self.depends = depends;
        self
    }

    pub fn with_provides(mut self, provides: Vec<Provide>) -> Self {
        self.provides = provides;
        self
    }

    fn versioned(&self) -> VersionedPackage {
        VersionedPackage::new(&self.name, &self.version)
    }
}

/// Provider of a virtual name
#[derive(Debug, Clone)]
struct Provider {
    package: VersionedPackage,
    provided_version: Option<String>,
}

/// In-memory implementation of [`PackageIndex`]
pub struct MemoryIndex {
    order: Box<dyn VersionOrder>,
    records: BTreeMap<String, Vec<PackageRecord>>,
    providers: HashMap<String, Vec<Provider>>,
    installed: HashMap<String, String>,
    candidates: HashMap<String, String>,
    marked: Vec<VersionedPackage>,
    marked_names: HashSet<String>,
    fetcher: Option<Box<dyn ArchiveFetcher>>,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Empty index using dpkg version ordering
    pub fn new() -> Self {
        Self::with_order(Box::new(DpkgOrder))
    }

    pub fn with_order(order: Box<dyn VersionOrder>) -> Self {
        Self {
            order,
            records: BTreeMap::new(),
            providers: HashMap::new(),
            installed: HashMap::new(),
            candidates: HashMap::new(),
            marked: Vec::new(),
            marked_names: HashSet::new(),
            fetcher: None,
        }
    }

    /// Attach the fetcher used by [`PackageIndex::fetch_all`]
    pub fn set_fetcher(&mut self, fetcher: Box<dyn ArchiveFetcher>) {
        self.fetcher = Some(fetcher);
    }

    /// Add a record; a repeated name/version pair replaces the earlier one
    pub fn insert(&mut self, record: PackageRecord) {
        for provide in &record.provides {
            let entry = self.providers.entry(provide.name.clone()).or_default();
            entry.retain(|p| p.package != record.versioned());
            entry.push(Provider {
                package: record.versioned(),
                provided_version: provide.version.clone(),
            });
        }

        let versions = self.records.entry(record.name.clone()).or_default();
        match versions.iter_mut().find(|r| r.version == record.version) {
            Some(existing) => *existing = record,
            None => versions.push(record),
        }
    }

    /// Record `name` as installed on the target at `version`
    pub fn set_installed(&mut self, name: &str, version: &str) {
        self.insert_installed(PackageRecord::new(name, version));
    }

    /// Record an installed package
    ///
    /// The installed version joins the known versions unless a repository
    /// already describes it.
    pub fn insert_installed(&mut self, mut record: PackageRecord) {
        self.installed
            .insert(record.name.clone(), record.version.clone());
        if self.record(&record.versioned()).is_none() {
            record.installed_only = true;
            self.insert(record);
        }
    }

    pub fn installed_names(&self) -> impl Iterator<Item = &str> {
        self.installed.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, package: &VersionedPackage) -> Option<&PackageRecord> {
        self.records
            .get(&package.package)
            .and_then(|v| v.iter().find(|r| r.version == package.version))
    }

    fn marked_version(&self, name: &str) -> Option<&VersionedPackage> {
        if !self.marked_names.contains(name) {
            return None;
        }
        self.marked.iter().find(|m| m.package == name)
    }

    /// Highest version among `candidates`; the first listed wins ties
    fn best<'a>(&self, candidates: &'a [VersionedPackage]) -> Option<&'a VersionedPackage> {
        let mut best: Option<&VersionedPackage> = None;
        for candidate in candidates {
            let better = match best {
                Some(current) => {
                    self.order.compare(&candidate.version, &current.version)
                        == std::cmp::Ordering::Greater
                }
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }

    /// Whether the installed or marked state already satisfies a clause
    fn clause_satisfied(&self, clause: &DependencyClause) -> bool {
        let order = self.order.as_ref();
        if let Some(version) = self.installed.get(&clause.target) {
            if clause.accepts(version, order) {
                return true;
            }
        }
        if let Some(marked) = self.marked_version(&clause.target) {
            if clause.accepts(&marked.version, order) {
                return true;
            }
        }
        // Provided names
        self.satisfying_versions(clause).iter().any(|v| {
            self.installed.get(&v.package) == Some(&v.version)
                || self.marked_version(&v.package) == Some(v)
        })
    }

    fn group_satisfied(&self, group: &OrGroup) -> bool {
        group.iter().any(|clause| self.clause_satisfied(clause))
    }

    /// First alternative with any satisfying version, and its best version
    fn pick_alternative(&self, group: &OrGroup) -> Option<VersionedPackage> {
        group.iter().find_map(|clause| {
            let versions = self.satisfying_versions(clause);
            self.best(&versions).cloned()
        })
    }

    /// Mark `package` and, depth first, what its dependencies need
    fn mark_with_dependencies(&mut self, package: &VersionedPackage) -> Result<()> {
        if self.marked_version(&package.package) == Some(package) {
            return Ok(());
        }
        self.mark_install(package)?;

        let groups = self.dependencies_of(package)?;
        for group in &groups {
            if self.group_satisfied(group) {
                continue;
            }
            let choice = self.pick_alternative(group).ok_or_else(|| {
                let wanted: Vec<String> = group.iter().map(|c| c.to_string()).collect();
                debug!("{} needs {} which no version satisfies", package, wanted.join(" | "));
                Error::SolverConflict(package.package.clone())
            })?;
            self.candidates
                .insert(choice.package.clone(), choice.version.clone());
            self.mark_with_dependencies(&choice)?;
        }
        Ok(())
    }

    /// Move the mark of `name` from `existing` to `package`
    ///
    /// Fails, leaving the old mark, when a marked package depending on
    /// `name` would no longer be satisfied.
    fn switch_mark(&mut self, existing: &VersionedPackage, package: &VersionedPackage) -> Result<()> {
        let Some(slot) = self.marked.iter().position(|m| m == existing) else {
            return Err(Error::MarkInstallFailed {
                package: package.package.clone(),
                reason: format!("mark of {} is missing", existing),
            });
        };
        self.marked[slot] = package.clone();

        let dependents: Vec<VersionedPackage> = self
            .marked
            .iter()
            .filter(|m| m.package != package.package)
            .cloned()
            .collect();
        for dependent in &dependents {
            for group in self.dependencies_of(dependent)? {
                let names_package = group.iter().any(|c| c.target == package.package);
                if names_package && !self.group_satisfied(&group) {
                    self.marked[slot] = existing.clone();
                    let wanted: Vec<String> = group.iter().map(|c| c.to_string()).collect();
                    return Err(Error::MarkInstallFailed {
                        package: package.package.clone(),
                        reason: format!(
                            "version {} breaks {}, which depends on {} (marked at {})",
                            package.version,
                            dependent,
                            wanted.join(" | "),
                            existing.version
                        ),
                    });
                }
            }
        }

        debug!("Switching {} from {} to {}", package.package, existing.version, package.version);
        self.candidates
            .insert(package.package.clone(), package.version.clone());
        Ok(())
    }

    /// Archive requests for every marked package
    fn archive_requests(&self) -> Vec<ArchiveRequest> {
        self.marked
            .iter()
            .map(|m| {
                let record = self.record(m);
                ArchiveRequest {
                    package: m.clone(),
                    base_url: record.and_then(|r| r.base_url.clone()),
                    filename: record.and_then(|r| r.filename.clone()),
                    size: record.and_then(|r| r.size),
                    sha256: record.and_then(|r| r.sha256.clone()),
                }
            })
            .collect()
    }
}

impl PackageIndex for MemoryIndex {
    fn order(&self) -> &dyn VersionOrder {
        self.order.as_ref()
    }

    fn versions(&self, name: &str) -> Result<Vec<VersionedPackage>> {
        match self.records.get(name) {
            Some(records) if !records.is_empty() => {
                Ok(records.iter().map(PackageRecord::versioned).collect())
            }
            _ => Err(Error::PackageNotFound(name.to_string())),
        }
    }

    fn dependencies_of(&self, package: &VersionedPackage) -> Result<Vec<OrGroup>> {
        self.record(package)
            .map(|r| r.depends.clone())
            .ok_or_else(|| Error::PackageNotFound(package.to_string()))
    }

    fn satisfying_versions(&self, clause: &DependencyClause) -> Vec<VersionedPackage> {
        let order = self.order.as_ref();
        let mut out: Vec<VersionedPackage> = self
            .records
            .get(&clause.target)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| clause.accepts(&r.version, order))
                    .map(PackageRecord::versioned)
                    .collect()
            })
            .unwrap_or_default();

        if let Some(providers) = self.providers.get(&clause.target) {
            for provider in providers {
                let ok = match (&clause.relation, &provider.provided_version) {
                    (None, _) => true,
                    (Some(_), Some(version)) => clause.accepts(version, order),
                    (Some(_), None) => false,
                };
                if ok && !out.contains(&provider.package) {
                    out.push(provider.package.clone());
                }
            }
        }
        out
    }

    fn is_installed(&self, name: &str) -> bool {
        self.installed.contains_key(name)
    }

    fn is_marked_for_install(&self, name: &str) -> bool {
        self.marked_names.contains(name)
    }

    fn candidate(&self, name: &str) -> Option<VersionedPackage> {
        if let Some(version) = self.candidates.get(name) {
            return Some(VersionedPackage::new(name, version));
        }
        let versions = self.versions(name).ok()?;
        self.best(&versions).cloned()
    }

    fn set_candidate(&mut self, package: &VersionedPackage) -> Result<()> {
        if self.record(package).is_none() {
            return Err(Error::PackageNotFound(package.to_string()));
        }
        self.candidates
            .insert(package.package.clone(), package.version.clone());
        Ok(())
    }

    fn mark_install(&mut self, package: &VersionedPackage) -> Result<()> {
        let Some(record) = self.record(package) else {
            return Err(Error::PackageNotFound(package.to_string()));
        };
        if record.installed_only {
            debug!("{} is already installed", package);
            return Ok(());
        }
        if let Some(existing) = self.marked_version(&package.package).cloned() {
            if existing.version != package.version {
                return self.switch_mark(&existing, package);
            }
            return Ok(());
        }

        debug!("Marking {} for install", package);
        self.marked_names.insert(package.package.clone());
        self.marked.push(package.clone());
        Ok(())
    }

    fn install_with_default_solver(&mut self, package: &VersionedPackage) -> Result<()> {
        self.candidates
            .insert(package.package.clone(), package.version.clone());
        self.mark_with_dependencies(package)
    }

    fn repair_broken(&mut self) -> Result<()> {
        let mut broken = Vec::new();
        let mut index = 0;

        // Repairs may mark more packages; those are checked too
        while index < self.marked.len() {
            let package = self.marked[index].clone();
            index += 1;

            for group in self.dependencies_of(&package)? {
                if self.group_satisfied(&group) {
                    continue;
                }
                let fixed = match self.pick_alternative(&group) {
                    Some(choice) => {
                        warn!("Repairing {}: marking {}", package, choice);
                        self.mark_install(&choice).is_ok()
                    }
                    None => false,
                };
                if !fixed {
                    let wanted: Vec<String> = group.iter().map(|c| c.to_string()).collect();
                    broken.push(format!("{} depends on {}", package, wanted.join(" | ")));
                }
            }
        }

        if broken.is_empty() {
            Ok(())
        } else {
            Err(Error::BrokenDependencies(broken.join("; ")))
        }
    }

    fn marked(&self) -> Vec<VersionedPackage> {
        self.marked.clone()
    }

    fn fetch_all(&mut self) -> Result<Vec<PathBuf>> {
        let requests = self.archive_requests();
        let Some(fetcher) = self.fetcher.as_ref() else {
            debug!("No fetcher attached; {} archives not downloaded", requests.len());
            return Ok(Vec::new());
        };

        info!("Fetching {} archives", requests.len());
        fetcher.fetch(&requests).map_err(|e| match e {
            Error::FetchCancelled => Error::FetchCancelled,
            Error::FetchFailed(msg) => Error::FetchFailed(msg),
            other => Error::FetchFailed(other.to_string()),
        })
    }
}
