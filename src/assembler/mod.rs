// src/assembler/mod.rs

//! Release assembly pipeline
//!
//! Drives one blueprint through:
//!
//! 1. prepare the base rootfs and read what it already has installed
//! 2. drop requested packages the rootfs already has (unless the list is
//!    marked `no_package_filter`)
//! 3. resolve and fetch every package set against its own index
//! 4. verify that every requested package has an archive
//! 5. install, copy install hooks and build the output artifacts
//!
//! Rootfs handling and image building belong to a [`RootfsBuilder`];
//! package indexes come from an [`IndexProvider`]. Cleanup always runs and
//! its failures are only logged.

mod provider;
mod release;
mod rootfs;

pub use provider::RepositoryIndexProvider;
pub use release::ReleaseInfo;
pub use rootfs::DirectoryRootfs;

use crate::config::AssemblerConfig;
use crate::error::{Error, Result};
use crate::index::PackageIndex;
use crate::model::{ArtifactNames, Blueprint, InstallHook, OutputFormat, PackageSet};
use crate::resolver::{ResolutionPlan, ResolveObserver, Resolver};
use chrono::Local;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// The root filesystem being assembled
pub trait RootfsBuilder {
    /// Obtain and unpack the base rootfs
    fn prepare(&mut self) -> Result<()>;

    /// Names of packages installed in the base rootfs
    fn installed_packages(&self) -> Result<BTreeSet<String>>;

    /// Root directory package indexes and archives live under
    fn sysroot(&self) -> &Path;

    /// Names of packages whose archives are in the package cache
    fn fetched_packages(&self) -> Result<BTreeSet<String>>;

    /// Install the fetched packages (unless `skip_packages`) and write the
    /// release version information
    fn install(&mut self, release: &ReleaseInfo, skip_packages: bool) -> Result<()>;

    /// Ship install hooks into the image
    fn copy_install_hooks(&mut self, hooks: &[InstallHook], distribution: &str) -> Result<()>;

    /// Produce the requested artifacts; returns the paths created
    fn build_outputs(
        &mut self,
        artifacts: &ArtifactNames,
        output: &OutputFormat,
        release: &ReleaseInfo,
    ) -> Result<Vec<PathBuf>>;

    /// Remove temporary state; failures are logged by the caller
    fn cleanup(&mut self) -> Result<()>;
}

/// Source of a fresh package index for each package set
pub trait IndexProvider: Sync {
    fn open(&self, set: &PackageSet, sysroot: &Path) -> Result<Box<dyn PackageIndex + Send>>;
}

/// Drop already-installed packages from every list of every set
///
/// Returns the number of references removed.
pub fn filter_installed(blueprint: &mut Blueprint, installed: &BTreeSet<String>) -> usize {
    let mut removed = 0;
    for set in &mut blueprint.package_sets {
        for list in &mut set.lists {
            let filtered = list.filter_installed(installed);
            removed += list.packages.len() - filtered.packages.len();
            *list = filtered;
        }
    }
    removed
}

/// Every requested name must have been fetched
pub fn verify_resolved(requested: &BTreeSet<String>, fetched: &BTreeSet<String>) -> Result<()> {
    let missing: BTreeSet<String> = requested.difference(fetched).cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingPackages(missing))
    }
}

/// Package names of the `.deb` archives in a directory
///
/// The name is the part of the file name before the first `_`.
pub fn archive_package_names(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir)? {
        let file_name = entry?.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(stem) = file_name.strip_suffix(".deb") {
            let name = stem.split('_').next().unwrap_or(stem);
            names.insert(name.to_string());
        }
    }
    Ok(names)
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    /// Resolution plan of each package set, in blueprint order
    pub plans: Vec<(String, ResolutionPlan)>,
    pub release: ReleaseInfo,
    pub artifacts: Vec<PathBuf>,
}

/// Resolve one set against a freshly opened index
fn resolve_one(
    set: &PackageSet,
    provider: &dyn IndexProvider,
    resolver: &Resolver,
    cancel: &AtomicBool,
    sysroot: &Path,
) -> Result<ResolutionPlan> {
    if cancel.load(Ordering::SeqCst) {
        return Err(Error::Cancelled(set.name.clone()));
    }
    if set.requested().next().is_none() {
        debug!("Package set {} has nothing left to resolve", set.name);
        return Ok(ResolutionPlan::default());
    }

    info!(
        "Resolving package set {} ({}): {}",
        set.name,
        set.kind,
        set.debian_clauses().join(", ")
    );
    let mut index = provider.open(set, sysroot)?;
    let plan = resolver.resolve_set(set, index.as_mut())?;
    info!(
        "Package set {}: {} packages to install",
        set.name,
        plan.install.len()
    );
    Ok(plan)
}

/// Runs the assembly pipeline for blueprints
pub struct Assembler<R, P> {
    config: AssemblerConfig,
    resolver: Resolver,
    rootfs: R,
    provider: P,
    cancel: Arc<AtomicBool>,
}

impl<R: RootfsBuilder, P: IndexProvider> Assembler<R, P> {
    pub fn new(config: AssemblerConfig, rootfs: R, provider: P) -> Result<Self> {
        config.validate()?;
        let resolver = Resolver::new(config.alternation_policy());
        Ok(Self {
            config,
            resolver,
            rootfs,
            provider,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResolveObserver>) -> Self {
        self.resolver = self.resolver.with_observer(observer);
        self
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the run before the next package set starts
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn rootfs(&self) -> &R {
        &self.rootfs
    }

    /// Assemble `blueprint`; its package lists are filtered in place
    pub fn run(&mut self, blueprint: &mut Blueprint) -> Result<AssemblyReport> {
        blueprint.validate()?;

        let result = self.run_pipeline(blueprint);

        if let Err(e) = self.rootfs.cleanup() {
            warn!("Cleanup failed: {}", e);
        }
        result
    }

    fn run_pipeline(&mut self, blueprint: &mut Blueprint) -> Result<AssemblyReport> {
        self.rootfs.prepare()?;
        let installed = self.rootfs.installed_packages()?;

        let removed = filter_installed(blueprint, &installed);
        info!("{} requested packages already in the rootfs", removed);

        let plans = self.resolve_sets(&blueprint.package_sets)?;

        let requested = blueprint.requested_names();
        let fetched = self.rootfs.fetched_packages()?;
        debug!("Expected packages: {:?}", requested);
        debug!("Fetched packages: {:?}", fetched);
        verify_resolved(&requested, &fetched)?;

        let release = ReleaseInfo::new(blueprint, &self.config, Local::now());
        self.rootfs.install(&release, blueprint.output.onie_pkg)?;
        self.rootfs
            .copy_install_hooks(&blueprint.inst_hooks, &self.config.distribution)?;

        let names = blueprint.artifact_names(self.config.build_number, &self.config.build_suffix);
        let artifacts = self
            .rootfs
            .build_outputs(&names, &blueprint.output, &release)?;

        Ok(AssemblyReport {
            plans,
            release,
            artifacts,
        })
    }

    fn resolve_sets(&self, sets: &[PackageSet]) -> Result<Vec<(String, ResolutionPlan)>> {
        let sysroot = self.rootfs.sysroot().to_path_buf();
        let provider: &dyn IndexProvider = &self.provider;
        let resolver = &self.resolver;
        let cancel = self.cancel.as_ref();

        let resolve = |set: &PackageSet| {
            resolve_one(set, provider, resolver, cancel, &sysroot).map(|p| (set.name.clone(), p))
        };

        if self.config.parallel_sets {
            sets.par_iter().map(resolve).collect()
        } else {
            sets.iter().map(resolve).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PackageList, PackageRef};
    use tempfile::TempDir;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_verify_resolved() {
        assert!(verify_resolved(&names(&["a", "b"]), &names(&["a", "b", "c"])).is_ok());
        match verify_resolved(&names(&["a", "b"]), &names(&["a"])) {
            Err(Error::MissingPackages(missing)) => assert_eq!(missing, names(&["b"])),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_archive_package_names() {
        let dir = TempDir::new().unwrap();
        for file in ["foo_1.0_amd64.deb", "libbar1_2.0-1_all.deb", "notes.txt"] {
            std::fs::write(dir.path().join(file), b"").unwrap();
        }
        assert_eq!(
            archive_package_names(dir.path()).unwrap(),
            names(&["foo", "libbar1"])
        );
        assert!(archive_package_names(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_filter_installed_counts() {
        let mut set = PackageSet::new("base");
        set.lists.push(PackageList::new(
            vec![PackageRef::parse("bash").unwrap(), PackageRef::parse("opx").unwrap()],
            false,
        ));
        set.lists.push(PackageList::new(vec![PackageRef::parse("bash").unwrap()], true));

        let mut blueprint = crate::assembler::tests_support::blueprint_with(vec![set]);
        let removed = filter_installed(&mut blueprint, &names(&["bash"]));
        assert_eq!(removed, 1);
        assert_eq!(blueprint.requested_names(), names(&["bash", "opx"]));
        assert_eq!(blueprint.package_sets[0].lists[0].packages.len(), 1);
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use crate::model::{Blueprint, OutputFormat, PackageSet, RootfsDescriptor};

    pub fn blueprint_with(package_sets: Vec<PackageSet>) -> Blueprint {
        Blueprint {
            description: "test".to_string(),
            package_type: "DEB".to_string(),
            platform: "generic".to_string(),
            architecture: "amd64".to_string(),
            installer_suffix: "stretch".to_string(),
            version: "1.0".to_string(),
            rootfs: RootfsDescriptor {
                tar_name: "rootfs.tgz".to_string(),
                source: "http://mirror".to_string(),
                location: "rootfs.tgz".to_string(),
                md5: None,
                sha1: None,
            },
            output: OutputFormat {
                name: "OPX".to_string(),
                version: "1.0".to_string(),
                tar_archive: false,
                onie_image: false,
                onie_pkg: false,
                package_cache: false,
            },
            package_sets,
            inst_hooks: Vec::new(),
        }
    }
}
