// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pkgasm::assembler::{IndexProvider, ReleaseInfo, RootfsBuilder, archive_package_names};
use pkgasm::index::{ArchiveFetcher, ArchiveRequest, MemoryIndex, PackageRecord, parse_depends};
use pkgasm::model::{ArtifactNames, InstallHook, OutputFormat, PackageSet};
use pkgasm::{PackageIndex, Result};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Build an index from `(name, version, depends)` triples.
pub fn index_of(records: &[(&str, &str, &str)]) -> MemoryIndex {
    let mut index = MemoryIndex::new();
    for &(name, version, depends) in records {
        index.insert(
            PackageRecord::new(name, version).with_depends(parse_depends(depends).unwrap()),
        );
    }
    index
}

/// Fetcher that records every call and writes empty archives.
#[derive(Clone, Default)]
pub struct RecordingFetcher {
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
    pub dir: Option<PathBuf>,
}

impl RecordingFetcher {
    pub fn writing_to(dir: &Path) -> Self {
        Self {
            calls: Arc::default(),
            dir: Some(dir.to_path_buf()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ArchiveFetcher for RecordingFetcher {
    fn fetch(&self, requests: &[ArchiveRequest]) -> Result<Vec<PathBuf>> {
        self.calls
            .lock()
            .unwrap()
            .push(requests.iter().map(|r| r.package.to_string()).collect());

        let mut paths = Vec::new();
        if let Some(ref dir) = self.dir {
            for request in requests {
                let path = dir.join(request.file_name());
                fs::write(&path, b"")?;
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

/// Index provider serving the same repository to every set.
pub struct FakeProvider {
    pub packages: Vec<(String, String, String)>,
    pub opened: Mutex<Vec<String>>,
    /// Set names whose fetch writes nothing
    pub drop_archives_for: BTreeSet<String>,
}

impl FakeProvider {
    pub fn new(records: &[(&str, &str, &str)]) -> Self {
        Self {
            packages: records
                .iter()
                .map(|&(n, v, d)| (n.to_string(), v.to_string(), d.to_string()))
                .collect(),
            opened: Mutex::new(Vec::new()),
            drop_archives_for: BTreeSet::new(),
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl IndexProvider for FakeProvider {
    fn open(&self, set: &PackageSet, sysroot: &Path) -> Result<Box<dyn PackageIndex + Send>> {
        self.opened.lock().unwrap().push(set.name.clone());
        let records: Vec<(&str, &str, &str)> = self
            .packages
            .iter()
            .map(|(n, v, d)| (n.as_str(), v.as_str(), d.as_str()))
            .collect();
        let mut index = index_of(&records);
        let fetcher = if self.drop_archives_for.contains(&set.name) {
            RecordingFetcher::default()
        } else {
            RecordingFetcher::writing_to(&sysroot.join("archives"))
        };
        index.set_fetcher(Box::new(fetcher));
        Ok(Box::new(index))
    }
}

/// Rootfs collaborator that records the calls it receives.
pub struct FakeRootfs {
    pub dir: TempDir,
    pub installed: BTreeSet<String>,
    pub calls: Vec<String>,
    pub release: Option<ReleaseInfo>,
    pub skipped_install: Option<bool>,
    pub fail_cleanup: bool,
}

impl FakeRootfs {
    pub fn new(installed: &[&str]) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            installed: installed.iter().map(|s| s.to_string()).collect(),
            calls: Vec::new(),
            release: None,
            skipped_install: None,
            fail_cleanup: false,
        }
    }
}

impl RootfsBuilder for FakeRootfs {
    fn prepare(&mut self) -> Result<()> {
        self.calls.push("prepare".to_string());
        fs::create_dir_all(self.dir.path().join("archives"))?;
        Ok(())
    }

    fn installed_packages(&self) -> Result<BTreeSet<String>> {
        Ok(self.installed.clone())
    }

    fn sysroot(&self) -> &Path {
        self.dir.path()
    }

    fn fetched_packages(&self) -> Result<BTreeSet<String>> {
        archive_package_names(&self.dir.path().join("archives"))
    }

    fn install(&mut self, release: &ReleaseInfo, skip_packages: bool) -> Result<()> {
        self.calls.push("install".to_string());
        self.release = Some(release.clone());
        self.skipped_install = Some(skip_packages);
        Ok(())
    }

    fn copy_install_hooks(&mut self, hooks: &[InstallHook], distribution: &str) -> Result<()> {
        self.calls
            .push(format!("hooks {} {}", hooks.len(), distribution));
        Ok(())
    }

    fn build_outputs(
        &mut self,
        artifacts: &ArtifactNames,
        _output: &OutputFormat,
        _release: &ReleaseInfo,
    ) -> Result<Vec<PathBuf>> {
        self.calls.push("build_outputs".to_string());
        Ok(artifacts.iter().map(PathBuf::from).collect())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.calls.push("cleanup".to_string());
        if self.fail_cleanup {
            return Err(pkgasm::Error::IoError("cleanup failed".to_string()));
        }
        Ok(())
    }
}

/// A blueprint with one package set per `(name, packages)` entry.
pub fn blueprint_xml(sets: &[(&str, &str)], output: &str) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<blueprint xmlns:xi="http://www.w3.org/2001/XInclude">
  <description>OPX</description>
  <package_type>DEB</package_type>
  <platform>generic</platform>
  <architecture>amd64</architecture>
  <installer_suffix>stretch</installer_suffix>
  <version>1.0</version>
  <rootfs>
    <tar_name>opx-rootfs.tgz</tar_name>
    <source>http://dl.example.net/rootfs</source>
    <location>opx-rootfs</location>
  </rootfs>
"#,
    );
    xml.push_str(output);
    for (name, packages) in sets {
        xml.push_str(&format!(
            r#"  <package_set>
    <name>{name}</name>
    <type>opx</type>
    <package_desc>
      <url>http://deb.openswitch.net/stretch</url>
      <distribution>unstable</distribution>
      <component>main</component>
    </package_desc>
    <package_list>
{packages}
    </package_list>
  </package_set>
"#
        ));
    }
    xml.push_str("</blueprint>\n");
    xml
}

/// `<output_format>` with the given flags.
pub fn output_xml(tar: bool, onie_image: bool, onie_pkg: bool, cache: bool) -> String {
    let b = |v: bool| if v { "1" } else { "0" };
    format!(
        r#"  <output_format>
    <name>OPX</name>
    <version>3.2.0</version>
    <tar_archive>{}</tar_archive>
    <ONIE_image>{}</ONIE_image>
    <ONIE_pkg>{}</ONIE_pkg>
    <package_cache>{}</package_cache>
  </output_format>
"#,
        b(tar),
        b(onie_image),
        b(onie_pkg),
        b(cache)
    )
}

/// Names of the packages a map of plans installs.
pub fn installed_names(plans: &[(String, pkgasm::ResolutionPlan)]) -> HashMap<String, Vec<String>> {
    plans
        .iter()
        .map(|(set, plan)| {
            (
                set.clone(),
                plan.install.iter().map(|p| p.package.clone()).collect(),
            )
        })
        .collect()
}
