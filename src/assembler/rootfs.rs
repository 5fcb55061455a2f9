// src/assembler/rootfs.rs

//! Rootfs kept in a plain directory
//!
//! The base image is either an existing directory or a gzipped tarball
//! unpacked into it. Archives land in the sysroot's apt cache and the
//! package cache and rootfs artifacts are written as `.tgz` files into the
//! output directory. A base tarball is checked against the MD5 and SHA1
//! digests of its blueprint descriptor before it is unpacked. Running
//! package maintainer scripts in a chroot and building ONIE installers
//! need external tooling and are not done here.

use super::provider::{ARCHIVES_DIR, STATUS_FILE};
use super::{RootfsBuilder, archive_package_names};
use super::release::ReleaseInfo;
use crate::error::{Error, Result};
use crate::index::MemoryIndex;
use crate::model::{ArtifactNames, InstallHook, OutputFormat, RootfsDescriptor};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use md5::Md5;
use regex::Regex;
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tar::{Archive, Builder};
use tracing::{debug, info, warn};

/// Release version file, relative to the root
pub const RELEASE_FILE: &str = "etc/OPX-release-version";

/// Where install hooks are shipped, relative to the root
pub const HOOKS_DIR: &str = "root/hooks";

/// Hooks whose apt sources follow the requested distribution
const APT_SOURCES_HOOK_PREFIX: &str = "98-set-apt-sources";

/// Apt state that must not leak into the finished image
const APT_STATE: &[&str] = &[
    "etc/apt/sources.list",
    "etc/apt/sources.list.save",
    "var/cache/apt/pkgcache.bin",
];

static APT_SOURCE_DIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(openswitch\.net/[^\s/]+) unstable").unwrap_or_else(|e| {
        panic!("invalid apt source pattern: {}", e)
    })
});

/// Point `openswitch.net/<codename> unstable` sources at `distribution`
pub fn rewrite_apt_sources(script: &str, distribution: &str) -> String {
    APT_SOURCE_DIST
        .replace_all(script, |caps: &regex::Captures| {
            format!("{} {}", &caps[1], distribution)
        })
        .into_owned()
}

fn file_digest<D: Digest + Write>(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn check_digest(expected: &str, actual: String) -> Result<()> {
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// Check a base tarball against the digests its descriptor carries
pub fn verify_base_archive(path: &Path, descriptor: &RootfsDescriptor) -> Result<()> {
    if let Some(ref expected) = descriptor.md5 {
        check_digest(expected, file_digest::<Md5>(path)?)?;
        debug!("MD5 of {} matches", path.display());
    }
    if let Some(ref expected) = descriptor.sha1 {
        check_digest(expected, file_digest::<Sha1>(path)?)?;
        debug!("SHA1 of {} matches", path.display());
    }
    Ok(())
}

/// [`RootfsBuilder`] over a local directory
pub struct DirectoryRootfs {
    root: PathBuf,
    output_dir: PathBuf,
    base_archive: Option<PathBuf>,
    base_descriptor: Option<RootfsDescriptor>,
}

impl DirectoryRootfs {
    pub fn new(root: &Path, output_dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            base_archive: None,
            base_descriptor: None,
        }
    }

    /// Unpack this gzipped tarball into the root during `prepare`
    pub fn with_base_archive(mut self, archive: &Path) -> Self {
        self.base_archive = Some(archive.to_path_buf());
        self
    }

    /// Verify the base tarball against this descriptor's digests
    pub fn with_base_descriptor(mut self, descriptor: &RootfsDescriptor) -> Self {
        self.base_descriptor = Some(descriptor.clone());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn archives_dir(&self) -> PathBuf {
        self.root.join(ARCHIVES_DIR)
    }

    fn cached_archives(&self) -> Result<Vec<PathBuf>> {
        let dir = self.archives_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut archives = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "deb") {
                archives.push(path);
            }
        }
        archives.sort();
        Ok(archives)
    }

    fn write_package_cache(&self, dest: &Path, archives: &[PathBuf]) -> Result<()> {
        info!("Creating {}", dest.display());
        let encoder = GzEncoder::new(File::create(dest)?, Compression::default());
        let mut builder = Builder::new(encoder);
        for archive in archives {
            let name = archive.file_name().ok_or_else(|| {
                Error::IoError(format!("Invalid archive path {}", archive.display()))
            })?;
            builder.append_path_with_name(archive, name)?;
        }
        builder.into_inner()?.finish()?;
        Ok(())
    }

    fn write_rootfs_archive(&self, dest: &Path) -> Result<()> {
        info!("Creating {}", dest.display());
        let encoder = GzEncoder::new(File::create(dest)?, Compression::default());
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &self.root)?;
        builder.into_inner()?.finish()?;
        Ok(())
    }

    /// Let the installer use the shipped package cache as a repository
    fn write_installer_sources(&self) -> Result<()> {
        let dir = self.root.join("etc/apt/sources.list.d");
        fs::create_dir_all(&dir)?;
        fs::write(
            dir.join("installer.list"),
            "#-ONIE REMOVE START\n# Added for special installer use\ndeb file:/var/cache/apt/archives ./\n",
        )?;
        Ok(())
    }

    fn remove_quietly(&self, path: &Path) {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

impl RootfsBuilder for DirectoryRootfs {
    fn prepare(&mut self) -> Result<()> {
        if let Some(ref archive) = self.base_archive {
            if let Some(ref descriptor) = self.base_descriptor {
                verify_base_archive(archive, descriptor)?;
            }
            info!(
                "Unpacking {} into {}",
                archive.display(),
                self.root.display()
            );
            fs::create_dir_all(&self.root)?;
            let mut tarball = Archive::new(GzDecoder::new(File::open(archive)?));
            tarball.set_preserve_permissions(true);
            tarball.unpack(&self.root)?;
        } else if !self.root.is_dir() {
            return Err(Error::ConfigurationError(format!(
                "Rootfs directory {} does not exist",
                self.root.display()
            )));
        }

        fs::create_dir_all(self.archives_dir())?;
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn installed_packages(&self) -> Result<BTreeSet<String>> {
        let status = self.root.join(STATUS_FILE);
        if !status.exists() {
            return Ok(BTreeSet::new());
        }
        let mut index = MemoryIndex::new();
        index.load_status_file(&status)?;
        Ok(index.installed_names().map(str::to_string).collect())
    }

    fn sysroot(&self) -> &Path {
        &self.root
    }

    fn fetched_packages(&self) -> Result<BTreeSet<String>> {
        archive_package_names(&self.archives_dir())
    }

    fn install(&mut self, release: &ReleaseInfo, skip_packages: bool) -> Result<()> {
        if !skip_packages {
            warn!(
                "{} archives left unpacked in {}; run dpkg in the rootfs to install them",
                self.cached_archives()?.len(),
                ARCHIVES_DIR
            );
        }

        let path = self.root.join(RELEASE_FILE);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, release.file_contents())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
        }
        info!("Wrote {}", path.display());
        Ok(())
    }

    fn copy_install_hooks(&mut self, hooks: &[InstallHook], distribution: &str) -> Result<()> {
        let dest_dir = self.root.join(HOOKS_DIR);
        fs::create_dir_all(&dest_dir)?;

        for hook in hooks {
            let dest = dest_dir.join(&hook.file_name);
            fs::copy(&hook.path, &dest)?;
            if hook.file_name.starts_with(APT_SOURCES_HOOK_PREFIX) {
                let script = fs::read_to_string(&dest)?;
                fs::write(&dest, rewrite_apt_sources(&script, distribution))?;
            }
            debug!("Copied install hook {}", hook.file_name);
        }
        Ok(())
    }

    fn build_outputs(
        &mut self,
        artifacts: &ArtifactNames,
        output: &OutputFormat,
        _release: &ReleaseInfo,
    ) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        let archives = self.cached_archives()?;

        if let Some(ref name) = artifacts.package_cache {
            if archives.is_empty() {
                warn!("Package cache is empty, not creating {}", name);
            } else {
                let dest = self.output_dir.join(name);
                self.write_package_cache(&dest, &archives)?;
                created.push(dest);
            }
        }

        if output.onie_pkg {
            self.write_installer_sources()?;
        } else {
            for archive in &archives {
                self.remove_quietly(archive);
            }
        }

        for path in APT_STATE {
            let path = self.root.join(path);
            if path.exists() {
                self.remove_quietly(&path);
            }
        }
        let tmp = self.root.join("tmp");
        if tmp.is_dir() {
            for entry in fs::read_dir(&tmp)? {
                self.remove_quietly(&entry?.path());
            }
        }

        if let Some(ref name) = artifacts.rootfs_archive {
            let dest = self.output_dir.join(name);
            self.write_rootfs_archive(&dest)?;
            created.push(dest);
        }

        if let Some(ref name) = artifacts.installer {
            warn!("Installer image {} must be built with the ONIE tooling", name);
        }

        Ok(created)
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.base_archive.is_some() {
            debug!("Leaving unpacked rootfs at {}", self.root.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssemblerConfig;
    use crate::model::{Blueprint, LoadOptions};
    use chrono::Local;
    use tempfile::TempDir;

    fn release() -> ReleaseInfo {
        let xml = r#"<?xml version="1.0"?>
<blueprint>
  <description>OPX</description>
  <package_type>DEB</package_type>
  <platform>generic</platform>
  <architecture>amd64</architecture>
  <installer_suffix>stretch</installer_suffix>
  <version>1.0</version>
  <rootfs>
    <tar_name>rootfs.tgz</tar_name>
    <source>http://mirror</source>
    <location>rootfs.tgz</location>
  </rootfs>
  <output_format>
    <name>OPX</name>
    <version>3.2.0</version>
    <tar_archive>1</tar_archive>
    <ONIE_image>0</ONIE_image>
    <ONIE_pkg>0</ONIE_pkg>
    <package_cache>1</package_cache>
  </output_format>
</blueprint>"#;
        let blueprint = Blueprint::from_xml(xml, &LoadOptions::default()).unwrap();
        ReleaseInfo::new(&blueprint, &AssemblerConfig::default(), Local::now())
    }

    #[test]
    fn test_rewrite_apt_sources() {
        let script = "echo 'deb http://deb.openswitch.net/stretch unstable main' > list\n\
                      echo 'deb http://other.net/stretch unstable main'\n";
        let rewritten = rewrite_apt_sources(script, "2.3");
        assert!(rewritten.contains("openswitch.net/stretch 2.3 main"));
        assert!(rewritten.contains("other.net/stretch unstable main"));
    }

    #[test]
    fn test_prepare_requires_root() {
        let dir = TempDir::new().unwrap();
        let mut rootfs = DirectoryRootfs::new(&dir.path().join("missing"), dir.path());
        assert!(matches!(
            rootfs.prepare(),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_installed_and_fetched_packages() {
        let root = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut rootfs = DirectoryRootfs::new(root.path(), out.path());
        rootfs.prepare().unwrap();

        fs::create_dir_all(root.path().join("var/lib/dpkg")).unwrap();
        fs::write(
            root.path().join(STATUS_FILE),
            "Package: bash\nStatus: install ok installed\nVersion: 4.4\n\n\
             Package: vim\nStatus: deinstall ok config-files\nVersion: 8.0\n",
        )
        .unwrap();
        fs::write(root.path().join(ARCHIVES_DIR).join("opx_1.0_amd64.deb"), b"x").unwrap();

        let installed = rootfs.installed_packages().unwrap();
        assert!(installed.contains("bash"));
        assert!(!installed.contains("vim"));
        assert!(rootfs.fetched_packages().unwrap().contains("opx"));
    }

    #[test]
    fn test_install_writes_release_file() {
        let root = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut rootfs = DirectoryRootfs::new(root.path(), out.path());
        rootfs.prepare().unwrap();
        rootfs.install(&release(), true).unwrap();

        let contents = fs::read_to_string(root.path().join(RELEASE_FILE)).unwrap();
        assert!(contents.contains("OS_VERSION=\"3.2.0\""));
    }

    #[test]
    fn test_build_outputs_archives() {
        let root = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut rootfs = DirectoryRootfs::new(root.path(), out.path());
        rootfs.prepare().unwrap();
        let deb = root.path().join(ARCHIVES_DIR).join("opx_1.0_amd64.deb");
        fs::write(&deb, b"archive").unwrap();
        fs::create_dir_all(root.path().join("etc/apt")).unwrap();
        fs::write(root.path().join("etc/apt/sources.list"), "deb x y z\n").unwrap();

        let output = OutputFormat {
            name: "OPX".to_string(),
            version: "1.0".to_string(),
            tar_archive: true,
            onie_image: false,
            onie_pkg: false,
            package_cache: true,
        };
        let names = output.artifact_names("stretch", 0, "");
        let created = rootfs.build_outputs(&names, &output, &release()).unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|p| p.exists()));
        assert!(!deb.exists());
        assert!(!root.path().join("etc/apt/sources.list").exists());

        let cache = File::open(out.path().join("OPX-1.0-stretch-pkg_cache.tgz")).unwrap();
        let mut archive = Archive::new(GzDecoder::new(cache));
        let entries: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert_eq!(entries, vec!["opx_1.0_amd64.deb"]);
    }

    #[test]
    fn test_onie_pkg_keeps_cache() {
        let root = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut rootfs = DirectoryRootfs::new(root.path(), out.path());
        rootfs.prepare().unwrap();
        let deb = root.path().join(ARCHIVES_DIR).join("opx_1.0_amd64.deb");
        fs::write(&deb, b"archive").unwrap();

        let output = OutputFormat {
            name: "OPX".to_string(),
            version: "1.0".to_string(),
            tar_archive: false,
            onie_image: false,
            onie_pkg: true,
            package_cache: false,
        };
        let names = output.artifact_names("stretch", 0, "");
        let created = rootfs.build_outputs(&names, &output, &release()).unwrap();

        assert!(created.is_empty());
        assert!(deb.exists());
        assert!(root
            .path()
            .join("etc/apt/sources.list.d/installer.list")
            .exists());
    }

    fn base_tarball(dir: &Path) -> PathBuf {
        let path = dir.join("base.tgz");
        let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut builder = Builder::new(encoder);
        let data = b"base\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "etc/hostname", &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    fn descriptor(md5: Option<String>, sha1: Option<String>) -> RootfsDescriptor {
        RootfsDescriptor {
            tar_name: "base.tgz".to_string(),
            source: "http://mirror".to_string(),
            location: "base.tgz".to_string(),
            md5,
            sha1,
        }
    }

    #[test]
    fn test_base_archive_digests_verified() {
        let scratch = TempDir::new().unwrap();
        let tarball = base_tarball(scratch.path());
        let bytes = fs::read(&tarball).unwrap();
        let md5 = hex::encode(Md5::digest(&bytes));
        let sha1 = hex::encode(Sha1::digest(&bytes));

        let root = scratch.path().join("root");
        let mut rootfs = DirectoryRootfs::new(&root, &scratch.path().join("out"))
            .with_base_archive(&tarball)
            .with_base_descriptor(&descriptor(Some(md5.to_uppercase()), Some(sha1)));
        rootfs.prepare().unwrap();
        assert_eq!(fs::read_to_string(root.join("etc/hostname")).unwrap(), "base\n");
    }

    #[test]
    fn test_base_archive_digest_mismatch() {
        let scratch = TempDir::new().unwrap();
        let tarball = base_tarball(scratch.path());
        let bytes = fs::read(&tarball).unwrap();
        let md5 = hex::encode(Md5::digest(&bytes));

        let root = scratch.path().join("root");
        let mut rootfs = DirectoryRootfs::new(&root, &scratch.path().join("out"))
            .with_base_archive(&tarball)
            .with_base_descriptor(&descriptor(Some(md5), Some("0".repeat(40))));

        match rootfs.prepare() {
            Err(Error::ChecksumMismatch { expected, .. }) => assert_eq!(expected, "0".repeat(40)),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!root.join("etc/hostname").exists());
    }
}
