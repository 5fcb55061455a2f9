// src/model/blueprint.rs

//! Release blueprints
//!
//! A blueprint describes one release build: where the base rootfs comes
//! from, which package sets go into it, which install hooks run on the
//! target, and which artifacts are produced. It is read from XML once,
//! validated, and then only read by the assembler.
//!
//! ```xml
//! <blueprint>
//!   <description>OPX</description>
//!   <package_type>DEB</package_type>
//!   <platform>generic</platform>
//!   <architecture>amd64</architecture>
//!   <installer_suffix>deb9</installer_suffix>
//!   <version>1.0</version>
//!   <rootfs>
//!     <tar_name>opx-rootfs.tar.gz</tar_name>
//!     <source>http://example.org/rootfs</source>
//!     <location>opx-rootfs.tar.gz</location>
//!   </rootfs>
//!   <output_format>
//!     <name>PKGS_OPX</name>
//!     <version>1.0</version>
//!     <tar_archive>false</tar_archive>
//!     <ONIE_image>true</ONIE_image>
//!     <ONIE_pkg>false</ONIE_pkg>
//!     <package_cache>false</package_cache>
//!   </output_format>
//!   <package_set>
//!     <name>opx</name>
//!     <type>opx</type>
//!     <package_desc>
//!       <url>http://deb.openswitch.net</url>
//!       <distribution>stretch</distribution>
//!       <component>main</component>
//!     </package_desc>
//!     <package_list>
//!       <package name="opx-base" version="[1.0,)"/>
//!     </package_list>
//!   </package_set>
//!   <inst_hook>98-set-apt-sources.postinst.sh</inst_hook>
//! </blueprint>
//! ```

use super::package::{PackageList, PackageRef};
use super::package_set::{MirrorRule, PackageSet, RepositorySource};
use super::xml::Element;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

const XINCLUDE_NS: &str = "http://www.w3.org/2001/XInclude";

/// Parse an XML boolean: `1`/`true`/`0`/`false`, trimmed, any case
pub fn parse_bool(text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(Error::ParseError(format!(
            "Invalid boolean value '{}'",
            other
        ))),
    }
}

fn bool_text(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Where the base root filesystem archive comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootfsDescriptor {
    pub tar_name: String,
    pub source: String,
    pub location: String,
    pub md5: Option<String>,
    pub sha1: Option<String>,
}

impl RootfsDescriptor {
    /// Download URL of the archive: `source/tar_name`
    pub fn url(&self) -> String {
        if self.source.ends_with('/') {
            format!("{}{}", self.source, self.tar_name)
        } else {
            format!("{}/{}", self.source, self.tar_name)
        }
    }
}

/// Which artifacts the release produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    pub name: String,
    pub version: String,
    pub tar_archive: bool,
    pub onie_image: bool,
    pub onie_pkg: bool,
    pub package_cache: bool,
}

impl OutputFormat {
    /// The ONIE image and the ONIE package-cache installer are exclusive
    pub fn validate(&self) -> Result<()> {
        if self.onie_image && self.onie_pkg {
            return Err(Error::ConfigurationError(
                "ONIE_pkg and ONIE_image are mutually exclusive, but both are true".to_string(),
            ));
        }
        Ok(())
    }

    /// Common artifact prefix: `[PKGS_]name-version[.build][-suffix]`
    ///
    /// A build number of zero is left out; a non-empty suffix is joined
    /// with a hyphen.
    pub fn artifact_prefix(&self, build_number: u32, build_suffix: &str) -> String {
        let mut prefix = String::new();
        if self.onie_pkg {
            prefix.push_str("PKGS_");
        }
        prefix.push_str(&self.name);
        prefix.push('-');
        prefix.push_str(&self.version);
        if build_number != 0 {
            prefix.push_str(&format!(".{}", build_number));
        }
        if !build_suffix.is_empty() {
            prefix.push('-');
            prefix.push_str(build_suffix);
        }
        prefix
    }

    /// File names of every artifact this format asks for
    pub fn artifact_names(
        &self,
        installer_suffix: &str,
        build_number: u32,
        build_suffix: &str,
    ) -> ArtifactNames {
        let prefix = self.artifact_prefix(build_number, build_suffix);
        ArtifactNames {
            package_cache: self
                .package_cache
                .then(|| format!("{}-{}-pkg_cache.tgz", prefix, installer_suffix)),
            installer: (self.onie_image || self.onie_pkg)
                .then(|| format!("{}-installer-{}.bin", prefix, installer_suffix)),
            rootfs_archive: self
                .tar_archive
                .then(|| format!("{}-{}-rootfs.tgz", prefix, installer_suffix)),
        }
    }
}

/// Artifact file names, in the order they are created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactNames {
    pub package_cache: Option<String>,
    pub installer: Option<String>,
    pub rootfs_archive: Option<String>,
}

impl ArtifactNames {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [&self.package_cache, &self.installer, &self.rootfs_archive]
            .into_iter()
            .filter_map(|n| n.as_deref())
    }
}

/// An install hook script shipped into the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallHook {
    pub file_name: String,
    pub path: PathBuf,
}

impl InstallHook {
    /// Locate `file_name` under `hooks_dir`; it must exist and be executable
    pub fn locate(hooks_dir: &Path, file_name: &str) -> Result<Self> {
        let file_name = file_name.trim();
        let path = hooks_dir.join(file_name);

        let metadata = std::fs::metadata(&path).map_err(|_| {
            Error::ConfigurationError(format!(
                "Install hook {} does not exist",
                path.display()
            ))
        })?;
        if !metadata.is_file() || !is_executable(&metadata) {
            return Err(Error::ConfigurationError(format!(
                "Install hook {} is not an executable file",
                path.display()
            )));
        }

        Ok(Self {
            file_name: file_name.to_string(),
            path,
        })
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

/// Settings applied while loading a blueprint
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Directory install hooks are resolved against
    pub hooks_dir: PathBuf,
    /// Release distribution forced onto sources matched by `mirror_rules`
    pub distribution: Option<String>,
    pub mirror_rules: Vec<MirrorRule>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            hooks_dir: PathBuf::from("opx-onie-installer/inst-hooks"),
            distribution: None,
            mirror_rules: Vec::new(),
        }
    }
}

/// The declarative description of one release build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
    pub description: String,
    pub package_type: String,
    pub platform: String,
    pub architecture: String,
    pub installer_suffix: String,
    pub version: String,
    pub rootfs: RootfsDescriptor,
    pub output: OutputFormat,
    pub package_sets: Vec<PackageSet>,
    pub inst_hooks: Vec<InstallHook>,
}

impl Blueprint {
    /// Load a blueprint file, expanding `xi:include` directives
    pub fn load(path: &Path, options: &LoadOptions) -> Result<Self> {
        let root = Element::load(path)?;
        Self::from_element(&root, options)
    }

    pub fn from_xml(xml: &str, options: &LoadOptions) -> Result<Self> {
        let root = Element::parse(xml)?;
        Self::from_element(&root, options)
    }

    fn from_element(root: &Element, options: &LoadOptions) -> Result<Self> {
        let rootfs_elem = root
            .child("rootfs")
            .ok_or_else(|| Error::ConfigurationError("blueprint is missing <rootfs>".into()))?;
        let rootfs = RootfsDescriptor {
            tar_name: rootfs_elem.required_text("tar_name")?.to_string(),
            source: rootfs_elem.required_text("source")?.to_string(),
            location: rootfs_elem.required_text("location")?.to_string(),
            md5: rootfs_elem.child_text("md5").map(str::to_string),
            sha1: rootfs_elem.child_text("sha1").map(str::to_string),
        };

        let output_elem = root.child("output_format").ok_or_else(|| {
            Error::ConfigurationError("blueprint is missing <output_format>".into())
        })?;
        let output = OutputFormat {
            name: output_elem.required_text("name")?.to_string(),
            version: output_elem.required_text("version")?.to_string(),
            tar_archive: parse_bool(output_elem.required_text("tar_archive")?)?,
            onie_image: parse_bool(output_elem.required_text("ONIE_image")?)?,
            onie_pkg: parse_bool(output_elem.required_text("ONIE_pkg")?)?,
            package_cache: parse_bool(output_elem.required_text("package_cache")?)?,
        };

        let package_sets = root
            .children_named("package_set")
            .map(package_set_from_element)
            .collect::<Result<Vec<_>>>()?;

        let inst_hooks = root
            .children_named("inst_hook")
            .map(|e| InstallHook::locate(&options.hooks_dir, &e.text))
            .collect::<Result<Vec<_>>>()?;

        let mut blueprint = Self {
            description: root.required_text("description")?.to_string(),
            package_type: root.required_text("package_type")?.to_string(),
            platform: root.required_text("platform")?.to_string(),
            architecture: root.required_text("architecture")?.to_string(),
            installer_suffix: root.required_text("installer_suffix")?.to_string(),
            version: root.required_text("version")?.to_string(),
            rootfs,
            output,
            package_sets,
            inst_hooks,
        };

        if let Some(ref distribution) = options.distribution {
            blueprint.apply_distribution(distribution, &options.mirror_rules);
        }

        blueprint.validate()?;
        Ok(blueprint)
    }

    /// Check invariants that must hold before any resolution starts
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        for set in &self.package_sets {
            set.validate()?;
        }
        Ok(())
    }

    /// Point mirror sources at the requested release distribution
    pub fn apply_distribution(&mut self, distribution: &str, rules: &[MirrorRule]) {
        for set in &mut self.package_sets {
            set.apply_distribution(distribution, rules);
        }
    }

    /// Names of every package requested by any set
    pub fn requested_names(&self) -> BTreeSet<String> {
        self.package_sets
            .iter()
            .flat_map(|s| s.requested())
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn artifact_names(&self, build_number: u32, build_suffix: &str) -> ArtifactNames {
        self.output
            .artifact_names(&self.installer_suffix, build_number, build_suffix)
    }

    /// Human-readable plan including the artifacts that will be created
    pub fn summary(&self, build_number: u32, build_suffix: &str) -> BlueprintSummary<'_> {
        BlueprintSummary {
            blueprint: self,
            build_number,
            build_suffix: build_suffix.to_string(),
        }
    }

    /// Serialize back to XML, packages in attribute form
    pub fn to_xml(&self) -> Result<String> {
        let mut root = Element::new("blueprint");
        root.set_attr("xmlns:xi", XINCLUDE_NS);
        root.push_text_child("description", &self.description);
        root.push_text_child("package_type", &self.package_type);
        root.push_text_child("platform", &self.platform);
        root.push_text_child("architecture", &self.architecture);
        root.push_text_child("installer_suffix", &self.installer_suffix);
        root.push_text_child("version", &self.version);

        let mut rootfs = Element::new("rootfs");
        rootfs.push_text_child("tar_name", &self.rootfs.tar_name);
        rootfs.push_text_child("source", &self.rootfs.source);
        rootfs.push_text_child("location", &self.rootfs.location);
        if let Some(ref md5) = self.rootfs.md5 {
            rootfs.push_text_child("md5", md5);
        }
        if let Some(ref sha1) = self.rootfs.sha1 {
            rootfs.push_text_child("sha1", sha1);
        }
        root.children.push(rootfs);

        let mut output = Element::new("output_format");
        output.push_text_child("name", &self.output.name);
        output.push_text_child("version", &self.output.version);
        output.push_text_child("tar_archive", bool_text(self.output.tar_archive));
        output.push_text_child("ONIE_image", bool_text(self.output.onie_image));
        output.push_text_child("ONIE_pkg", bool_text(self.output.onie_pkg));
        output.push_text_child("package_cache", bool_text(self.output.package_cache));
        root.children.push(output);

        for set in &self.package_sets {
            root.children.push(package_set_to_element(set));
        }
        for hook in &self.inst_hooks {
            root.push_text_child("inst_hook", &hook.file_name);
        }

        root.to_document()
    }
}

fn package_set_from_element(elem: &Element) -> Result<PackageSet> {
    let mut set = PackageSet::new(elem.required_text("name")?);
    set.kind = elem.required_text("type")?.to_string();
    set.use_default_solver = elem.child("default_solver").is_some();
    set.platform = elem.child_text("platform").map(str::to_string);
    set.flavor = elem.child_text("flavor").map(str::to_string);

    for desc in elem.children_named("package_desc") {
        set.sources.push(RepositorySource::new(
            desc.required_text("url")?,
            desc.required_text("distribution")?,
            desc.required_text("component")?,
        ));
    }

    for list_elem in elem.children_named("package_list") {
        let packages = list_elem
            .children_named("package")
            .map(package_from_element)
            .collect::<Result<Vec<_>>>()?;
        let no_filter = list_elem.child("no_package_filter").is_some();
        set.lists.push(PackageList::new(packages, no_filter));
    }

    Ok(set)
}

/// Inline text wins; otherwise the attribute form
fn package_from_element(elem: &Element) -> Result<PackageRef> {
    if !elem.text.trim().is_empty() {
        return PackageRef::parse(&elem.text);
    }
    match elem.attr("name") {
        Some(name) => PackageRef::from_attributes(name, elem.attr("version")),
        None => Err(Error::ParseError(
            "<package> needs a name attribute or inline text".to_string(),
        )),
    }
}

fn package_set_to_element(set: &PackageSet) -> Element {
    let mut elem = Element::new("package_set");
    elem.push_text_child("name", &set.name);
    elem.push_text_child("type", &set.kind);
    if set.use_default_solver {
        elem.children.push(Element::new("default_solver"));
    }
    if let Some(ref platform) = set.platform {
        elem.push_text_child("platform", platform);
    }
    if let Some(ref flavor) = set.flavor {
        elem.push_text_child("flavor", flavor);
    }

    for source in &set.sources {
        let mut desc = Element::new("package_desc");
        desc.push_text_child("url", &source.url);
        desc.push_text_child("distribution", &source.distribution);
        desc.push_text_child("component", &source.component);
        elem.children.push(desc);
    }

    for list in &set.lists {
        let mut list_elem = Element::new("package_list");
        if list.no_filter {
            list_elem.children.push(Element::new("no_package_filter"));
        }
        for package in &list.packages {
            let mut package_elem = Element::new("package");
            package_elem.set_attr("name", package.name());
            if let Some(restriction) = package.restriction() {
                package_elem.set_attr("version", &restriction.to_string());
            }
            list_elem.children.push(package_elem);
        }
        elem.children.push(list_elem);
    }

    elem
}

impl fmt::Display for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Blueprint: {}", self.description)?;
        writeln!(f, "  Packages: {}", self.package_type)?;
        writeln!(f, "  Platform: {} ({})", self.platform, self.architecture)?;
        writeln!(f, "  Version: {}", self.version)?;
        writeln!(f, "Root filesystem:")?;
        writeln!(f, "  url = {}", self.rootfs.url())?;
        if let Some(ref md5) = self.rootfs.md5 {
            writeln!(f, "  md5 = {}", md5)?;
        }
        if let Some(ref sha1) = self.rootfs.sha1 {
            writeln!(f, "  sha1 = {}", sha1)?;
        }
        writeln!(f, "  location = {}", self.rootfs.location)?;
        for set in &self.package_sets {
            write!(f, "{}", set)?;
        }
        for hook in &self.inst_hooks {
            writeln!(f, "Install hook: {}", hook.file_name)?;
        }
        Ok(())
    }
}

/// A blueprint rendered together with the artifacts it will create
pub struct BlueprintSummary<'a> {
    blueprint: &'a Blueprint,
    build_number: u32,
    build_suffix: String,
}

impl fmt::Display for BlueprintSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.blueprint)?;
        writeln!(f, "Creates:")?;
        let names = self
            .blueprint
            .artifact_names(self.build_number, &self.build_suffix);
        for name in names.iter() {
            writeln!(f, "  {}", name)?;
        }
        Ok(())
    }
}
