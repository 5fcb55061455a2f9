// tests/blueprint.rs

//! Integration tests for blueprint loading, validation and round-trips.

mod common;

use common::{blueprint_xml, output_xml};
use pkgasm::model::MirrorRule;
use pkgasm::{Blueprint, Error, LoadOptions};
use std::fs;
use tempfile::TempDir;

fn options() -> LoadOptions {
    LoadOptions {
        distribution: None,
        ..LoadOptions::default()
    }
}

#[test]
fn test_round_trip_preserves_blueprint() {
    let xml = blueprint_xml(
        &[(
            "base",
            r#"      <package name="opx-base" version="[1.0,2.0)"/>
      <package>opx-tools (>= 2.1)</package>
      <package name="bash"/>"#,
        )],
        &output_xml(true, true, false, true),
    );
    let blueprint = Blueprint::from_xml(&xml, &options()).unwrap();
    let emitted = blueprint.to_xml().unwrap();
    let reparsed = Blueprint::from_xml(&emitted, &options()).unwrap();

    assert_eq!(reparsed, blueprint);
    assert!(emitted.contains(r#"<package name="opx-tools" version="[2.1,)"/>"#));
    assert!(emitted.contains("xmlns:xi"));
}

#[test]
fn test_both_onie_outputs_rejected() {
    let xml = blueprint_xml(&[], &output_xml(false, true, true, false));
    assert!(matches!(
        Blueprint::from_xml(&xml, &options()),
        Err(Error::ConfigurationError(_))
    ));
}

#[test]
fn test_invalid_version_is_parse_error() {
    let xml = blueprint_xml(
        &[("base", r#"      <package name="opx-base" version="one"/>"#)],
        &output_xml(true, false, false, false),
    );
    assert!(matches!(
        Blueprint::from_xml(&xml, &options()),
        Err(Error::ParseError(_))
    ));
}

#[test]
fn test_no_package_filter_keeps_installed() {
    let xml = blueprint_xml(
        &[(
            "base",
            r#"      <no_package_filter/>
      <package name="bash"/>
      <package name="opx-base"/>"#,
        )],
        &output_xml(true, false, false, false),
    );
    let mut blueprint = Blueprint::from_xml(&xml, &options()).unwrap();
    let installed = ["bash".to_string()].into_iter().collect();
    let removed = pkgasm::assembler::filter_installed(&mut blueprint, &installed);

    assert_eq!(removed, 0);
    assert_eq!(blueprint.package_sets[0].lists[0].packages.len(), 2);
}

#[test]
fn test_distribution_rewrites_mirror_sources() {
    let xml = blueprint_xml(
        &[("base", r#"      <package name="opx-base"/>"#)],
        &output_xml(true, false, false, false),
    );
    let options = LoadOptions {
        distribution: Some("3.2.0".to_string()),
        mirror_rules: vec![MirrorRule::new("openswitch.net", Some("contrib"))],
        ..LoadOptions::default()
    };
    let blueprint = Blueprint::from_xml(&xml, &options).unwrap();
    assert_eq!(blueprint.package_sets[0].sources[0].distribution, "3.2.0");
}

#[test]
fn test_summary_lists_artifacts() {
    let xml = blueprint_xml(
        &[("base", r#"      <package name="opx-base"/>"#)],
        &output_xml(true, false, true, true),
    );
    let blueprint = Blueprint::from_xml(&xml, &options()).unwrap();
    let summary = blueprint.summary(12, "rc1").to_string();

    assert!(summary.contains("Creates:"));
    assert!(summary.contains("PKGS_OPX-3.2.0.12-rc1-stretch-pkg_cache.tgz"));
    assert!(summary.contains("PKGS_OPX-3.2.0.12-rc1-installer-stretch.bin"));
}

#[test]
fn test_load_with_xinclude_and_hooks() {
    let dir = TempDir::new().unwrap();
    let hooks = dir.path().join("hooks");
    fs::create_dir_all(&hooks).unwrap();
    let hook = hooks.join("98-set-apt-sources.stretch.postinst.sh");
    fs::write(&hook, "#!/bin/sh\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fs::write(
        dir.path().join("extra.xml"),
        r#"<package_set>
    <name>extra</name>
    <type>opx</type>
    <package_desc>
      <url>copy:/mnt</url>
      <distribution>unstable</distribution>
      <component>main</component>
    </package_desc>
    <package_list>
      <package name="opx-extra"/>
    </package_list>
  </package_set>"#,
    )
    .unwrap();

    let mut xml = blueprint_xml(
        &[("base", r#"      <package name="opx-base"/>"#)],
        &output_xml(true, false, false, false),
    );
    xml = xml.replace(
        "</blueprint>",
        "  <xi:include href=\"extra.xml\"/>\n  <inst_hook>98-set-apt-sources.stretch.postinst.sh</inst_hook>\n</blueprint>",
    );
    let path = dir.path().join("opx.xml");
    fs::write(&path, xml).unwrap();

    let options = LoadOptions {
        hooks_dir: hooks.clone(),
        distribution: None,
        mirror_rules: Vec::new(),
    };
    let blueprint = Blueprint::load(&path, &options).unwrap();

    assert_eq!(blueprint.package_sets.len(), 2);
    assert_eq!(blueprint.package_sets[1].name, "extra");
    assert_eq!(blueprint.inst_hooks.len(), 1);
    assert_eq!(blueprint.inst_hooks[0].path, hook);
}
