// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: blueprint file
fn blueprint_arg() -> Arg {
    Arg::new("blueprint")
        .short('b')
        .long("blueprint")
        .value_name("FILE")
        .required(true)
        .help("Blueprint file")
}

fn build_cli() -> Command {
    Command::new("pkgasm")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgasm Contributors")
        .about("Assemble release images from package blueprints")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Assembler configuration file (TOML)"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging"),
        )
        .arg(
            Arg::new("dist")
                .short('d')
                .long("dist")
                .global(true)
                .help("Release distribution applied to mirror sources"),
        )
        .subcommand(
            Command::new("show")
                .about("Parse and validate a blueprint, then print what it would build")
                .arg(blueprint_arg())
                .arg(
                    Arg::new("sources")
                        .long("sources")
                        .action(ArgAction::SetTrue)
                        .help("Print the sources.list of every package set"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Re-emit a blueprint as normalized XML")
                .arg(blueprint_arg()),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve packages against Packages files and optionally fetch them")
                .arg(
                    Arg::new("package")
                        .short('p')
                        .long("package")
                        .required(true)
                        .value_delimiter(',')
                        .help("Packages to resolve"),
                )
                .arg(
                    Arg::new("packages")
                        .long("packages")
                        .required(true)
                        .action(ArgAction::Append)
                        .help("Debian Packages index files"),
                )
                .arg(Arg::new("status").long("status").help("dpkg status file"))
                .arg(
                    Arg::new("default_solver")
                        .long("default-solver")
                        .action(ArgAction::SetTrue)
                        .help("Mark packages with the index's own dependency solver"),
                )
                .arg(
                    Arg::new("archives")
                        .long("archives")
                        .help("Download archives into this directory"),
                )
                .arg(
                    Arg::new("url")
                        .long("url")
                        .help("Repository URL that Filename paths are relative to"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the plan as JSON"),
                ),
        )
        .subcommand(
            Command::new("assemble")
                .about("Run the full assembly pipeline for a blueprint")
                .arg(blueprint_arg())
                .arg(
                    Arg::new("rootfs")
                        .long("rootfs")
                        .required(true)
                        .help("Rootfs directory to assemble in"),
                )
                .arg(
                    Arg::new("base")
                        .long("base")
                        .help("Gzipped tarball to unpack into the rootfs first"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value(".")
                        .help("Directory artifacts are written to"),
                )
                .arg(
                    Arg::new("build_number")
                        .short('n')
                        .long("build-number")
                        .help("Build number"),
                )
                .arg(Arg::new("suffix").short('s').long("suffix").help("Release suffix"))
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .action(ArgAction::SetTrue)
                        .help("Resolve package sets concurrently"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("pkgasm.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
