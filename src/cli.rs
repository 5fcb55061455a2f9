// src/cli.rs
//! CLI definitions for pkgasm
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkgasm")]
#[command(author = "pkgasm Contributors")]
#[command(version)]
#[command(about = "Assemble release images from package blueprints", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Assembler configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Release distribution applied to mirror sources
    #[arg(short = 'd', long = "dist", global = true)]
    pub dist: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a blueprint, then print what it would build
    Show {
        /// Blueprint file
        #[arg(short, long)]
        blueprint: PathBuf,

        /// Print the sources.list of every package set
        #[arg(long)]
        sources: bool,
    },

    /// Re-emit a blueprint as normalized XML
    Dump {
        /// Blueprint file
        #[arg(short, long)]
        blueprint: PathBuf,
    },

    /// Resolve packages against Packages files and optionally fetch them
    Resolve {
        /// Packages to resolve, e.g. `foo,bar (>= 1.0)`
        #[arg(short = 'p', long = "package", value_delimiter = ',', required = true)]
        packages: Vec<String>,

        /// Debian Packages index files
        #[arg(long = "packages", required = true)]
        indexes: Vec<PathBuf>,

        /// dpkg status file with installed packages
        #[arg(long)]
        status: Option<PathBuf>,

        /// Mark packages with the index's own dependency solver
        #[arg(long)]
        default_solver: bool,

        /// Download archives into this directory
        #[arg(long)]
        archives: Option<PathBuf>,

        /// Repository URL that Filename paths are relative to
        #[arg(long)]
        url: Option<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the full assembly pipeline for a blueprint
    Assemble {
        /// Blueprint file
        #[arg(short, long)]
        blueprint: PathBuf,

        /// Rootfs directory to assemble in
        #[arg(long)]
        rootfs: PathBuf,

        /// Gzipped tarball to unpack into the rootfs first
        #[arg(long)]
        base: Option<PathBuf>,

        /// Directory artifacts are written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Build number
        #[arg(short = 'n', long)]
        build_number: Option<u32>,

        /// Release suffix
        #[arg(short = 's', long)]
        suffix: Option<String>,

        /// Resolve package sets concurrently
        #[arg(long)]
        parallel: bool,
    },
}
