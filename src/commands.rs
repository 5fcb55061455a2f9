// src/commands.rs
//! Command handlers for the pkgasm CLI

use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use pkgasm::index::{HttpFetcher, MemoryIndex};
use pkgasm::{
    Assembler, AssemblerConfig, Blueprint, DirectoryRootfs, PackageRef, RepositoryIndexProvider,
    Resolver,
};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Configuration from `--config` (or defaults) with CLI overrides applied
pub fn load_config(global: &GlobalArgs) -> Result<AssemblerConfig> {
    let mut config = match global.config {
        Some(ref path) => AssemblerConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => AssemblerConfig::default(),
    };
    if let Some(ref dist) = global.dist {
        config.distribution = dist.clone();
    }
    config.validate()?;
    Ok(config)
}

fn load_blueprint(path: &Path, config: &AssemblerConfig) -> Result<Blueprint> {
    info!("Loading blueprint {}", path.display());
    Blueprint::load(path, &config.load_options())
        .with_context(|| format!("Invalid blueprint {}", path.display()))
}

/// `show`: print the blueprint summary
pub fn cmd_show(global: &GlobalArgs, blueprint: &Path, sources: bool) -> Result<()> {
    let config = load_config(global)?;
    let blueprint = load_blueprint(blueprint, &config)?;

    print!(
        "{}",
        blueprint.summary(config.build_number, &config.build_suffix)
    );

    if sources {
        for set in &blueprint.package_sets {
            println!();
            println!("# {}", set.name);
            print!(
                "{}",
                set.sources_list(&config.architecture, &config.trusted_url_markers)
            );
        }
    }
    Ok(())
}

/// `dump`: re-emit normalized XML
pub fn cmd_dump(global: &GlobalArgs, blueprint: &Path) -> Result<()> {
    let config = load_config(global)?;
    let blueprint = load_blueprint(blueprint, &config)?;
    print!("{}", blueprint.to_xml()?);
    Ok(())
}

/// Options of the stand-alone resolver
pub struct ResolveArgs {
    pub packages: Vec<String>,
    pub indexes: Vec<PathBuf>,
    pub status: Option<PathBuf>,
    pub default_solver: bool,
    pub archives: Option<PathBuf>,
    pub url: Option<String>,
    pub json: bool,
}

/// `resolve`: resolve packages against local index files
pub fn cmd_resolve(global: &GlobalArgs, args: ResolveArgs) -> Result<()> {
    let config = load_config(global)?;

    let refs = args
        .packages
        .iter()
        .map(|p| PackageRef::parse(p.trim()))
        .collect::<pkgasm::Result<Vec<_>>>()?;

    let mut index = MemoryIndex::new();
    for path in &args.indexes {
        let count = index
            .add_packages_file(path, args.url.as_deref())
            .with_context(|| format!("Failed to load {}", path.display()))?;
        info!("Loaded {} packages from {}", count, path.display());
    }
    if let Some(ref status) = args.status {
        index.load_status_file(status)?;
    }
    if let Some(ref dir) = args.archives {
        std::fs::create_dir_all(dir)?;
        let fetcher = HttpFetcher::new(dir, config.fetch_jobs)?
            .with_retries(config.fetch_retries)
            .with_progress(io::stderr().is_terminal());
        index.set_fetcher(Box::new(fetcher));
    }

    let resolver = Resolver::new(config.alternation_policy());
    let plan = resolver.resolve(&refs, &mut index, args.default_solver)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", plan);
    }
    Ok(())
}

/// Options of the assembly run
pub struct AssembleArgs {
    pub blueprint: PathBuf,
    pub rootfs: PathBuf,
    pub base: Option<PathBuf>,
    pub output: PathBuf,
    pub build_number: Option<u32>,
    pub suffix: Option<String>,
    pub parallel: bool,
}

/// `assemble`: run the whole pipeline
pub fn cmd_assemble(global: &GlobalArgs, args: AssembleArgs) -> Result<()> {
    let mut config = load_config(global)?;
    if let Some(n) = args.build_number {
        config.build_number = n;
    }
    if let Some(suffix) = args.suffix {
        config.build_suffix = suffix;
    }
    config.parallel_sets |= args.parallel;

    let mut blueprint = load_blueprint(&args.blueprint, &config)?;
    print!(
        "{}",
        blueprint.summary(config.build_number, &config.build_suffix)
    );

    let mut rootfs = DirectoryRootfs::new(&args.rootfs, &args.output);
    if let Some(ref base) = args.base {
        rootfs = rootfs
            .with_base_archive(base)
            .with_base_descriptor(&blueprint.rootfs);
    }
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("Interrupted, stopping after the current step...");
        cancel_clone.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let provider = RepositoryIndexProvider::new(&config.architecture, config.fetch_jobs)?
        .with_cancel_flag(cancel.clone())
        .with_retries(config.fetch_retries)
        .with_progress(io::stderr().is_terminal());
    let mut assembler = Assembler::new(config, rootfs, provider)?.with_cancel_flag(cancel);

    let report = assembler.run(&mut blueprint)?;

    for (set, plan) in &report.plans {
        println!("{}: {} packages", set, plan.install.len());
    }
    for artifact in &report.artifacts {
        println!("Created {}", artifact.display());
    }
    Ok(())
}
