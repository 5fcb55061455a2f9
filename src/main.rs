// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::{AssembleArgs, ResolveArgs};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // --debug wins over RUST_LOG
    let filter = if cli.global.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Show { blueprint, sources } => {
            commands::cmd_show(&cli.global, &blueprint, sources)
        }
        Commands::Dump { blueprint } => commands::cmd_dump(&cli.global, &blueprint),
        Commands::Resolve {
            packages,
            indexes,
            status,
            default_solver,
            archives,
            url,
            json,
        } => commands::cmd_resolve(
            &cli.global,
            ResolveArgs {
                packages,
                indexes,
                status,
                default_solver,
                archives,
                url,
                json,
            },
        ),
        Commands::Assemble {
            blueprint,
            rootfs,
            base,
            output,
            build_number,
            suffix,
            parallel,
        } => commands::cmd_assemble(
            &cli.global,
            AssembleArgs {
                blueprint,
                rootfs,
                base,
                output,
                build_number,
                suffix,
                parallel,
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from([
            "pkgasm",
            "--dist",
            "stretch",
            "resolve",
            "-p",
            "foo,bar",
            "--packages",
            "Packages",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.global.dist.as_deref(), Some("stretch"));
        match cli.command {
            Commands::Resolve { packages, json, .. } => {
                assert_eq!(packages, vec!["foo", "bar"]);
                assert!(json);
            }
            _ => panic!("expected resolve"),
        }
    }
}
