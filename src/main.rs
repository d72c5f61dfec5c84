// src/main.rs

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use dbmig::changelog::Changelog;
use dbmig::check;
use dbmig::migrate::{self, AutoConfirm, Confirm};
use dbmig::repository::Repository;
use dbmig::semver::SemVer;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "dbmig")]
#[command(author, version, about = "Semantic-versioned SQL schema migration engine", long_about = None)]
struct Cli {
    /// Repository root containing install/ and upgrade/ script directories
    #[arg(long, global = true, default_value = ".")]
    repository: PathBuf,

    /// SQLite database file to migrate (the one supported backend)
    #[arg(long, global = true)]
    target: Option<String>,

    /// Changelog changeset label, for multiple migration lineages in one database
    #[arg(long, global = true, default_value = "default")]
    changeset: String,

    /// Skip interactive confirmation prompts
    #[arg(long, global = true)]
    force: bool,

    /// Print extra progress narration to stdout, independent of RUST_LOG
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the currently installed and previous versions
    Show,
    /// Cross-reference the repository against the changelog's history
    Check,
    /// Install, upgrade, or roll back the database to a target version
    Migrate {
        /// Version to migrate to (defaults to the repository's latest version)
        #[arg(long)]
        version: Option<String>,
    },
    /// Force the changelog to a version without running any script
    OverrideVersion {
        #[arg(long)]
        version: String,
    },
    /// Generate shell completion scripts
    Completions {
        shell: Shell,
    },
}

/// A yes/no confirmation gate over stdin, used unless `--force` is given.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, message: &str) -> dbmig::Result<bool> {
        print!("{message} [y/N] ");
        io::stdout().flush().ok();
        let mut line = String::new();
        io::stdin().read_line(&mut line).map_err(dbmig::Error::Io)?;
        Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

fn changed_by_identity() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn require_target(cli: &Cli) -> Result<&str> {
    cli.target
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--target <DATABASE FILE> is required for this command"))
}

fn open_changelog(cli: &Cli) -> Result<Changelog> {
    let target = require_target(cli)?;
    let conn = dbmig::db::open(target)?;
    Ok(Changelog::open(conn, cli.changeset.clone()))
}

fn load_repository(cli: &Cli) -> Result<Repository> {
    Ok(Repository::load(&cli.repository)?)
}

fn cmd_show(cli: &Cli) -> Result<()> {
    let cl = open_changelog(cli)?;
    if !cl.installed()? {
        println!("not installed");
        return Ok(());
    }
    println!("current version: {}", cl.version()?);
    println!("previous version: {}", cl.previous_version()?);
    Ok(())
}

fn cmd_check(cli: &Cli) -> Result<()> {
    let repo = load_repository(cli)?;
    let cl = open_changelog(cli)?;
    let issues = check::run_check(&repo, &cl)?;
    if issues.is_empty() {
        println!("no issues found");
        return Ok(());
    }
    for issue in &issues {
        println!("{issue}");
    }
    bail!("{} issue(s) found", issues.len());
}

fn cmd_migrate(cli: &Cli, version: Option<&str>) -> Result<()> {
    let repo = load_repository(cli)?;
    let mut cl = open_changelog(cli)?;
    let target = match version {
        Some(v) => SemVer::parse(v)?,
        None => repo.latest_version(),
    };
    let changed_by = changed_by_identity();

    if cli.verbose {
        println!("migrating {} to {target}", require_target(cli)?);
    }
    info!(%target, changeset = %cli.changeset, "starting migration");

    let reached = if cli.force {
        migrate::migrate(&repo, &mut cl, &cli.changeset, &target, &changed_by, &mut AutoConfirm)?
    } else {
        migrate::migrate(&repo, &mut cl, &cli.changeset, &target, &changed_by, &mut StdinConfirm)?
    };

    if cli.verbose {
        println!("now at {reached}");
    }
    if reached != target {
        eprintln!("warning: reached {reached}, but {target} was requested");
    }
    Ok(())
}

fn cmd_override_version(cli: &Cli, version: &str) -> Result<()> {
    let mut cl = open_changelog(cli)?;
    let v = SemVer::parse(version)?;
    let changed_by = changed_by_identity();
    cl.override_version(&v, &changed_by)?;
    println!("changelog overridden to {v}");
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Show => cmd_show(&cli),
        Commands::Check => cmd_check(&cli),
        Commands::Migrate { version } => cmd_migrate(&cli, version.as_deref()),
        Commands::OverrideVersion { version } => cmd_override_version(&cli, version),
        Commands::Completions { shell } => cmd_completions(*shell),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_flags_before_subcommand() {
        let cli = Cli::parse_from([
            "dbmig",
            "--target",
            "db.sqlite",
            "--changeset",
            "tenant-a",
            "--force",
            "migrate",
            "--version",
            "1.2.3",
        ]);
        assert_eq!(cli.target.as_deref(), Some("db.sqlite"));
        assert_eq!(cli.changeset, "tenant-a");
        assert!(cli.force);
        assert!(matches!(cli.command, Commands::Migrate { version: Some(ref v) } if v == "1.2.3"));
    }

    #[test]
    fn repository_defaults_to_current_directory() {
        let cli = Cli::parse_from(["dbmig", "--target", "db.sqlite", "show"]);
        assert_eq!(cli.repository, Path::new("."));
    }
}
