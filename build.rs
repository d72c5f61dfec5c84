// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("dbmig")
        .version(env!("CARGO_PKG_VERSION"))
        .author("dbmig Contributors")
        .about("Semantic-versioned SQL schema migration engine")
        .subcommand_required(true)
        .arg(
            Arg::new("repository")
                .long("repository")
                .global(true)
                .default_value(".")
                .help("Repository root containing install/ and upgrade/ script directories"),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .global(true)
                .help("SQLite database file to migrate"),
        )
        .arg(
            Arg::new("changeset")
                .long("changeset")
                .global(true)
                .default_value("default")
                .help("Changelog changeset label"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .global(true)
                .action(clap::ArgAction::SetTrue)
                .help("Skip interactive confirmation prompts"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .global(true)
                .action(clap::ArgAction::SetTrue)
                .help("Print extra progress narration to stdout"),
        )
        .subcommand(Command::new("show").about("Report the currently installed and previous versions"))
        .subcommand(Command::new("check").about("Cross-reference the repository against the changelog's history"))
        .subcommand(
            Command::new("migrate")
                .about("Install, upgrade, or roll back the database to a target version")
                .arg(
                    Arg::new("version")
                        .long("version")
                        .help("Version to migrate to (defaults to the repository's latest version)"),
                ),
        )
        .subcommand(
            Command::new("override-version")
                .about("Force the changelog to a version without running any script")
                .arg(Arg::new("version").long("version").required(true)),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("dbmig.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
