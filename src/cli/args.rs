use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resolves module graphs from directories of module descriptors.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Directory of module descriptors searched before the parent configuration.
    /// Can be repeated, earlier directories take precedence.
    #[clap(short, long = "catalog-dir")]
    pub catalog_dir: Vec<PathBuf>,
    /// Directory of module descriptors searched after the parent configuration
    #[clap(short, long = "after-dir")]
    pub after_dir: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    ///Resolves the root modules and prints every resolved module with the modules it reads
    Resolve {
        /// Also select the modules providing services used by resolved modules
        #[clap(short, long)]
        bind: bool,
        /// Print every dependence and service binding followed
        #[clap(short, long)]
        trace: bool,
        /// Skip the cycle, hash and package checks
        #[clap(long)]
        no_check: bool,
        #[clap(required = true)]
        roots: Vec<String>,
    },
    ///Lists every module visible in the catalogs
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_resolve() {
        let args = CliArgs::try_parse_from([
            "modgraph",
            "--catalog-dir",
            "mods",
            "-c",
            "more",
            "--after-dir",
            "late",
            "resolve",
            "--bind",
            "a",
            "b",
        ])
        .unwrap();
        assert_eq!(args.catalog_dir, vec![PathBuf::from("mods"), PathBuf::from("more")]);
        assert_eq!(args.after_dir, vec![PathBuf::from("late")]);
        match args.cmd {
            Command::Resolve {
                bind,
                trace,
                no_check,
                roots,
            } => {
                assert!(bind);
                assert!(!trace);
                assert!(!no_check);
                assert_eq!(roots, vec!["a", "b"]);
            }
            Command::List => panic!("expected resolve"),
        }
    }

    #[test]
    fn resolve_requires_roots() {
        assert!(CliArgs::try_parse_from(["modgraph", "resolve"]).is_err());
    }
}
