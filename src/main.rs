use std::{io::Write, path::PathBuf};

use clap::Parser;
use modgraph::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::{do_list, do_resolve, ResolveOptions},
        directory_catalogs,
    },
    config::ModgraphConfig,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1)
    }
}

fn run() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();
    let config = ModgraphConfig::load()?;

    let before_dirs = if cli_args.catalog_dir.is_empty() {
        vec![config.catalog_dir.unwrap_or_else(|| PathBuf::from("."))]
    } else {
        cli_args.catalog_dir
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli_args.cmd {
        Command::Resolve {
            bind,
            trace,
            no_check,
            roots,
        } => {
            let before = directory_catalogs(before_dirs);
            let after = directory_catalogs(cli_args.after_dir);
            let options = ResolveOptions {
                bind: bind || config.bind,
                trace: trace || config.trace,
                check: !no_check,
            };
            do_resolve(&before, &after, &roots, options, &mut out)?;
        }
        Command::List => {
            let catalog = directory_catalogs(before_dirs.into_iter().chain(cli_args.after_dir));
            do_list(&catalog, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}
