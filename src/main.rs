use anyhow::Result;
use clap::Parser;

use packdeck::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    logging::init(args.verbose);

    match args.command {
        cli::Command::Deploy(opts) => commands::deploy::run(&args.global, &opts),
        cli::Command::Undeploy(opts) => commands::undeploy::run(&args.global, &opts),
        cli::Command::Status(opts) => commands::status::run(&args.global, &opts),
        cli::Command::Sweep(opts) => commands::sweep::run(&args.global, &opts),
        cli::Command::Resolve(opts) => commands::resolve::run(&args.global, &opts),
    }
}
