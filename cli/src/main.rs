mod cli;

use anyhow::Result;
use clap::Parser;
use std::env;

use cli::opts::{SubCommands, Testrunner};

fn main() -> Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let opts = Testrunner::parse();
    let tf = cli::terraform(&opts)?;

    match &opts.commands {
        SubCommands::Provision(sub) => cli::provision(sub, tf),
        SubCommands::GatherLogs => cli::gather_logs(tf),
        SubCommands::Cleanup => cli::cleanup(tf),
        SubCommands::Info(sub) => cli::info(sub, tf),
    }
}
