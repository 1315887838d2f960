use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[clap(name = "testrunner", version, about)]
pub struct Testrunner {
    #[clap(
        short,
        long,
        help = "Path to the run configuration",
        env = "TESTRUNNER_VARS",
        value_name = "FILE",
        default_value = "vars.toml"
    )]
    pub vars: PathBuf,
    #[clap(
        long,
        help = "Override the platform named in the configuration",
        value_name = "NAME"
    )]
    pub platform: Option<String>,
    #[clap(subcommand)]
    pub commands: SubCommands,
}

#[derive(Subcommand)]
pub enum SubCommands {
    #[clap(about = "Create and apply the terraform plan")]
    Provision(Provision),
    #[clap(about = "Collect logs from every node")]
    GatherLogs,
    #[clap(about = "Destroy the deployment and remove terraform artifacts")]
    Cleanup,
    #[clap(about = "Show the load balancer and node addresses")]
    Info(Info),
}

#[derive(Args)]
pub struct Provision {
    #[clap(short, long, help = "number of master nodes", value_name = "N")]
    pub master_count: Option<usize>,
    #[clap(short, long, help = "number of worker nodes", value_name = "N")]
    pub worker_count: Option<usize>,
}

#[derive(Args)]
pub struct Info {
    #[clap(short, long, help = "output as JSON")]
    pub json: bool,
}
