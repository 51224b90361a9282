use anyhow::Result;
use clap::Parser;
use mysqlbeat_runtime::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mysqlbeat")]
#[command(about = "Periodically collect MySQL status and ship it as events", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "MYSQLBEAT_CONFIG", default_value = "mysqlbeat.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    RuntimeBuilder::new(cli.config).run().await
}
