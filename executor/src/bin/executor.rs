use anyhow::Result;
use clap::Parser;
use cli::Command;
use dotenvy::dotenv;
use rollup_common::DeploymentParameters;

use self::executor::*;
mod executor {
    pub mod cli;
    pub mod replay;
    pub mod report;
    pub mod simulate;
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    rollup_executor::tracing::init();

    let args = cli::Cli::parse();
    let params: DeploymentParameters = args.params.try_into()?;

    match args.command {
        Command::Simulate(simulate_args) => simulate::run(params, simulate_args).await,
        Command::Replay(replay_args) => replay::run(params, replay_args).await,
    }
}
