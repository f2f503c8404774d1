//! Census AutoML - main entry point

use clap::Parser;
use census_automl::cli::{execute, Cli};
use census_automl::context::RunContext;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let ctx = RunContext::init(config)?;
    let result = execute(&ctx, &cli.command);
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    ctx.finish();
    result
}
