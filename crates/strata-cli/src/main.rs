//! Strata CLI - partitioned merge-dedup ETL.
//!
//! The main entry point for the `strata` binary.

use anyhow::Result;
use clap::Parser;

use strata_cli::{Cli, Commands};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    strata_core::init_logging(cli.log_format()?);
    strata_etl::metrics::register_metrics();
    let config = cli.config()?;

    // Create runtime and execute
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Run(args) => strata_cli::commands::run::execute(&args, &config).await,
            Commands::Unlock(args) => strata_cli::commands::unlock::execute(&args, &config).await,
            Commands::ResetLedger(args) => {
                strata_cli::commands::reset_ledger::execute(&args, &config).await
            }
            Commands::Status(args) => strata_cli::commands::status::execute(&args, &config).await,
        }
    })
}
