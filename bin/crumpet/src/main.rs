//! crumpet is a CLI tool to deploy and verify a Solidity contract in one command.

mod cli;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;
use crumpet_deploy::{
    Deployer, TransactionOutcome, VerificationState, manual_verification_guide,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // If a config file is provided, load it; otherwise build the
    // configuration from CLI arguments.
    let deployer = if let Some(config_path) = &cli.config {
        let config_path = PathBuf::from(config_path);
        let deployer = Deployer::load_from_file(&config_path)?;

        tracing::info!(
            config_path = %config_path.display(),
            network = %deployer.network.name,
            chain_id = deployer.network.chain_id,
            "Loading deployment from config file..."
        );

        deployer
    } else {
        cli.to_deployer()?
    };

    // The signer key never lives in the config file.
    let private_key = cli
        .private_key
        .clone()
        .context("PRIVATE_KEY environment variable (or --private-key) is required")?;

    // Save the resolved configuration next to the deployment artifacts.
    deployer.save_config()?;

    let pipeline = deployer.deploy(&private_key, cli.api_key.as_deref());

    // The pipeline's only suspension points are its poll sleeps, so the
    // deadline and Ctrl-C both take effect promptly.
    let record = match cli.deadline {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), pipeline)
            .await
            .map_err(|_| anyhow::anyhow!("deployment exceeded the {secs}s deadline"))??,
        None => {
            tokio::select! {
                result = pipeline => result?,
                _ = tokio::signal::ctrl_c() => {
                    anyhow::bail!("interrupted");
                }
            }
        }
    };

    println!("{record}");

    if record.verification.state == VerificationState::NotSubmitted {
        if let Some(address) = record.contract_address() {
            println!(
                "{}",
                manual_verification_guide(&record.deployment, &record.compilation, address)
            );
        }
    }

    // Exit code 0 only for a confirmed deployment; the verification outcome
    // never affects it.
    match &record.outcome {
        TransactionOutcome::Confirmed {
            contract_address, ..
        } => {
            tracing::info!(contract_address = %contract_address, "Deployment complete");
            Ok(())
        }
        TransactionOutcome::Reverted => {
            anyhow::bail!("deployment transaction reverted (record saved)")
        }
        TransactionOutcome::TimedOut => {
            anyhow::bail!("confirmation timed out before a receipt appeared (record saved)")
        }
    }
}
