use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crumpet_deploy::{
    ConfirmationConfig, Deployer, NetworkConfig, RetryConfig, SolcConfig, VerificationConfig,
};
use tracing::level_filters::LevelFilter;

/// Target network: a preset or a custom RPC endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Network {
    BscTestnet,
    BscMainnet,
    #[strum(default)]
    Custom(String),
}

impl Network {
    /// Resolve the network selection into endpoint configuration.
    ///
    /// `chain_id` overrides the preset chain ID and is required for a
    /// custom RPC endpoint.
    pub fn to_network_config(&self, chain_id: Option<u64>) -> anyhow::Result<NetworkConfig> {
        match self {
            Network::BscTestnet => Ok(NetworkConfig {
                name: "bsc-testnet".to_string(),
                rpc_url: "https://data-seed-prebsc-1-s1.binance.org:8545/".to_string(),
                chain_id: chain_id.unwrap_or(97),
                explorer_url: Some("https://testnet.bscscan.com".to_string()),
                verification_api_url: Some("https://api-testnet.bscscan.com/api".to_string()),
            }),
            Network::BscMainnet => Ok(NetworkConfig {
                name: "bsc-mainnet".to_string(),
                rpc_url: "https://bsc-dataseed.binance.org/".to_string(),
                chain_id: chain_id.unwrap_or(56),
                explorer_url: Some("https://bscscan.com".to_string()),
                verification_api_url: Some("https://api.bscscan.com/api".to_string()),
            }),
            Network::Custom(rpc_url) => {
                let chain_id = chain_id
                    .context("--chain-id is required when using a custom RPC endpoint")?;
                Ok(NetworkConfig {
                    name: "custom".to_string(),
                    rpc_url: rpc_url.clone(),
                    chain_id,
                    explorer_url: None,
                    verification_api_url: None,
                })
            }
        }
    }
}

#[derive(Parser)]
#[command(name = "crumpet")]
#[command(
    author,
    version,
    about = "Deploy and verify a Solidity contract in one command"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "CRUMPET_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the Solidity source file to deploy.
    #[arg(env = "CRUMPET_CONTRACT", required_unless_present = "config")]
    pub contract: Option<PathBuf>,

    /// Contract name to deploy; required when the source defines several.
    #[arg(long, alias = "name", env = "CRUMPET_CONTRACT_NAME")]
    pub contract_name: Option<String>,

    /// The target network (bsc-testnet, bsc-mainnet, or a custom RPC URL).
    #[arg(short, long, env = "CRUMPET_NETWORK", default_value_t = Network::BscTestnet)]
    pub network: Network,

    /// Chain ID override; required with a custom RPC URL.
    #[arg(long, env = "CRUMPET_CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// Hex private key of the deployer account.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Explorer verification API key. Without one, verification is skipped
    /// and manual instructions are printed instead.
    #[arg(long, env = "BSCSCAN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// The path to the output data directory.
    ///
    /// The deployment record, the exact verification source and the
    /// resolved configuration are written here.
    #[arg(long, alias = "outdata", env = "CRUMPET_OUTDATA", default_value = "deployments")]
    pub outdata: PathBuf,

    /// Gas limit for the deployment transaction.
    #[arg(long, env = "CRUMPET_GAS_LIMIT", default_value_t = 2_000_000)]
    pub gas_limit: u64,

    /// Full solc version string, recorded for verification.
    #[arg(long, env = "CRUMPET_SOLC_VERSION", default_value = "0.8.19+commit.7dd6d404")]
    pub solc_version: String,

    /// Disable the optimizer.
    ///
    /// Verification services re-compile with these exact settings, so only
    /// change them if the explorer settings change too.
    #[arg(long, env = "CRUMPET_NO_OPTIMIZE")]
    pub no_optimize: bool,

    /// Optimizer runs.
    #[arg(long, env = "CRUMPET_OPTIMIZE_RUNS", default_value_t = 200)]
    pub optimize_runs: u32,

    /// ABI-encoded constructor arguments as 0x-prefixed hex.
    #[arg(long, env = "CRUMPET_CONSTRUCTOR_ARGS")]
    pub constructor_args: Option<String>,

    /// Read-only no-argument functions to call after a confirmed
    /// deployment; outputs land in the record. Repeatable.
    #[arg(long = "probe", env = "CRUMPET_PROBES", value_delimiter = ',')]
    pub probe_functions: Vec<String>,

    /// Confirmation timeout in seconds.
    #[arg(long, env = "CRUMPET_CONFIRM_TIMEOUT", default_value_t = 300)]
    pub confirm_timeout: u64,

    /// Seconds between receipt polls.
    #[arg(long, env = "CRUMPET_CONFIRM_POLL", default_value_t = 5)]
    pub confirm_poll: u64,

    /// Bound on verification status checks.
    #[arg(long, env = "CRUMPET_VERIFY_ATTEMPTS", default_value_t = 10)]
    pub verify_attempts: u32,

    /// Seconds between verification status checks.
    #[arg(long, env = "CRUMPET_VERIFY_POLL", default_value_t = 15)]
    pub verify_poll: u64,

    /// Overall deadline for the whole pipeline, in seconds.
    ///
    /// Phase timeouts do not compose automatically; use this to bound the
    /// end-to-end run time.
    #[arg(long, env = "CRUMPET_DEADLINE")]
    pub deadline: Option<u64>,

    /// Path to an existing Crumpet.toml configuration file to load.
    ///
    /// When provided, the deployment uses the configuration from this file
    /// instead of building one from CLI arguments.
    #[arg(long, alias = "conf", env = "CRUMPET_CONFIG")]
    pub config: Option<String>,
}

impl Cli {
    /// Build a [`Deployer`] configuration from the CLI arguments.
    pub fn to_deployer(&self) -> anyhow::Result<Deployer> {
        let contract = self
            .contract
            .clone()
            .context("a contract source path is required")?;

        Ok(Deployer {
            contract,
            contract_name: self.contract_name.clone(),
            outdata: self.outdata.clone(),
            gas_limit: self.gas_limit,
            constructor_args: self.constructor_args.clone(),
            probe_functions: self.probe_functions.clone(),
            network: self.network.to_network_config(self.chain_id)?,
            solc: SolcConfig {
                version: self.solc_version.clone(),
                optimize: !self.no_optimize,
                optimize_runs: self.optimize_runs,
            },
            retry: RetryConfig::default(),
            confirmation: ConfirmationConfig {
                timeout_secs: self.confirm_timeout,
                poll_interval_secs: self.confirm_poll,
            },
            verification: VerificationConfig {
                status_attempts: self.verify_attempts,
                poll_interval_secs: self.verify_poll,
            },
        })
    }
}
