//! Deployment orchestrator.
//!
//! [`Deployer`] is the full configuration for one deployment and can be
//! serialized to/from TOML. The pipeline is strictly sequential (compile,
//! preflight, broadcast, confirm, verify, persist) because each step depends
//! on the previous step's output. The only suspension points are the retry
//! backoffs and poll sleeps, so callers can bound total run time by wrapping
//! [`Deployer::deploy`] in `tokio::time::timeout`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256, keccak256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::compile::{CompileError, CompiledContract, SolcConfig, compile_source};
use crate::confirm::{ConfirmationWaiter, TransactionOutcome};
use crate::record::{CompilationInfo, DeploymentInfo, DeploymentRecord, ProbeResult, RecordError, RecordStore};
use crate::retry::{OperationResult, RetryExecutor, RetryPolicy};
use crate::rpc::{ChainClient, HttpChainClient, RpcError, classify_rpc_error};
use crate::tx::{PendingTransaction, SignError, TxParams, decode_constructor_args, sign_deployment};
use crate::verify::{
    DEFAULT_STATUS_ATTEMPTS, DEFAULT_STATUS_INTERVAL, HttpVerificationApi, VerificationApi,
    VerificationPoller, VerificationRequest, VerificationSession,
};

/// The default name for the crumpet configuration file.
pub const CRUMPCONF_FILENAME: &str = "Crumpet.toml";

/// Fatal pipeline errors. Everything that can go wrong after a transaction
/// hash exists is captured inside the [`DeploymentRecord`] instead.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error("rpc failure: {0}")]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// The chain to deploy to and the explorer endpoints that go with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub chain_id: u64,
    /// Explorer web UI base, used for record links and manual instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    /// Explorer verification API endpoint; without one, verification is
    /// never attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_api_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "bsc-testnet".to_string(),
            rpc_url: "https://data-seed-prebsc-1-s1.binance.org:8545/".to_string(),
            chain_id: 97,
            explorer_url: Some("https://testnet.bscscan.com".to_string()),
            verification_api_url: Some("https://api-testnet.bscscan.com/api".to_string()),
        }
    }
}

/// Retry budget for transient RPC calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 2,
        }
    }
}

impl RetryConfig {
    pub fn rpc_policy(&self) -> RetryPolicy<RpcError> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.delay_secs),
            classify_rpc_error,
        )
    }
}

/// Confirmation phase bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            poll_interval_secs: 5,
        }
    }
}

/// Verification phase bounds, independent of the confirmation timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub status_attempts: u32,
    pub poll_interval_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            status_attempts: DEFAULT_STATUS_ATTEMPTS,
            poll_interval_secs: DEFAULT_STATUS_INTERVAL.as_secs(),
        }
    }
}

/// Main deployer that orchestrates the entire deployment.
///
/// This struct contains all the configuration needed to deploy a contract
/// and can be serialized to/from TOML format. Secrets (the signer key and
/// the verification API key) are never part of the configuration; they are
/// passed to [`Deployer::deploy`] at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployer {
    /// Path to the single-file Solidity source.
    pub contract: PathBuf,
    /// Contract to deploy when the source defines several.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    /// Path to the output data directory.
    pub outdata: PathBuf,
    pub gas_limit: u64,
    /// ABI-encoded constructor arguments, 0x-prefixed hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constructor_args: Option<String>,
    /// No-argument read-only functions to call after a confirmed deploy;
    /// raw outputs land in the record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe_functions: Vec<String>,

    pub network: NetworkConfig,
    pub solc: SolcConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
}

impl Deployer {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployer config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file.
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(CRUMPCONF_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(config_path)
            .context(format!("Failed to read config from {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save the deployer's configuration to the default location
    /// (Crumpet.toml in outdata).
    pub fn save_config(&self) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.outdata)
            .context("Failed to create output data directory")?;
        let config_path = self.outdata.join(CRUMPCONF_FILENAME);
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }
}

impl Deployer {
    /// Run the full pipeline: compile, preflight, broadcast, confirm,
    /// verify, persist.
    ///
    /// Returns an error only when the pipeline aborts before a transaction
    /// hash exists (bad key, compilation failure, unreachable node, rejected
    /// broadcast). Past that point every failure is captured in the
    /// persisted record.
    pub async fn deploy(
        &self,
        private_key: &str,
        api_key: Option<&str>,
    ) -> Result<DeploymentRecord, DeployError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| DeployError::Config(format!("invalid private key: {e}")))?;

        let source = std::fs::read_to_string(&self.contract).map_err(|e| {
            DeployError::Config(format!(
                "failed to read contract source {}: {e}",
                self.contract.display()
            ))
        })?;

        let compiled = compile_source(&source, self.contract_name.as_deref(), &self.solc).await?;

        let client = Arc::new(HttpChainClient::new(self.network.rpc_url.as_str())?);
        let verifier = self
            .network
            .verification_api_url
            .as_deref()
            .map(HttpVerificationApi::new)
            .transpose()
            .map_err(|e| DeployError::Config(format!("invalid verification endpoint: {e}")))?;

        self.deploy_with(&signer, compiled, client, verifier, Arc::new(SystemClock), api_key)
            .await
    }

    /// The pipeline behind [`Deployer::deploy`], with the chain client,
    /// verification API and clock injected.
    pub async fn deploy_with<C, A>(
        &self,
        signer: &PrivateKeySigner,
        compiled: CompiledContract,
        client: Arc<C>,
        verifier: Option<A>,
        clock: Arc<dyn Clock>,
        api_key: Option<&str>,
    ) -> Result<DeploymentRecord, DeployError>
    where
        C: ChainClient,
        A: VerificationApi,
    {
        let deployer_address = signer.address();
        tracing::info!(
            network = %self.network.name,
            rpc_url = %self.network.rpc_url,
            deployer = %deployer_address,
            contract = %compiled.name,
            "Starting deployment..."
        );

        let executor = RetryExecutor::new(clock.clone());
        let policy = self.retry.rpc_policy();

        // Preflight: refuse to broadcast from an unfunded account.
        let balance = executor
            .execute(&policy, || client.get_balance(deployer_address))
            .await
            .into_result()?;
        if balance.is_zero() {
            return Err(DeployError::Config(format!(
                "deployer account {deployer_address} has no funds on {}",
                self.network.name
            )));
        }
        tracing::info!(balance = %balance, "Deployer balance fetched");

        // Gas price and nonce are fetched exactly once; the confirmation
        // phase only observes.
        let gas_price = executor
            .execute(&policy, || client.get_gas_price())
            .await
            .into_result()?;
        let nonce = executor
            .execute(&policy, || client.get_nonce(deployer_address))
            .await
            .into_result()?;
        tracing::info!(gas_price, nonce, "Transaction parameters fetched");

        let params = TxParams {
            chain_id: self.network.chain_id,
            nonce,
            gas_price,
            gas_limit: self.gas_limit,
            value: U256::ZERO,
        };
        let args = decode_constructor_args(self.constructor_args.as_deref())?;
        let raw = sign_deployment(signer, &params, &compiled.bytecode, &args)?;

        // Broadcast is single-shot; a failure here aborts with no record,
        // since no transaction hash exists yet.
        let hash = client.send_raw_transaction(raw.into()).await?;
        let pending = PendingTransaction::new(hash);
        tracing::info!(tx_hash = %hash, "Deployment transaction broadcast");

        let waiter = ConfirmationWaiter::new(
            client.clone(),
            clock.clone(),
            Duration::from_secs(self.confirmation.poll_interval_secs),
            self.retry.max_attempts,
        );
        let outcome = waiter
            .await_confirmation(&pending, Duration::from_secs(self.confirmation.timeout_secs))
            .await;

        let (verification, probes) = match &outcome {
            TransactionOutcome::Confirmed {
                contract_address, ..
            } => {
                let probes = self
                    .run_probes(&executor, &policy, client.as_ref(), contract_address)
                    .await;

                let request = VerificationRequest {
                    contract_address: contract_address.clone(),
                    source: compiled.source.clone(),
                    contract_name: compiled.name.clone(),
                    compiler_version: format!("v{}", compiled.config.version),
                    optimization_used: compiled.config.optimize,
                    runs: compiled.config.optimize_runs,
                };

                let session = match verifier {
                    Some(api) => {
                        let poller = VerificationPoller::new(
                            api,
                            clock.clone(),
                            self.verification.status_attempts,
                            Duration::from_secs(self.verification.poll_interval_secs),
                        );
                        poller.submit_and_await(&request, api_key).await
                    }
                    None => {
                        if api_key.is_some() {
                            tracing::warn!(
                                "Verification API key provided but the network has no verification endpoint"
                            );
                        }
                        VerificationSession::not_submitted()
                    }
                };
                (session, probes)
            }
            _ => {
                // The contract address may not exist; verification must
                // never run against it.
                tracing::warn!("Deployment not confirmed, skipping verification");
                (VerificationSession::not_submitted(), Vec::new())
            }
        };

        let record = DeploymentRecord {
            deployment: DeploymentInfo {
                network: self.network.name.clone(),
                chain_id: self.network.chain_id,
                transaction_hash: hash.to_string(),
                deployer_address: deployer_address.to_string(),
                deployed_at: pending.submitted_at,
                explorer_url: explorer_link(
                    self.network.explorer_url.as_deref(),
                    &outcome,
                    &hash.to_string(),
                ),
            },
            outcome,
            compilation: CompilationInfo {
                contract_name: compiled.name.clone(),
                compiler_version: compiled.config.version.clone(),
                optimization_enabled: compiled.config.optimize,
                optimization_runs: compiled.config.optimize_runs,
                source_sha256: compiled.source_sha256.clone(),
                bytecode_keccak256: compiled.bytecode_keccak256.clone(),
            },
            verification,
            probes,
            abi: compiled.abi.clone(),
        };

        let store = RecordStore::new(&self.outdata);
        store.persist(&record)?;
        store.persist_source(&compiled.source)?;

        Ok(record)
    }

    /// Call each configured read-only probe function once, through the
    /// retry executor. Probe failures are logged, never fatal.
    async fn run_probes<C: ChainClient>(
        &self,
        executor: &RetryExecutor,
        policy: &RetryPolicy<RpcError>,
        client: &C,
        contract_address: &str,
    ) -> Vec<ProbeResult> {
        if self.probe_functions.is_empty() {
            return Vec::new();
        }

        let Ok(address) = contract_address.parse::<Address>() else {
            tracing::warn!(contract_address, "Unparseable contract address, skipping probes");
            return Vec::new();
        };

        let mut results = Vec::new();
        for function in &self.probe_functions {
            let data = probe_calldata(function);
            let output = match executor
                .execute(policy, || client.call(address, data.clone()))
                .await
            {
                OperationResult::Success(bytes) => Some(bytes.to_string()),
                OperationResult::RetryableFailure(err) | OperationResult::FatalFailure(err) => {
                    tracing::warn!(function = %function, error = %err, "Probe call failed");
                    None
                }
            };
            results.push(ProbeResult {
                function: function.clone(),
                output,
            });
        }
        results
    }
}

/// 4-byte selector calldata for a no-argument function call.
fn probe_calldata(function: &str) -> Bytes {
    let selector = keccak256(format!("{function}()").as_bytes());
    Bytes::copy_from_slice(&selector[..4])
}

/// Explorer link for the record: the contract page when confirmed, the
/// transaction page otherwise.
fn explorer_link(
    explorer_url: Option<&str>,
    outcome: &TransactionOutcome,
    tx_hash: &str,
) -> Option<String> {
    let base = explorer_url?.trim_end_matches('/').to_string();
    match outcome {
        TransactionOutcome::Confirmed {
            contract_address, ..
        } => Some(format!("{base}/address/{contract_address}")),
        _ => Some(format!("{base}/tx/{tx_hash}")),
    }
}
