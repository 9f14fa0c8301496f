//! Solidity compilation through the `solc` standard JSON interface.
//!
//! The compiler is an external collaborator: source text plus settings in,
//! ABI and bytecode out. Compilation failures are fatal and never retried.

use std::collections::BTreeMap;
use std::process::Stdio;

use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// The source file name under which the contract is compiled. Verification
/// services re-compile against the same single-file layout.
const SOURCE_UNIT: &str = "contract.sol";

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to run solc: {0}")]
    Solc(String),
    #[error("compilation failed:\n{0}")]
    Failed(String),
    #[error("contract `{0}` not found in compiler output")]
    MissingContract(String),
    #[error("compiler output is ambiguous: multiple contracts, pass an explicit contract name")]
    AmbiguousContract,
    #[error("malformed compiler output: {0}")]
    Malformed(String),
}

/// Compiler settings, kept alongside the record so verification can use the
/// byte-exact configuration.
///
/// Defaults match the explorer-compatible settings the deployments target:
/// solc 0.8.19, optimizer enabled, 200 runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolcConfig {
    /// Full compiler version string, e.g. `0.8.19+commit.7dd6d404`.
    pub version: String,
    pub optimize: bool,
    pub optimize_runs: u32,
}

impl Default for SolcConfig {
    fn default() -> Self {
        Self {
            version: "0.8.19+commit.7dd6d404".to_string(),
            optimize: true,
            optimize_runs: 200,
        }
    }
}

/// A compiled contract artifact.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub name: String,
    /// Ordered list of function/event descriptors as emitted by solc.
    pub abi: Value,
    /// Creation bytecode, hex without 0x prefix.
    pub bytecode: String,
    /// Runtime (deployed) bytecode, hex without 0x prefix.
    pub runtime_bytecode: String,
    /// The exact source text that was compiled.
    pub source: String,
    /// SHA-256 of the source text.
    pub source_sha256: String,
    /// Keccak-256 of the creation bytecode.
    pub bytecode_keccak256: String,
    pub config: SolcConfig,
}

/// Compile a single-file contract source with `solc --standard-json`.
///
/// `contract_name` selects the contract when the source defines several;
/// a source with exactly one contract needs no name.
pub async fn compile_source(
    source: &str,
    contract_name: Option<&str>,
    config: &SolcConfig,
) -> Result<CompiledContract, CompileError> {
    tracing::info!(
        version = %config.version,
        optimize = config.optimize,
        runs = config.optimize_runs,
        "Compiling contract..."
    );

    let input = build_input(source, config);
    let raw = run_solc(&input).await?;
    let compiled = parse_output(&raw, source, contract_name, config)?;

    tracing::info!(
        contract = %compiled.name,
        bytecode_len = compiled.bytecode.len(),
        bytecode_hash = %compiled.bytecode_keccak256,
        "Contract compiled"
    );

    Ok(compiled)
}

/// Build the standard JSON input document.
fn build_input(source: &str, config: &SolcConfig) -> Value {
    json!({
        "language": "Solidity",
        "sources": {
            SOURCE_UNIT: { "content": source }
        },
        "settings": {
            "optimizer": {
                "enabled": config.optimize,
                "runs": config.optimize_runs
            },
            "outputSelection": {
                "*": {
                    "*": ["abi", "evm.bytecode.object", "evm.deployedBytecode.object"]
                }
            }
        }
    })
}

/// Run `solc --standard-json`, feeding the input document on stdin.
async fn run_solc(input: &Value) -> Result<String, CompileError> {
    let mut child = Command::new("solc")
        .arg("--standard-json")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CompileError::Solc(format!("failed to spawn solc: {e}")))?;

    let document =
        serde_json::to_vec(input).map_err(|e| CompileError::Solc(format!("input encoding: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| CompileError::Solc("failed to open solc stdin".to_string()))?;
    stdin
        .write_all(&document)
        .await
        .map_err(|e| CompileError::Solc(format!("failed to write solc stdin: {e}")))?;
    drop(stdin);

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| CompileError::Solc(format!("failed to wait for solc: {e}")))?;

    if !output.status.success() {
        return Err(CompileError::Solc(format!(
            "solc exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| CompileError::Malformed(e.to_string()))
}

// -- standard JSON output shapes --

#[derive(Debug, Deserialize)]
struct SolcOutput {
    #[serde(default)]
    errors: Vec<SolcDiagnostic>,
    /// source unit -> contract name -> artifact
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, SolcContract>>,
}

#[derive(Debug, Deserialize)]
struct SolcDiagnostic {
    severity: String,
    #[serde(rename = "formattedMessage")]
    formatted_message: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SolcContract {
    abi: Value,
    evm: SolcEvm,
}

#[derive(Debug, Deserialize)]
struct SolcEvm {
    bytecode: SolcBytecode,
    #[serde(rename = "deployedBytecode")]
    deployed_bytecode: SolcBytecode,
}

#[derive(Debug, Deserialize)]
struct SolcBytecode {
    object: String,
}

/// Parse the standard JSON output and select the requested contract.
fn parse_output(
    raw: &str,
    source: &str,
    contract_name: Option<&str>,
    config: &SolcConfig,
) -> Result<CompiledContract, CompileError> {
    let output: SolcOutput = serde_json::from_str(raw)
        .map_err(|e| CompileError::Malformed(format!("invalid standard JSON output: {e}")))?;

    let errors: Vec<String> = output
        .errors
        .iter()
        .filter(|d| d.severity == "error")
        .map(|d| d.formatted_message.clone().unwrap_or_else(|| d.message.clone()))
        .collect();
    if !errors.is_empty() {
        return Err(CompileError::Failed(errors.join("\n")));
    }

    let contracts = output
        .contracts
        .into_iter()
        .flat_map(|(_, by_name)| by_name)
        .collect::<BTreeMap<String, SolcContract>>();

    let (name, artifact) = match contract_name {
        Some(wanted) => contracts
            .into_iter()
            .find(|(name, _)| name == wanted)
            .ok_or_else(|| CompileError::MissingContract(wanted.to_string()))?,
        None => {
            if contracts.len() > 1 {
                return Err(CompileError::AmbiguousContract);
            }
            contracts
                .into_iter()
                .next()
                .ok_or_else(|| CompileError::MissingContract("<any>".to_string()))?
        }
    };

    let bytecode = artifact.evm.bytecode.object;
    if bytecode.is_empty() {
        return Err(CompileError::Malformed(format!(
            "contract `{name}` produced no creation bytecode (abstract or interface?)"
        )));
    }

    let code_bytes = hex::decode(bytecode.trim_start_matches("0x"))
        .map_err(|e| CompileError::Malformed(format!("non-hex bytecode for `{name}`: {e}")))?;

    Ok(CompiledContract {
        name,
        abi: artifact.abi,
        bytecode_keccak256: format!("{}", keccak256(&code_bytes)),
        bytecode,
        runtime_bytecode: artifact.evm.deployed_bytecode.object,
        source: source.to_string(),
        source_sha256: sha256_hex(source.as_bytes()),
        config: config.clone(),
    })
}

/// Hex-encoded SHA-256 digest.
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
