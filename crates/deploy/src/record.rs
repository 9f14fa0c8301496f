//! Durable deployment records.
//!
//! The record is the one artifact that must survive anything that happens
//! after a transaction hash exists. It is written via an atomic replace
//! (write a sibling temp file, then rename) so a crash mid-write can never
//! leave a half-written record behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::confirm::TransactionOutcome;
use crate::verify::VerificationSession;

/// File name of the persisted record inside the output directory.
pub const RECORD_FILENAME: &str = "deployment_result.json";
/// File name of the byte-exact source saved for manual verification.
pub const SOURCE_FILENAME: &str = "verification_source.sol";

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("failed to serialize deployment record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where and by whom the contract was deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub network: String,
    pub chain_id: u64,
    pub transaction_hash: String,
    pub deployer_address: String,
    pub deployed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

/// Compiler settings and artifact fingerprints, recorded so verification
/// can reproduce the byte-exact build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationInfo {
    pub contract_name: String,
    pub compiler_version: String,
    pub optimization_enabled: bool,
    pub optimization_runs: u32,
    pub source_sha256: String,
    pub bytecode_keccak256: String,
}

/// Output of one read-only probe call against the deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub function: String,
    /// Raw hex return data; `None` when the call failed.
    pub output: Option<String>,
}

/// The aggregate result of one pipeline run, keyed by contract address and
/// transaction hash. Re-running for the same transaction overwrites the
/// stored record; it never appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployment: DeploymentInfo,
    pub outcome: TransactionOutcome,
    pub compilation: CompilationInfo,
    pub verification: VerificationSession,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeResult>,
    pub abi: Value,
}

impl DeploymentRecord {
    /// Contract address, when the deployment was confirmed.
    pub fn contract_address(&self) -> Option<&str> {
        match &self.outcome {
            TransactionOutcome::Confirmed {
                contract_address, ..
            } => Some(contract_address),
            _ => None,
        }
    }
}

/// Writes deployment artifacts into an output directory.
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILENAME)
    }

    pub fn source_path(&self) -> PathBuf {
        self.dir.join(SOURCE_FILENAME)
    }

    /// Persist the record, overwriting any previous record atomically.
    ///
    /// Persisting the same record twice produces byte-identical output.
    pub fn persist(&self, record: &DeploymentRecord) -> Result<PathBuf, RecordError> {
        let json = serde_json::to_string_pretty(record)?;
        let path = self.record_path();
        self.write_atomic(&path, json.as_bytes())?;
        tracing::info!(path = %path.display(), "Deployment record saved");
        Ok(path)
    }

    /// Save the byte-exact source text used for compilation.
    pub fn persist_source(&self, source: &str) -> Result<PathBuf, RecordError> {
        let path = self.source_path();
        self.write_atomic(&path, source.as_bytes())?;
        tracing::info!(path = %path.display(), "Verification source saved");
        Ok(path)
    }

    /// Load a previously persisted record.
    pub fn load(&self) -> Result<DeploymentRecord, RecordError> {
        let path = self.record_path();
        let content = std::fs::read_to_string(&path).map_err(|e| RecordError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write through a sibling temp file and rename over the target.
    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), RecordError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RecordError::Io {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content).map_err(|e| RecordError::Io {
            path: tmp.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp, path).map_err(|e| RecordError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }
}
