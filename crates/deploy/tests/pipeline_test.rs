//! End-to-end pipeline tests for crumpet-deploy.
//!
//! The chain client and verification API are scripted mocks, so the whole
//! compile-broadcast-confirm-verify-persist path runs without a node,
//! without solc, and without real time passing (poll intervals are zero).
//! Run with: cargo test --test pipeline_test

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use crumpet_deploy::{
    ChainClient, CompiledContract, ConfirmationConfig, DeployError, Deployer, NetworkConfig,
    RecordStore, RetryConfig, RpcError, SolcConfig, StatusReply, SystemClock, TransactionOutcome,
    TransactionReceipt, VerificationApi, VerificationConfig, VerificationRequest,
    VerificationState, VerifyError,
};
use alloy_signer_local::PrivateKeySigner;
use tempdir::TempDir;

// Well-known anvil dev key (account 0).
const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const CONTRACT_ADDRESS: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Scripted chain: fixed answers for the pre-broadcast calls, one receipt
/// reply popped per confirmation poll.
struct MockChain {
    balance: U256,
    fail_broadcast: bool,
    receipts: Mutex<VecDeque<Option<TransactionReceipt>>>,
    receipt_polls: AtomicU32,
    eth_calls: AtomicU32,
}

impl MockChain {
    fn new(receipts: Vec<Option<TransactionReceipt>>) -> Self {
        Self {
            balance: U256::from(1_000_000_000_000_000_000u64),
            fail_broadcast: false,
            receipts: Mutex::new(receipts.into()),
            receipt_polls: AtomicU32::new(0),
            eth_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_balance(&self, _address: Address) -> Result<U256, RpcError> {
        Ok(self.balance)
    }

    async fn get_gas_price(&self) -> Result<u128, RpcError> {
        Ok(10_000_000_000)
    }

    async fn get_nonce(&self, _address: Address) -> Result<u64, RpcError> {
        Ok(7)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcError> {
        assert!(!raw.is_empty(), "broadcast must carry a signed payload");
        if self.fail_broadcast {
            return Err(RpcError::Rpc {
                code: -32000,
                message: "insufficient funds for gas * price + value".to_string(),
            });
        }
        Ok(B256::repeat_byte(0x11))
    }

    async fn get_receipt(&self, _hash: B256) -> Result<Option<TransactionReceipt>, RpcError> {
        self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipts.lock().unwrap().pop_front().flatten())
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        self.eth_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(data.len(), 4, "probe calldata is a bare selector");
        Ok(Bytes::from(vec![0u8; 32]))
    }
}

/// Scripted verification API.
struct MockVerifier {
    statuses: Mutex<VecDeque<Result<StatusReply, VerifyError>>>,
    submissions: AtomicU32,
    checks: AtomicU32,
}

impl MockVerifier {
    fn new(statuses: Vec<Result<StatusReply, VerifyError>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            submissions: AtomicU32::new(0),
            checks: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl VerificationApi for MockVerifier {
    async fn submit(
        &self,
        request: &VerificationRequest,
        _api_key: &str,
    ) -> Result<String, VerifyError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.contract_address, CONTRACT_ADDRESS);
        assert!(request.compiler_version.starts_with('v'));
        Ok("guid-e2e".to_string())
    }

    async fn check_status(&self, guid: &str, _api_key: &str) -> Result<StatusReply, VerifyError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        assert_eq!(guid, "guid-e2e");
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(StatusReply {
                    ok: false,
                    message: "Pending in queue".to_string(),
                })
            })
    }
}

fn success_receipt() -> TransactionReceipt {
    TransactionReceipt {
        status: 1,
        contract_address: Some(CONTRACT_ADDRESS.to_string()),
        gas_used: 1_234_567,
        block_number: 42,
    }
}

fn failed_receipt() -> TransactionReceipt {
    TransactionReceipt {
        status: 0,
        contract_address: None,
        gas_used: 1_234_567,
        block_number: 42,
    }
}

fn pending_reply() -> Result<StatusReply, VerifyError> {
    Ok(StatusReply {
        ok: false,
        message: "Pending in queue".to_string(),
    })
}

fn verified_reply() -> Result<StatusReply, VerifyError> {
    Ok(StatusReply {
        ok: true,
        message: "Pass - Verified".to_string(),
    })
}

fn compiled_fixture() -> CompiledContract {
    CompiledContract {
        name: "Token".to_string(),
        abi: serde_json::json!([
            {"type": "function", "name": "name", "inputs": [], "outputs": []}
        ]),
        bytecode: "6080604052".to_string(),
        runtime_bytecode: "60806040".to_string(),
        source: "contract Token {}".to_string(),
        source_sha256: "ab".repeat(32),
        bytecode_keccak256: format!("0x{}", "cd".repeat(32)),
        config: SolcConfig::default(),
    }
}

fn test_deployer(outdata: PathBuf) -> Deployer {
    Deployer {
        contract: PathBuf::from("contracts/Token.sol"),
        contract_name: Some("Token".to_string()),
        outdata,
        gas_limit: 2_000_000,
        constructor_args: None,
        probe_functions: vec!["name".to_string()],
        network: NetworkConfig {
            name: "bsc-testnet".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 97,
            explorer_url: Some("https://testnet.bscscan.com".to_string()),
            verification_api_url: Some("https://api-testnet.bscscan.com/api".to_string()),
        },
        solc: SolcConfig::default(),
        retry: RetryConfig {
            max_attempts: 2,
            delay_secs: 0,
        },
        confirmation: ConfirmationConfig {
            timeout_secs: 5,
            poll_interval_secs: 0,
        },
        verification: VerificationConfig {
            status_attempts: 5,
            poll_interval_secs: 0,
        },
    }
}

fn dev_signer() -> PrivateKeySigner {
    DEV_KEY.parse().expect("valid dev key")
}

#[tokio::test]
async fn full_pipeline_confirms_verifies_and_persists() {
    init_test_tracing();

    let dir = TempDir::new("crumpet-e2e").unwrap();
    let deployer = test_deployer(dir.path().to_path_buf());

    let chain = Arc::new(MockChain::new(vec![None, None, Some(success_receipt())]));
    let verifier = MockVerifier::new(vec![pending_reply(), verified_reply()]);

    let record = deployer
        .deploy_with(
            &dev_signer(),
            compiled_fixture(),
            chain.clone(),
            Some(verifier),
            Arc::new(SystemClock),
            Some("test-api-key"),
        )
        .await
        .expect("pipeline should complete");

    // Confirmation: two absent polls then the receipt, no extra polling.
    assert_eq!(chain.receipt_polls.load(Ordering::SeqCst), 3);
    match &record.outcome {
        TransactionOutcome::Confirmed {
            contract_address,
            gas_used,
            block_number,
        } => {
            assert_eq!(contract_address, CONTRACT_ADDRESS);
            assert_eq!(*gas_used, 1_234_567);
            assert_eq!(*block_number, 42);
        }
        other => panic!("expected Confirmed, got {other:?}"),
    }

    // Verification reached a terminal state through pending.
    assert_eq!(record.verification.state, VerificationState::Verified);
    assert_eq!(record.verification.submission_guid.as_deref(), Some("guid-e2e"));
    assert_eq!(record.verification.attempts_made, 2);

    // The probe ran against the deployed address.
    assert_eq!(chain.eth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(record.probes.len(), 1);
    assert!(record.probes[0].output.is_some());

    // The record and the exact source were persisted.
    let store = RecordStore::new(dir.path());
    let loaded = store.load().expect("record file exists");
    assert_eq!(loaded, record);
    assert_eq!(
        std::fs::read_to_string(store.source_path()).unwrap(),
        "contract Token {}"
    );
    assert!(
        record
            .deployment
            .explorer_url
            .as_deref()
            .unwrap()
            .ends_with(CONTRACT_ADDRESS)
    );
}

#[tokio::test]
async fn persisting_the_same_run_twice_is_byte_identical() {
    init_test_tracing();

    let dir = TempDir::new("crumpet-e2e").unwrap();
    let deployer = test_deployer(dir.path().to_path_buf());

    let chain = Arc::new(MockChain::new(vec![Some(success_receipt())]));
    let verifier = MockVerifier::new(vec![verified_reply()]);

    let record = deployer
        .deploy_with(
            &dev_signer(),
            compiled_fixture(),
            chain,
            Some(verifier),
            Arc::new(SystemClock),
            Some("test-api-key"),
        )
        .await
        .unwrap();

    let store = RecordStore::new(dir.path());
    let first = std::fs::read(store.record_path()).unwrap();

    // Re-running persistence for the same transaction overwrites in place.
    store.persist(&record).unwrap();
    let second = std::fs::read(store.record_path()).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn reverted_deployment_is_recorded_and_skips_verification() {
    init_test_tracing();

    let dir = TempDir::new("crumpet-e2e").unwrap();
    let deployer = test_deployer(dir.path().to_path_buf());

    let chain = Arc::new(MockChain::new(vec![Some(failed_receipt())]));
    let verifier = MockVerifier::new(vec![verified_reply()]);

    let record = deployer
        .deploy_with(
            &dev_signer(),
            compiled_fixture(),
            chain.clone(),
            Some(verifier),
            Arc::new(SystemClock),
            Some("test-api-key"),
        )
        .await
        .expect("a revert still produces a record");

    assert_eq!(record.outcome, TransactionOutcome::Reverted);
    // Verification never ran against a nonexistent address.
    assert_eq!(record.verification.state, VerificationState::NotSubmitted);
    assert_eq!(chain.eth_calls.load(Ordering::SeqCst), 0);
    assert!(record.probes.is_empty());

    // The record survived on disk regardless.
    let loaded = RecordStore::new(dir.path()).load().unwrap();
    assert_eq!(loaded.outcome, TransactionOutcome::Reverted);
}

#[tokio::test]
async fn confirmation_timeout_is_recorded() {
    init_test_tracing();

    let dir = TempDir::new("crumpet-e2e").unwrap();
    let mut deployer = test_deployer(dir.path().to_path_buf());
    // Zero timeout: the first absent poll already exceeds it.
    deployer.confirmation.timeout_secs = 0;

    let chain = Arc::new(MockChain::new(vec![]));
    let verifier = MockVerifier::new(vec![]);

    let record = deployer
        .deploy_with(
            &dev_signer(),
            compiled_fixture(),
            chain,
            Some(verifier),
            Arc::new(SystemClock),
            None,
        )
        .await
        .unwrap();

    assert_eq!(record.outcome, TransactionOutcome::TimedOut);
    assert_eq!(record.verification.state, VerificationState::NotSubmitted);
    assert!(RecordStore::new(dir.path()).load().is_ok());
}

#[tokio::test]
async fn broadcast_failure_aborts_without_a_record() {
    init_test_tracing();

    let dir = TempDir::new("crumpet-e2e").unwrap();
    let deployer = test_deployer(dir.path().to_path_buf());

    let mut chain = MockChain::new(vec![]);
    chain.fail_broadcast = true;

    let result = deployer
        .deploy_with(
            &dev_signer(),
            compiled_fixture(),
            Arc::new(chain),
            Some(MockVerifier::new(vec![])),
            Arc::new(SystemClock),
            None,
        )
        .await;

    assert!(matches!(result, Err(DeployError::Rpc(_))));
    // No transaction hash ever existed, so nothing was persisted.
    assert!(RecordStore::new(dir.path()).load().is_err());
}

#[tokio::test]
async fn unfunded_account_aborts_before_broadcast() {
    init_test_tracing();

    let dir = TempDir::new("crumpet-e2e").unwrap();
    let deployer = test_deployer(dir.path().to_path_buf());

    let mut chain = MockChain::new(vec![Some(success_receipt())]);
    chain.balance = U256::ZERO;

    let result = deployer
        .deploy_with(
            &dev_signer(),
            compiled_fixture(),
            Arc::new(chain),
            Some(MockVerifier::new(vec![])),
            Arc::new(SystemClock),
            None,
        )
        .await;

    assert!(matches!(result, Err(DeployError::Config(_))));
    assert!(RecordStore::new(dir.path()).load().is_err());
}
