//! crumpet-deploy - Contract deployment pipeline for BSC-style networks.
//!
//! This crate compiles a single-file Solidity contract, broadcasts a signed
//! creation transaction, polls for on-chain confirmation, optionally submits
//! the source to an explorer verification API, and persists a durable
//! deployment record.

mod clock;
pub use clock::{Clock, SystemClock};

mod retry;
pub use retry::{ErrorClass, OperationResult, RetryExecutor, RetryPolicy};

mod rpc;
pub use rpc::{ChainClient, HttpChainClient, RpcError, TransactionReceipt, classify_rpc_error};

mod compile;
pub use compile::{CompileError, CompiledContract, SolcConfig, compile_source};

mod tx;
pub use tx::{PendingTransaction, SignError, TxParams, decode_constructor_args, sign_deployment};

mod confirm;
pub use confirm::{ConfirmationWaiter, TransactionOutcome};

mod verify;
pub use verify::{
    DEFAULT_STATUS_ATTEMPTS, DEFAULT_STATUS_INTERVAL, HttpVerificationApi, StatusReply,
    VerificationApi, VerificationPoller, VerificationRequest, VerificationSession,
    VerificationState, VerifyError,
};

mod record;
pub use record::{
    CompilationInfo, DeploymentInfo, DeploymentRecord, ProbeResult, RECORD_FILENAME, RecordError,
    RecordStore, SOURCE_FILENAME,
};

mod report;
pub use report::manual_verification_guide;

mod deployer;
pub use deployer::{
    CRUMPCONF_FILENAME, ConfirmationConfig, DeployError, Deployer, NetworkConfig, RetryConfig,
    VerificationConfig,
};
