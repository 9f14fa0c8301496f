//! Contract source verification through an explorer HTTP API.
//!
//! Verification is asynchronous and best-effort: the contract is already
//! live on-chain by the time it runs, so no verification outcome ever rolls
//! back or invalidates the deployment itself.
//!
//! Two phases. Submission is single-shot: the upstream service may reject a
//! duplicate submission for the same address, so nothing about it is
//! retried. Status polling runs through the retry executor with a bounded
//! attempt cap shared by "still pending" replies and transport errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::retry::{ErrorClass, OperationResult, RetryExecutor, RetryPolicy};

/// The literal status message the service returns while a job is still
/// queued. Only this message is treated as non-terminal; every other
/// non-success status ends polling immediately. The asymmetry is
/// deliberate: a broader terminal-failure match could swallow transient
/// status text the service happens to emit.
const PENDING_MARKER: &str = "Pending in queue";

/// Default bound on status-check attempts.
pub const DEFAULT_STATUS_ATTEMPTS: u32 = 10;
/// Default pause between status checks.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(15);

/// Errors from the verification service.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The request never reached the service or the reply never arrived.
    #[error("transport error: {0}")]
    Transport(String),
    /// The service answered and said no.
    #[error("verification service rejected the request: {0}")]
    Rejected(String),
    /// The service answered with something unparseable.
    #[error("malformed verification response: {0}")]
    Malformed(String),
}

/// Lifecycle of one verification job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    NotSubmitted,
    Submitted,
    Pending,
    Verified,
    Failed,
    TimedOut,
}

/// The session a verification run leaves behind, persisted in the
/// deployment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSession {
    /// Set exactly once, on the first successful submission.
    pub submission_guid: Option<String>,
    /// Status checks performed (pending replies and transport errors both
    /// count).
    pub attempts_made: u32,
    pub state: VerificationState,
    /// Last message received from the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl VerificationSession {
    /// Session for a run with no API key configured: nothing was sent.
    pub fn not_submitted() -> Self {
        Self {
            submission_guid: None,
            attempts_made: 0,
            state: VerificationState::NotSubmitted,
            detail: None,
        }
    }
}

/// Submission payload for an Etherscan-style `verifysourcecode` call.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub contract_address: String,
    /// Byte-exact source text used for compilation.
    pub source: String,
    pub contract_name: String,
    /// Long version string, e.g. `v0.8.19+commit.7dd6d404`.
    pub compiler_version: String,
    pub optimization_used: bool,
    pub runs: u32,
}

/// Reply to a status check: whether the service flagged success, plus the
/// raw result message.
#[derive(Debug, Clone)]
pub struct StatusReply {
    pub ok: bool,
    pub message: String,
}

/// The verification service surface: submit once, then poll a GUID.
#[async_trait]
pub trait VerificationApi: Send + Sync {
    /// Submit source for verification; returns the tracking GUID.
    async fn submit(
        &self,
        request: &VerificationRequest,
        api_key: &str,
    ) -> Result<String, VerifyError>;

    /// Check the status of a previously submitted job.
    async fn check_status(&self, guid: &str, api_key: &str) -> Result<StatusReply, VerifyError>;
}

/// Internal classification carrier for one status check.
#[derive(Debug, thiserror::Error)]
enum StatusCheckError {
    #[error("still pending: {0}")]
    StillPending(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Terminal(String),
}

fn classify_status_error(err: &StatusCheckError) -> ErrorClass {
    match err {
        StatusCheckError::StillPending(_) | StatusCheckError::Transport(_) => ErrorClass::Retryable,
        StatusCheckError::Terminal(_) => ErrorClass::Fatal,
    }
}

/// Drives the two-phase verification protocol to a terminal session state.
pub struct VerificationPoller<A> {
    api: A,
    clock: Arc<dyn Clock>,
    status_attempts: u32,
    poll_interval: Duration,
}

impl<A: VerificationApi> VerificationPoller<A> {
    pub fn new(
        api: A,
        clock: Arc<dyn Clock>,
        status_attempts: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            clock,
            status_attempts,
            poll_interval,
        }
    }

    /// Submit the artifact and poll until the job reaches a terminal state.
    ///
    /// Without an API key nothing is sent and the session stays
    /// `NotSubmitted`. A rejected submission yields `Failed` with zero
    /// status checks. Exhausting the attempt cap while still pending yields
    /// `TimedOut`.
    pub async fn submit_and_await(
        &self,
        request: &VerificationRequest,
        api_key: Option<&str>,
    ) -> VerificationSession {
        let Some(api_key) = api_key else {
            tracing::info!("No verification API key configured, skipping submission");
            return VerificationSession::not_submitted();
        };

        let guid = match self.api.submit(request, api_key).await {
            Ok(guid) => guid,
            Err(err) => {
                tracing::warn!(
                    contract_address = %request.contract_address,
                    error = %err,
                    "Verification submission failed"
                );
                return VerificationSession {
                    submission_guid: None,
                    attempts_made: 0,
                    state: VerificationState::Failed,
                    detail: Some(err.to_string()),
                };
            }
        };

        tracing::info!(guid = %guid, "Verification submitted, polling status...");

        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(self.status_attempts, self.poll_interval, classify_status_error);
        let executor = RetryExecutor::new(self.clock.clone());

        let outcome = executor
            .execute(&policy, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    match self.api.check_status(&guid, api_key).await {
                        Ok(reply) if reply.ok => Ok(reply.message),
                        Ok(reply) if reply.message.contains(PENDING_MARKER) => {
                            Err(StatusCheckError::StillPending(reply.message))
                        }
                        Ok(reply) => Err(StatusCheckError::Terminal(reply.message)),
                        Err(VerifyError::Transport(msg)) => Err(StatusCheckError::Transport(msg)),
                        Err(other) => Err(StatusCheckError::Terminal(other.to_string())),
                    }
                }
            })
            .await;

        let attempts_made = attempts.load(Ordering::SeqCst);
        let (state, detail) = match outcome {
            OperationResult::Success(message) => {
                tracing::info!(guid = %guid, attempts = attempts_made, "Contract verified");
                (VerificationState::Verified, Some(message))
            }
            OperationResult::FatalFailure(err) => {
                tracing::warn!(guid = %guid, attempts = attempts_made, error = %err, "Verification failed");
                (VerificationState::Failed, Some(err.to_string()))
            }
            OperationResult::RetryableFailure(err) => {
                tracing::warn!(
                    guid = %guid,
                    attempts = attempts_made,
                    error = %err,
                    "Verification still unresolved after attempt cap"
                );
                (VerificationState::TimedOut, Some(err.to_string()))
            }
        };

        VerificationSession {
            submission_guid: Some(guid),
            attempts_made,
            state,
            detail,
        }
    }
}

/// [`VerificationApi`] over an Etherscan-compatible HTTP endpoint.
pub struct HttpVerificationApi {
    client: reqwest::Client,
    api_url: String,
}

/// Wire shape shared by submission and status replies.
#[derive(Debug, Deserialize)]
struct ApiReply {
    status: String,
    result: String,
}

impl HttpVerificationApi {
    pub fn new(api_url: impl Into<String>) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VerifyError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl VerificationApi for HttpVerificationApi {
    async fn submit(
        &self,
        request: &VerificationRequest,
        api_key: &str,
    ) -> Result<String, VerifyError> {
        let runs = request.runs.to_string();
        let form = [
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("apikey", api_key),
            ("codeformat", "solidity-single-file"),
            ("contractaddress", request.contract_address.as_str()),
            ("sourceCode", request.source.as_str()),
            ("contractname", request.contract_name.as_str()),
            ("compilerversion", request.compiler_version.as_str()),
            (
                "optimizationUsed",
                if request.optimization_used { "1" } else { "0" },
            ),
            ("runs", runs.as_str()),
        ];

        let response = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| VerifyError::Transport(format!("submission request failed: {e}")))?;

        let reply: ApiReply = response
            .json()
            .await
            .map_err(|e| VerifyError::Malformed(format!("submission reply: {e}")))?;

        if reply.status == "1" {
            Ok(reply.result)
        } else {
            Err(VerifyError::Rejected(reply.result))
        }
    }

    async fn check_status(&self, guid: &str, api_key: &str) -> Result<StatusReply, VerifyError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
                ("apikey", api_key),
            ])
            .send()
            .await
            .map_err(|e| VerifyError::Transport(format!("status request failed: {e}")))?;

        let reply: ApiReply = response
            .json()
            .await
            .map_err(|e| VerifyError::Malformed(format!("status reply: {e}")))?;

        Ok(StatusReply {
            ok: reply.status == "1",
            message: reply.result,
        })
    }
}
