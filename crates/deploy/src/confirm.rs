//! Transaction confirmation polling.
//!
//! After broadcast the pipeline owns a [`PendingTransaction`] and polls the
//! chain for its receipt until a terminal outcome is reached. The waiter
//! only observes; it never rebuilds or resubmits the transaction.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::retry::{OperationResult, RetryExecutor, RetryPolicy};
use crate::rpc::{ChainClient, RpcError, classify_rpc_error};
use crate::tx::PendingTransaction;

/// Terminal result of waiting on a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionOutcome {
    /// The transaction was mined and executed successfully.
    Confirmed {
        contract_address: String,
        gas_used: u64,
        block_number: u64,
    },
    /// The transaction was mined but execution failed.
    Reverted,
    /// No receipt became observable within the confirmation timeout.
    TimedOut,
}

impl TransactionOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TransactionOutcome::Confirmed { .. })
    }
}

/// Polls for a transaction receipt until confirmed, reverted, or timed out.
pub struct ConfirmationWaiter<C> {
    client: Arc<C>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    /// Per-tick retry budget for transient receipt-fetch errors. The retry
    /// delay equals the poll interval so a blip consumes wall-clock exactly
    /// like a normal poll tick.
    receipt_retry: RetryPolicy<RpcError>,
}

impl<C: ChainClient> ConfirmationWaiter<C> {
    pub fn new(
        client: Arc<C>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        retry_attempts: u32,
    ) -> Self {
        Self {
            client,
            clock,
            poll_interval,
            receipt_retry: RetryPolicy::new(retry_attempts, poll_interval, classify_rpc_error),
        }
    }

    /// Wait for the transaction's terminal state.
    ///
    /// State machine: poll for a receipt; no receipt and elapsed < timeout
    /// means sleep one poll interval and retry; a receipt resolves to
    /// `Confirmed` or `Reverted`; elapsed >= timeout resolves to `TimedOut`.
    /// A receipt fetch that still fails after its retry budget leaves the
    /// chain unobservable for that tick and counts like an absent receipt.
    pub async fn await_confirmation(
        &self,
        pending: &PendingTransaction,
        timeout: Duration,
    ) -> TransactionOutcome {
        let executor = RetryExecutor::new(self.clock.clone());
        let started = self.clock.now();

        tracing::info!(tx_hash = %pending.hash, "Waiting for confirmation...");

        loop {
            let fetched = executor
                .execute(&self.receipt_retry, || self.client.get_receipt(pending.hash))
                .await;

            match fetched {
                OperationResult::Success(Some(receipt)) => {
                    if receipt.succeeded() {
                        let contract_address = receipt.contract_address.unwrap_or_default();
                        tracing::info!(
                            contract_address = %contract_address,
                            gas_used = receipt.gas_used,
                            block_number = receipt.block_number,
                            "Transaction confirmed"
                        );
                        return TransactionOutcome::Confirmed {
                            contract_address,
                            gas_used: receipt.gas_used,
                            block_number: receipt.block_number,
                        };
                    }
                    tracing::warn!(tx_hash = %pending.hash, "Transaction reverted on-chain");
                    return TransactionOutcome::Reverted;
                }
                OperationResult::Success(None) => {
                    tracing::debug!(tx_hash = %pending.hash, "No receipt yet");
                }
                OperationResult::RetryableFailure(err) | OperationResult::FatalFailure(err) => {
                    tracing::warn!(
                        tx_hash = %pending.hash,
                        error = %err,
                        "Receipt fetch failed, chain state unobservable this tick"
                    );
                }
            }

            if self.clock.now().duration_since(started) >= timeout {
                tracing::warn!(
                    tx_hash = %pending.hash,
                    timeout_secs = timeout.as_secs(),
                    "Confirmation timed out"
                );
                return TransactionOutcome::TimedOut;
            }

            self.clock.sleep(self.poll_interval).await;
        }
    }
}
