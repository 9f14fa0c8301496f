//! Deployment transaction assembly and signing.
//!
//! Nonce and gas price are fetched once, before submission; the
//! confirmation phase only observes and never re-derives or resubmits.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{B256, Bytes, TxKind, U256};
use alloy_signer_local::PrivateKeySigner;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("invalid creation bytecode: {0}")]
    InvalidBytecode(String),
    #[error("invalid constructor arguments: {0}")]
    InvalidConstructorArgs(String),
    #[error("failed to sign transaction: {0}")]
    Signer(String),
}

/// Transaction parameters resolved before submission.
#[derive(Debug, Clone)]
pub struct TxParams {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub value: U256,
}

/// A broadcast deployment transaction awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub hash: B256,
    pub submitted_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn new(hash: B256) -> Self {
        Self {
            hash,
            submitted_at: Utc::now(),
        }
    }
}

/// Build and sign a legacy contract-creation transaction.
///
/// `creation_bytecode` is the hex creation code from the compiler (with or
/// without 0x prefix); `constructor_args` are appended ABI-encoded bytes.
/// Returns the raw transaction bytes ready for `eth_sendRawTransaction`.
pub fn sign_deployment(
    signer: &PrivateKeySigner,
    params: &TxParams,
    creation_bytecode: &str,
    constructor_args: &[u8],
) -> Result<Vec<u8>, SignError> {
    let mut input = hex::decode(creation_bytecode.trim_start_matches("0x"))
        .map_err(|e| SignError::InvalidBytecode(e.to_string()))?;
    input.extend_from_slice(constructor_args);

    let mut tx = TxLegacy {
        chain_id: Some(params.chain_id),
        nonce: params.nonce,
        gas_price: params.gas_price,
        gas_limit: params.gas_limit,
        to: TxKind::Create,
        value: params.value,
        input: Bytes::from(input),
    };

    let signature = signer
        .sign_transaction_sync(&mut tx)
        .map_err(|e| SignError::Signer(e.to_string()))?;
    let envelope: TxEnvelope = tx.into_signed(signature).into();

    Ok(envelope.encoded_2718())
}

/// Decode 0x-prefixed constructor argument hex from configuration.
pub fn decode_constructor_args(args: Option<&str>) -> Result<Vec<u8>, SignError> {
    match args {
        None => Ok(Vec::new()),
        Some(raw) => hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| SignError::InvalidConstructorArgs(e.to_string())),
    }
}
