//! JSON-RPC chain client for Ethereum-compatible endpoints.

use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::retry::ErrorClass;

/// Default timeout for a single RPC request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors produced by the chain client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The request never produced a well-formed response (connection reset,
    /// timeout, DNS failure). Worth retrying.
    #[error("transport error: {0}")]
    Transport(String),
    /// The node replied with a JSON-RPC error object. Retrying the same
    /// call will not help.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The node replied but the payload did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RpcError {
    /// Transport blips are retryable; node-side errors are not.
    pub fn class(&self) -> ErrorClass {
        match self {
            RpcError::Transport(_) => ErrorClass::Retryable,
            RpcError::Rpc { .. } | RpcError::Malformed(_) => ErrorClass::Fatal,
        }
    }
}

/// Classifier for [`crate::RetryPolicy`] over chain client errors.
pub fn classify_rpc_error(err: &RpcError) -> ErrorClass {
    err.class()
}

/// A mined transaction receipt, reduced to the fields the pipeline reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub status: u64,
    pub contract_address: Option<String>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub gas_used: u64,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub block_number: u64,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

/// The RPC surface the pipeline needs from a chain node.
///
/// All methods may fail with a transient [`RpcError::Transport`] or a
/// permanent [`RpcError::Rpc`].
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_balance(&self, address: Address) -> Result<U256, RpcError>;

    async fn get_gas_price(&self) -> Result<u128, RpcError>;

    async fn get_nonce(&self, address: Address) -> Result<u64, RpcError>;

    /// Broadcast a signed raw transaction; returns the transaction hash.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcError>;

    /// Fetch the receipt for a transaction, or `None` if it is not mined yet.
    async fn get_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>, RpcError>;

    /// Execute a read-only call against a deployed contract.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError>;
}

/// [`ChainClient`] over HTTP JSON-RPC.
pub struct HttpChainClient {
    client: reqwest::Client,
    url: String,
}

impl HttpChainClient {
    pub fn new(url: impl Into<String>) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Make a JSON-RPC call and deserialize the result.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("failed to send {method} request: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Transport(format!("failed to read {method} response: {e}")))?;

        if let Some(error) = body.get("error") {
            return Err(RpcError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        let result = body
            .get("result")
            .ok_or_else(|| RpcError::Malformed(format!("no result in {method} response")))?
            .clone();

        serde_json::from_value(result)
            .map_err(|e| RpcError::Malformed(format!("failed to deserialize {method} result: {e}")))
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn get_balance(&self, address: Address) -> Result<U256, RpcError> {
        let result: String = self
            .request("eth_getBalance", vec![json!(address.to_string()), json!("latest")])
            .await?;
        parse_hex_u256(&result)
    }

    async fn get_gas_price(&self) -> Result<u128, RpcError> {
        let result: String = self.request("eth_gasPrice", vec![]).await?;
        parse_hex_u128(&result)
    }

    async fn get_nonce(&self, address: Address) -> Result<u64, RpcError> {
        let result: String = self
            .request(
                "eth_getTransactionCount",
                vec![json!(address.to_string()), json!("latest")],
            )
            .await?;
        parse_hex_u64(&result)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcError> {
        let result: String = self
            .request("eth_sendRawTransaction", vec![json!(raw.to_string())])
            .await?;
        result
            .parse::<B256>()
            .map_err(|e| RpcError::Malformed(format!("invalid transaction hash '{result}': {e}")))
    }

    async fn get_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>, RpcError> {
        self.request("eth_getTransactionReceipt", vec![json!(hash.to_string())])
            .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let result: String = self
            .request(
                "eth_call",
                vec![
                    json!({"to": to.to_string(), "data": data.to_string()}),
                    json!("latest"),
                ],
            )
            .await?;
        result
            .parse::<Bytes>()
            .map_err(|e| RpcError::Malformed(format!("invalid call result '{result}': {e}")))
    }
}

fn parse_hex_u64(s: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::Malformed(format!("invalid hex quantity '{s}': {e}")))
}

fn parse_hex_u128(s: &str) -> Result<u128, RpcError> {
    u128::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::Malformed(format!("invalid hex quantity '{s}': {e}")))
}

fn parse_hex_u256(s: &str) -> Result<U256, RpcError> {
    U256::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::Malformed(format!("invalid hex quantity '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_quantities() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x1b4").unwrap(), 436);
        assert_eq!(parse_hex_u128("0x3b9aca00").unwrap(), 1_000_000_000);
        assert_eq!(
            parse_hex_u256("0xde0b6b3a7640000").unwrap(),
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert!(parse_hex_u64("0xzz").is_err());
        assert!(parse_hex_u64("").is_err());
    }

    #[test]
    fn test_receipt_deserialization() {
        let raw = serde_json::json!({
            "status": "0x1",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "gasUsed": "0x1a2b3c",
            "blockNumber": "0x42",
            "transactionHash": "0xabc",
        });

        let receipt: TransactionReceipt = serde_json::from_value(raw).unwrap();
        assert!(receipt.succeeded());
        assert_eq!(
            receipt.contract_address.as_deref(),
            Some("0x5fbdb2315678afecb367f032d93f642f64180aa3")
        );
        assert_eq!(receipt.gas_used, 0x1a2b3c);
        assert_eq!(receipt.block_number, 0x42);
    }

    #[test]
    fn test_reverted_receipt() {
        let raw = serde_json::json!({
            "status": "0x0",
            "contractAddress": null,
            "gasUsed": "0x5208",
            "blockNumber": "0x10",
        });

        let receipt: TransactionReceipt = serde_json::from_value(raw).unwrap();
        assert!(!receipt.succeeded());
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            RpcError::Transport("reset".into()).class(),
            ErrorClass::Retryable
        );
        assert_eq!(
            RpcError::Rpc {
                code: -32000,
                message: "nonce too low".into()
            }
            .class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            RpcError::Malformed("garbage".into()).class(),
            ErrorClass::Fatal
        );
    }
}
