use std::{sync::Arc, time::Duration};

use jsonrpsee::{
    core::{client::ClientT as _, params::ArrayParams},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
    ws_client::{WsClient, WsClientBuilder},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

use crate::wait::{PollStatus, WaitError, WaitOptions, wait_for};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RpcError {
    /// The node answered with a protocol-level error. The numeric code is
    /// preserved (`-32000` for unavailable heights, etc).
    #[error("rpc error {code}: {message}")]
    Call { code: i32, message: String },
    #[error("rpc transport failure: {0}")]
    Transport(String),
    #[error("malformed hex quantity {0:?}")]
    InvalidQuantity(String),
    #[error("unexpected node response: {0}")]
    UnexpectedResponse(String),
}

impl From<jsonrpsee::core::client::Error> for RpcError {
    fn from(err: jsonrpsee::core::client::Error) -> Self {
        match err {
            jsonrpsee::core::client::Error::Call(object) => Self::Call {
                code: object.code(),
                message: object.message().to_owned(),
            },
            other => Self::Transport(other.to_string()),
        }
    }
}

impl RpcError {
    /// Numeric error code, when the failure was a protocol-level error.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Call { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Encode an integer as an `0x`-prefixed hex quantity.
#[must_use]
pub fn to_quantity(value: u128) -> String {
    format!("{value:#x}")
}

/// Decode an `0x`-prefixed hex quantity.
pub fn parse_quantity(raw: &str) -> Result<u128, RpcError> {
    let digits = raw
        .strip_prefix("0x")
        .filter(|digits| !digits.is_empty())
        .ok_or_else(|| RpcError::InvalidQuantity(raw.to_owned()))?;
    u128::from_str_radix(digits, 16).map_err(|_| RpcError::InvalidQuantity(raw.to_owned()))
}

/// Transaction request submitted through `eth_sendTransaction`,
/// `eth_estimateGas` or `eth_call`. Quantities are hex-encoded strings.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl TxRequest {
    #[must_use]
    pub fn transfer(from: &str, to: &str, value: u128) -> Self {
        Self {
            from: Some(from.to_owned()),
            to: Some(to.to_owned()),
            value: Some(to_quantity(value)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn call_to(to: &str, data: String) -> Self {
        Self {
            to: Some(to.to_owned()),
            data: Some(data),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(to_quantity(u128::from(gas)));
        self
    }

    #[must_use]
    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(to_quantity(gas_price));
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: String,
    pub status: String,
    pub gas_used: String,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> Result<bool, RpcError> {
        Ok(parse_quantity(&self.status)? == 1)
    }

    pub fn gas_used(&self) -> Result<u64, RpcError> {
        let gas = parse_quantity(&self.gas_used)?;
        u64::try_from(gas).map_err(|_| RpcError::InvalidQuantity(self.gas_used.clone()))
    }

    pub fn block_number(&self) -> Result<u64, RpcError> {
        let height = parse_quantity(&self.block_number)?;
        u64::try_from(height).map_err(|_| RpcError::InvalidQuantity(self.block_number.clone()))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeHistory {
    pub oldest_block: String,
    pub base_fee_per_gas: Vec<String>,
    #[serde(default)]
    pub gas_used_ratio: Vec<f64>,
    #[serde(default)]
    pub reward: Option<Vec<Vec<String>>>,
}

enum Transport {
    Http(HttpClient),
    Ws(WsClient),
}

/// EVM JSON-RPC client. HTTP and WebSocket endpoints expose the identical
/// request surface, so the same test body runs over either transport.
#[derive(Clone)]
pub struct EthClient {
    transport: Arc<Transport>,
    endpoint: String,
}

const ERC20_BALANCE_OF_SELECTOR: &str = "70a08231";

impl EthClient {
    pub fn http(url: &str) -> Result<Self, RpcError> {
        let client = HttpClientBuilder::default()
            .request_timeout(REQUEST_TIMEOUT)
            .build(url)
            .map_err(RpcError::from)?;
        Ok(Self {
            transport: Arc::new(Transport::Http(client)),
            endpoint: url.to_owned(),
        })
    }

    pub async fn websocket(url: &str) -> Result<Self, RpcError> {
        let client = WsClientBuilder::default()
            .request_timeout(REQUEST_TIMEOUT)
            .build(url)
            .await
            .map_err(RpcError::from)?;
        Ok(Self {
            transport: Arc::new(Transport::Ws(client)),
            endpoint: url.to_owned(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request<R>(&self, method: &str, params: ArrayParams) -> Result<R, RpcError>
    where
        R: DeserializeOwned,
    {
        debug!(method, endpoint = %self.endpoint, "rpc request");
        match self.transport.as_ref() {
            Transport::Http(client) => client.request::<R, _>(method, params).await,
            Transport::Ws(client) => client.request::<R, _>(method, params).await,
        }
        .map_err(RpcError::from)
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let raw: String = self.request("eth_blockNumber", rpc_params![]).await?;
        let height = parse_quantity(&raw)?;
        u64::try_from(height).map_err(|_| RpcError::InvalidQuantity(raw))
    }

    pub async fn gas_price(&self) -> Result<u128, RpcError> {
        let raw: String = self.request("eth_gasPrice", rpc_params![]).await?;
        parse_quantity(&raw)
    }

    /// Accounts managed (and unlocked) by the node itself.
    pub async fn accounts(&self) -> Result<Vec<String>, RpcError> {
        self.request("eth_accounts", rpc_params![]).await
    }

    pub async fn get_balance(&self, address: &str, tag: &str) -> Result<u128, RpcError> {
        let raw: String = self
            .request("eth_getBalance", rpc_params![address, tag])
            .await?;
        parse_quantity(&raw)
    }

    pub async fn get_transaction_count(&self, address: &str, tag: &str) -> Result<u64, RpcError> {
        let raw: String = self
            .request("eth_getTransactionCount", rpc_params![address, tag])
            .await?;
        let count = parse_quantity(&raw)?;
        u64::try_from(count).map_err(|_| RpcError::InvalidQuantity(raw))
    }

    /// Submit a transaction signed by the node (the sender key must live in
    /// the node keyring). Returns the transaction hash.
    pub async fn send_transaction(&self, tx: &TxRequest) -> Result<String, RpcError> {
        self.request("eth_sendTransaction", rpc_params![tx]).await
    }

    pub async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, RpcError> {
        let raw: String = self.request("eth_estimateGas", rpc_params![tx]).await?;
        let gas = parse_quantity(&raw)?;
        u64::try_from(gas).map_err(|_| RpcError::InvalidQuantity(raw))
    }

    pub async fn get_transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TxReceipt>, RpcError> {
        self.request("eth_getTransactionReceipt", rpc_params![hash])
            .await
    }

    pub async fn fee_history(
        &self,
        block_count: u64,
        newest_block: &str,
        reward_percentiles: &[f64],
    ) -> Result<FeeHistory, RpcError> {
        self.request(
            "eth_feeHistory",
            rpc_params![block_count, newest_block, reward_percentiles],
        )
        .await
    }

    pub async fn call(&self, tx: &TxRequest, tag: &str) -> Result<String, RpcError> {
        self.request("eth_call", rpc_params![tx, tag]).await
    }

    /// ERC-20 `balanceOf(holder)` on `token`, read through `eth_call`.
    pub async fn erc20_balance(&self, token: &str, holder: &str) -> Result<u128, RpcError> {
        let holder = holder.trim_start_matches("0x").to_lowercase();
        let data = format!("0x{ERC20_BALANCE_OF_SELECTOR}{holder:0>64}");
        let raw = self.call(&TxRequest::call_to(token, data), "latest").await?;
        parse_quantity(&raw)
    }

    /// Poll until the transaction is included and a receipt is available.
    pub async fn wait_for_transaction_receipt(
        &self,
        hash: &str,
        options: WaitOptions,
    ) -> Result<TxReceipt, WaitError<RpcError>> {
        wait_for(&format!("receipt for {hash}"), options, || async {
            Ok(match self.get_transaction_receipt(hash).await? {
                Some(receipt) => PollStatus::Ready(receipt),
                None => PollStatus::Pending,
            })
        })
        .await
    }
}
