use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Overrides;
use crate::errors::SourceError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "autobalance/1.0";
const WEI_DECIMALS: i64 = 18;
const BALANCE_OF_SELECTOR: &str = "0x70a08231";

lazy_static! {
    static ref ADDRESS: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
}

/// Chains the protocol layer knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Bsc,
    Ethereum,
}

impl Chain {
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Bsc => "bsc",
            Chain::Ethereum => "ethereum",
        }
    }

    /// Override/environment key holding an explicit RPC endpoint URL.
    pub fn endpoint_key(&self) -> &'static str {
        match self {
            Chain::Bsc => "bsc_endpoint",
            Chain::Ethereum => "eth_endpoint",
        }
    }

    /// Override/environment key holding a provider API key.
    pub fn api_key_key(&self) -> &'static str {
        match self {
            Chain::Bsc => "bsc_api_key",
            Chain::Ethereum => "eth_api_key",
        }
    }

    fn provider_url(&self, api_key: &str) -> String {
        match self {
            Chain::Bsc => format!("https://bsc-mainnet.infura.io/v3/{}", api_key),
            Chain::Ethereum => format!("https://mainnet.infura.io/v3/{}", api_key),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Contract address and on-chain decimal count for a token on one chain.
/// Static configuration of the fetchers, not runtime input.
#[derive(Debug, Clone, Copy)]
pub struct TokenContract {
    pub contract: &'static str,
    pub decimals: i64,
}

pub const USDT_BSC: TokenContract = TokenContract {
    contract: "0x55d398326f99059fF775485246999027B3197955",
    decimals: 18,
};
pub const USDC_BSC: TokenContract = TokenContract {
    contract: "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
    decimals: 18,
};
pub const USDT_ETHEREUM: TokenContract = TokenContract {
    contract: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
    decimals: 6,
};
pub const USDC_ETHEREUM: TokenContract = TokenContract {
    contract: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
    decimals: 6,
};

/// Arguments common to every balance fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub address: String,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Injectable HTTP capability: POSTs a JSON body and returns the raw
/// response body. Exists so the protocol logic can be exercised without a
/// network; production code supplies [`HttpTransport`].
pub trait Transport: Send + Sync {
    fn post_json(&self, url: &str, body: &Value, timeout: Duration)
        -> Result<Vec<u8>, SourceError>;
}

/// Production transport over a blocking reqwest client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Vec<u8>, SourceError> {
        let transport_error = |reason: String| SourceError::Transport {
            url: url.to_owned(),
            reason,
        };

        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(|e| transport_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(transport_error(format!("http status {}", status)));
        }
        let bytes = response
            .bytes()
            .map_err(|e| transport_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

pub fn fetch_bnb_balance_on_bsc(
    request: &FetchRequest,
    overrides: &Overrides,
    transport: &dyn Transport,
) -> Result<BigDecimal, SourceError> {
    fetch_native_balance(Chain::Bsc, request, overrides, transport)
}

pub fn fetch_eth_balance_on_ethereum(
    request: &FetchRequest,
    overrides: &Overrides,
    transport: &dyn Transport,
) -> Result<BigDecimal, SourceError> {
    fetch_native_balance(Chain::Ethereum, request, overrides, transport)
}

pub fn fetch_usdt_balance_on_bsc(
    request: &FetchRequest,
    overrides: &Overrides,
    transport: &dyn Transport,
) -> Result<BigDecimal, SourceError> {
    fetch_token_balance(USDT_BSC, Chain::Bsc, request, overrides, transport)
}

pub fn fetch_usdc_balance_on_bsc(
    request: &FetchRequest,
    overrides: &Overrides,
    transport: &dyn Transport,
) -> Result<BigDecimal, SourceError> {
    fetch_token_balance(USDC_BSC, Chain::Bsc, request, overrides, transport)
}

pub fn fetch_usdt_balance_on_ethereum(
    request: &FetchRequest,
    overrides: &Overrides,
    transport: &dyn Transport,
) -> Result<BigDecimal, SourceError> {
    fetch_token_balance(USDT_ETHEREUM, Chain::Ethereum, request, overrides, transport)
}

pub fn fetch_usdc_balance_on_ethereum(
    request: &FetchRequest,
    overrides: &Overrides,
    transport: &dyn Transport,
) -> Result<BigDecimal, SourceError> {
    fetch_token_balance(USDC_ETHEREUM, Chain::Ethereum, request, overrides, transport)
}

/// Fetches a chain's native-coin balance, normalized from wei.
pub fn fetch_native_balance(
    chain: Chain,
    request: &FetchRequest,
    overrides: &Overrides,
    transport: &dyn Transport,
) -> Result<BigDecimal, SourceError> {
    let address = checked_address(&request.address)?;
    let endpoint = resolve_endpoint(chain, request, overrides)?;
    let result = rpc_call(
        transport,
        &endpoint,
        "eth_getBalance",
        json!([address, "latest"]),
        request.timeout(),
    )?;
    hex_to_decimal(&result, WEI_DECIMALS)
}

/// Fetches an ERC-20 style token balance via `balanceOf(address)`, scaled
/// by the contract's decimal count.
pub fn fetch_token_balance(
    token: TokenContract,
    chain: Chain,
    request: &FetchRequest,
    overrides: &Overrides,
    transport: &dyn Transport,
) -> Result<BigDecimal, SourceError> {
    let address = checked_address(&request.address)?;
    let endpoint = resolve_endpoint(chain, request, overrides)?;
    let data = format!(
        "{}{:0>64}",
        BALANCE_OF_SELECTOR,
        address.trim_start_matches("0x").to_lowercase()
    );
    let result = rpc_call(
        transport,
        &endpoint,
        "eth_call",
        json!([{ "to": token.contract, "data": data }, "latest"]),
        request.timeout(),
    )?;
    hex_to_decimal(&result, token.decimals)
}

fn checked_address(address: &str) -> Result<&str, SourceError> {
    if ADDRESS.is_match(address) {
        Ok(address)
    } else {
        Err(SourceError::InvalidAddress(address.to_owned()))
    }
}

/// Resolution order: explicit endpoint, per-chain endpoint override, then
/// a provider URL derived from an API key.
fn resolve_endpoint(
    chain: Chain,
    request: &FetchRequest,
    overrides: &Overrides,
) -> Result<String, SourceError> {
    if let Some(endpoint) = &request.endpoint {
        return Ok(endpoint.clone());
    }
    if let Some(endpoint) = overrides.get(chain.endpoint_key()) {
        return Ok(endpoint);
    }
    if let Some(api_key) = request
        .api_key
        .clone()
        .or_else(|| overrides.get(chain.api_key_key()))
    {
        return Ok(chain.provider_url(&api_key));
    }
    Err(SourceError::EndpointNotConfigured(chain.name()))
}

fn rpc_call(
    transport: &dyn Transport,
    endpoint: &str,
    method: &str,
    params: Value,
    timeout: Duration,
) -> Result<String, SourceError> {
    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    debug!(method, "rpc call");

    let raw = transport.post_json(endpoint, &body, timeout)?;
    let response: Value = serde_json::from_slice(&raw)
        .map_err(|e| SourceError::MalformedResponse(e.to_string()))?;

    if let Some(error) = response.get("error") {
        return Err(SourceError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned(),
        });
    }

    match response.get("result") {
        Some(Value::String(result)) => Ok(result.clone()),
        _ => Err(SourceError::MalformedResponse(
            "missing result field".to_owned(),
        )),
    }
}

/// Exact scaling of a hex-encoded on-chain integer: the amount is the
/// integer over 10^decimals, built without ever passing through a float.
fn hex_to_decimal(result: &str, decimals: i64) -> Result<BigDecimal, SourceError> {
    let trimmed = result.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits = if digits.is_empty() { "0" } else { digits };
    let value = BigInt::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| SourceError::MalformedResponse(format!("bad hex integer '{}'", result)))?;
    Ok(BigDecimal::new(value, decimals))
}
