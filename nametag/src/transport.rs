//! Outbound RPC transport.
//!
//! The resolver hands a fully encoded `aggregate3` payload to a [`Transport`]
//! and gets the raw return bytes back. [`HttpTransport`] does this as a
//! JSON-RPC `eth_call` against the multicall contract over HTTP.

use std::collections::BTreeMap;
use std::time::Duration;

use alloy::primitives::{Bytes, hex};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::MULTICALL_ADDRESS;
use crate::address::to_lower_hex;
use crate::config::Config;
use crate::error::{Error, Result};

/// Something that can execute an encoded multicall payload.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `payload` against the multicall contract via `endpoint` and
    /// return the raw return data.
    async fn call(
        &self,
        endpoint: &str,
        payload: &Bytes,
        headers: &BTreeMap<String, String>,
    ) -> Result<Bytes>;
}

/// JSON-RPC request envelope.
#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (CallParams, &'a str),
}

#[derive(Debug, Serialize)]
struct CallParams {
    to: String,
    data: String,
}

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

/// HTTP JSON-RPC transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Create a transport using the request timeout from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.request_timeout())
    }

    /// Build the `eth_call` request body for `payload`.
    pub(crate) fn build_request(payload: &Bytes) -> RpcRequest<'static> {
        RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_call",
            params: (
                CallParams {
                    to: to_lower_hex(&MULTICALL_ADDRESS),
                    data: format!("0x{}", hex::encode(payload)),
                },
                "latest",
            ),
        }
    }

    /// Interpret an HTTP response.
    pub(crate) fn parse_response(status: u16, body: &str) -> Result<Bytes> {
        if !(200..300).contains(&status) {
            return Err(Error::transport(format!(
                "HTTP {status}: {}",
                truncate(body, 200)
            )));
        }

        let response: RpcResponse = serde_json::from_str(body)
            .map_err(|e| Error::transport(format!("malformed JSON-RPC response: {e}")))?;

        if let Some(err) = response.error {
            return Err(Error::rpc(err.code, err.message));
        }

        let result = response
            .result
            .ok_or_else(|| Error::transport("JSON-RPC response has neither result nor error"))?;
        hex::decode(&result)
            .map(Bytes::from)
            .map_err(|e| Error::transport(format!("result is not hex: {e}")))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        endpoint: &str,
        payload: &Bytes,
        headers: &BTreeMap<String, String>,
    ) -> Result<Bytes> {
        let mut req = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }

        debug!(endpoint, bytes = payload.len(), "eth_call");
        let response = req.json(&Self::build_request(payload)).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Self::parse_response(status, &body)
    }
}
