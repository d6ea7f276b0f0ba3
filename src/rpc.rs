use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::abi::{decode_string_result, encode_token_uri_call};
use crate::domain::ContractAddress;
use crate::error::CardsError;

/// Read-only view of the contract: the one call the harvester needs.
pub trait TokenUriSource {
    fn token_uri(&self, token_id: u64) -> Result<String, CardsError>;
}

impl<T: TokenUriSource + ?Sized> TokenUriSource for &T {
    fn token_uri(&self, token_id: u64) -> Result<String, CardsError> {
        (**self).token_uri(token_id)
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

pub struct EthRpcClient {
    client: Client,
    endpoint: String,
    contract: ContractAddress,
    next_id: AtomicU64,
}

impl EthRpcClient {
    pub fn new(endpoint: impl Into<String>, contract: ContractAddress) -> Result<Self, CardsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("buterin-cards/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CardsError::RpcHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CardsError::RpcHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            contract,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn contract(&self) -> &ContractAddress {
        &self.contract
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, CardsError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "RPC request failed".to_string());
        Err(CardsError::RpcStatus { status, message })
    }

    fn eth_call(&self, data: String) -> Result<String, CardsError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": "eth_call",
            "params": [{ "to": self.contract.as_str(), "data": data }, "latest"],
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|err| CardsError::RpcHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let payload: RpcResponse = response
            .json()
            .map_err(|err| CardsError::RpcHttp(err.to_string()))?;
        interpret_response(payload)
    }
}

impl TokenUriSource for EthRpcClient {
    fn token_uri(&self, token_id: u64) -> Result<String, CardsError> {
        let result = self.eth_call(encode_token_uri_call(token_id))?;
        decode_string_result(&result)
    }
}

fn interpret_response(payload: RpcResponse) -> Result<String, CardsError> {
    if let Some(error) = payload.error {
        let detail = match error.data {
            Some(Value::String(data)) => format!(" ({data})"),
            Some(other) if !other.is_null() => format!(" ({other})"),
            _ => String::new(),
        };
        return Err(CardsError::RpcCall(format!(
            "{} [code {}]{detail}",
            error.message, error.code
        )));
    }
    payload
        .result
        .ok_or_else(|| CardsError::RpcCall("response carried neither result nor error".to_string()))
}

/// Stands in for the network in commands that never touch the chain.
pub struct NoRpc;

impl TokenUriSource for NoRpc {
    fn token_uri(&self, _token_id: u64) -> Result<String, CardsError> {
        Err(CardsError::RpcUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn revert_becomes_call_error() {
        let payload: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted","data":"0x"}}"#,
        )
        .unwrap();
        let err = interpret_response(payload).unwrap_err();
        assert_matches!(&err, CardsError::RpcCall(msg) if msg.contains("execution reverted"));
    }

    #[test]
    fn result_is_returned_verbatim() {
        let payload: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":"0xabcd"}"#).unwrap();
        assert_eq!(interpret_response(payload).unwrap(), "0xabcd");
    }

    #[test]
    fn empty_response_is_an_error() {
        let payload: RpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert_matches!(interpret_response(payload), Err(CardsError::RpcCall(_)));
    }

    #[test]
    fn no_rpc_refuses_calls() {
        assert_matches!(NoRpc.token_uri(1), Err(CardsError::RpcUnavailable));
    }
}
