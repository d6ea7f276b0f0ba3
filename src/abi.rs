//! Contract binding for `tokenURI(uint256) returns (string)`.

use alloy_primitives::U256;
use alloy_sol_types::{SolCall, sol};

use crate::error::CardsError;

sol! {
    function tokenURI(uint256 tokenId) external view returns (string);
}

/// Hex-encoded call data for `eth_call`.
pub fn encode_token_uri_call(token_id: u64) -> String {
    let call = tokenURICall {
        tokenId: U256::from(token_id),
    };
    format!("0x{}", hex::encode(call.abi_encode()))
}

/// Decodes the hex return data of `tokenURI` into the URI string.
pub fn decode_string_result(result: &str) -> Result<String, CardsError> {
    let raw = result.strip_prefix("0x").unwrap_or(result);
    let bytes = hex::decode(raw).map_err(|err| CardsError::AbiDecode(err.to_string()))?;
    if bytes.is_empty() {
        return Err(CardsError::AbiDecode("empty return data".to_string()));
    }
    tokenURICall::abi_decode_returns(&bytes).map_err(|err| CardsError::AbiDecode(err.to_string()))
}

#[cfg(test)]
pub(crate) fn encode_string_result(value: &str) -> String {
    use alloy_sol_types::SolValue;

    format!("0x{}", hex::encode(value.to_string().abi_encode()))
}
