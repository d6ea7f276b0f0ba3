use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use thiserror::Error;

pub const BASE64_JSON_PREFIX: &str = "data:application/json;base64,";
pub const URL_ENCODED_JSON_PREFIX: &str = "data:application/json;charset=UTF-8,";

const SVG_PREVIEW_CHARS: usize = 200;
const UNHANDLED_PREVIEW_CHARS: usize = 100;

/// Metadata recovered from a token URI.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Json(Map<String, Value>),
    Svg { data: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unhandled token URI format")]
    UnhandledFormat { preview: String },

    #[error("invalid base64 payload: {0}")]
    Base64(String),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(String),

    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("metadata is not a JSON object")]
    NotAnObject,
}

impl DecodeError {
    pub fn preview(&self) -> Option<&str> {
        match self {
            DecodeError::UnhandledFormat { preview } => Some(preview),
            _ => None,
        }
    }
}

pub fn decode(uri: &str) -> Result<DecodedPayload, DecodeError> {
    if let Some(encoded) = uri.strip_prefix(BASE64_JSON_PREFIX) {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| DecodeError::Base64(err.to_string()))?;
        let text = String::from_utf8(bytes).map_err(|err| DecodeError::Utf8(err.to_string()))?;
        return parse_object(&text).map(DecodedPayload::Json);
    }

    if let Some(encoded) = uri.strip_prefix(URL_ENCODED_JSON_PREFIX) {
        let text = percent_decode_str(encoded)
            .decode_utf8()
            .map_err(|err| DecodeError::Utf8(err.to_string()))?;
        return parse_object(&text).map(DecodedPayload::Json);
    }

    if uri.contains("<svg") {
        return Ok(DecodedPayload::Svg {
            data: uri.chars().take(SVG_PREVIEW_CHARS).collect(),
        });
    }

    Err(DecodeError::UnhandledFormat {
        preview: uri.chars().take(UNHANDLED_PREVIEW_CHARS).collect(),
    })
}

fn parse_object(text: &str) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DecodeError::NotAnObject),
        Err(err) => Err(DecodeError::Json(err.to_string())),
    }
}
