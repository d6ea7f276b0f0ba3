use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decode::{DecodeError, DecodedPayload};

pub const DESCRIPTION_LIMIT: usize = 200;
pub const IMAGE_LIMIT: usize = 100;
pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_id: u64,
    pub name: String,
    pub description: String,
    pub image: String,
    pub attributes: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvgRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<u64>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// One value of the results file. Variants are told apart by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenEntry {
    Metadata(TokenRecord),
    Svg(SvgRecord),
    Failed(ErrorRecord),
}

impl TokenEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, TokenEntry::Failed(_))
    }

    pub fn record(&self) -> Option<&TokenRecord> {
        match self {
            TokenEntry::Metadata(record) => Some(record),
            _ => None,
        }
    }

    pub fn failed(token_id: u64, message: impl Into<String>, preview: Option<String>) -> Self {
        TokenEntry::Failed(ErrorRecord {
            token_id: Some(token_id),
            error: message.into(),
            preview,
        })
    }

    pub fn from_decode_error(token_id: u64, err: &DecodeError) -> Self {
        Self::failed(token_id, err.to_string(), err.preview().map(str::to_string))
    }
}

/// Cuts `value` to `limit` characters and appends the marker when anything was dropped.
pub fn truncate_with_marker(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &value[..cut]),
        None => value.to_string(),
    }
}

pub fn normalize(token_id: u64, metadata: &Map<String, Value>) -> TokenRecord {
    let name = metadata
        .get("name")
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
        .unwrap_or_else(|| format!("Token {token_id}"));
    let description = metadata
        .get("description")
        .and_then(|value| value.as_str())
        .map(|value| truncate_with_marker(value, DESCRIPTION_LIMIT))
        .unwrap_or_default();
    let image = metadata
        .get("image")
        .and_then(|value| value.as_str())
        .map(|value| truncate_with_marker(value, IMAGE_LIMIT))
        .unwrap_or_default();

    let mut attributes = IndexMap::new();
    if let Some(items) = metadata.get("attributes").and_then(|value| value.as_array()) {
        for item in items.iter().filter_map(|item| item.as_object()) {
            let trait_type = item
                .get("trait_type")
                .and_then(|value| value.as_str())
                .unwrap_or("unknown");
            let value = item.get("value").cloned().unwrap_or(Value::Null);
            attributes.insert(trait_type.to_string(), value);
        }
    }

    TokenRecord {
        token_id,
        name,
        description,
        image,
        attributes,
    }
}

pub fn entry_from_payload(token_id: u64, payload: DecodedPayload) -> TokenEntry {
    match payload {
        DecodedPayload::Json(metadata) => TokenEntry::Metadata(normalize(token_id, &metadata)),
        DecodedPayload::Svg { data } => TokenEntry::Svg(SvgRecord {
            name: format!("Token {token_id} (SVG)"),
            kind: "svg".to_string(),
            data,
        }),
    }
}
