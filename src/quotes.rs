use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::TokenRecord;

pub const QUOTE_TITLE_ATTRIBUTE: &str = "Quote Title";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    NoQuote,
    NewQuote,
    Appended,
    AlreadyPresent,
}

/// Quote text to token IDs, both in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteMapping(IndexMap<String, Vec<u64>>);

impl QuoteMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, quote: &str) -> Option<&[u64]> {
        self.0.get(quote).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u64])> {
        self.0
            .iter()
            .map(|(quote, ids)| (quote.as_str(), ids.as_slice()))
    }

    pub fn token_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Files written by older runs may hold the same ID twice under one quote.
    pub fn dedup(&mut self) {
        for ids in self.0.values_mut() {
            let mut seen = std::collections::HashSet::new();
            ids.retain(|id| seen.insert(*id));
        }
    }

    /// Records `token_id` under `quote`. Calling it again with the same pair is a no-op.
    pub fn insert(&mut self, quote: &str, token_id: u64) -> AggregateOutcome {
        match self.0.get_mut(quote) {
            Some(ids) if ids.contains(&token_id) => AggregateOutcome::AlreadyPresent,
            Some(ids) => {
                ids.push(token_id);
                AggregateOutcome::Appended
            }
            None => {
                self.0.insert(quote.to_string(), vec![token_id]);
                AggregateOutcome::NewQuote
            }
        }
    }

    pub fn aggregate(&mut self, token_id: u64, record: &TokenRecord) -> AggregateOutcome {
        match quote_title(record) {
            Some(quote) => self.insert(&quote, token_id),
            None => AggregateOutcome::NoQuote,
        }
    }
}

impl FromIterator<(String, Vec<u64>)> for QuoteMapping {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u64>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub fn quote_title(record: &TokenRecord) -> Option<String> {
    match record.attributes.get(QUOTE_TITLE_ATTRIBUTE)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
