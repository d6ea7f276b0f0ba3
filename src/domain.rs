use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CardsError;

pub const DEFAULT_CONTRACT: &str = "0x5726c14663a1ead4a7d320e8a653c9710b2a2e89";
pub const DEFAULT_MIN_TOKEN_ID: u64 = 0;
/// 2,015 cards were minted, numbered 0 through 2014.
pub const DEFAULT_MAX_TOKEN_ID: u64 = 2014;

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern compiles"));

/// Lowercased `0x`-prefixed contract address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContractAddress {
    fn default() -> Self {
        Self(DEFAULT_CONTRACT.to_string())
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContractAddress {
    type Err = CardsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !ADDRESS_RE.is_match(trimmed) {
            return Err(CardsError::InvalidContractAddress(value.to_string()));
        }
        Ok(Self(trimmed.to_lowercase()))
    }
}

impl TryFrom<String> for ContractAddress {
    type Error = CardsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContractAddress> for String {
    fn from(value: ContractAddress) -> Self {
        value.0
    }
}

/// Inclusive range of token IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRange {
    min: u64,
    max: u64,
}

impl TokenRange {
    pub fn new(min: u64, max: u64) -> Result<Self, CardsError> {
        if min > max {
            return Err(CardsError::InvalidRange(format!(
                "start {min} is after end {max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Number of IDs in the range, saturating at `u64::MAX` for the full span.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.max.saturating_sub(self.min).saturating_add(1)
    }

    pub fn ids(&self) -> std::ops::RangeInclusive<u64> {
        self.min..=self.max
    }
}

impl Default for TokenRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_TOKEN_ID,
            max: DEFAULT_MAX_TOKEN_ID,
        }
    }
}

impl fmt::Display for TokenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// Accepts `N`, `MIN-MAX`, `MIN..MAX` (exclusive end) and `MIN..=MAX`.
impl FromStr for TokenRange {
    type Err = CardsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| CardsError::InvalidRange(value.to_string()))
        };

        if let Some((start, end)) = trimmed.split_once("..=") {
            return Self::new(parse(start)?, parse(end)?);
        }
        if let Some((start, end)) = trimmed.split_once("..") {
            let end = parse(end)?;
            let max = end
                .checked_sub(1)
                .ok_or_else(|| CardsError::InvalidRange(value.to_string()))?;
            return Self::new(parse(start)?, max);
        }
        if let Some((start, end)) = trimmed.split_once('-') {
            return Self::new(parse(start)?, parse(end)?);
        }
        let single = parse(trimmed)?;
        Self::new(single, single)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn contract_address_is_lowercased() {
        let address: ContractAddress = "0x5726C14663A1EAD4A7D320E8A653C9710B2A2E89".parse().unwrap();
        assert_eq!(address.as_str(), DEFAULT_CONTRACT);
    }

    #[test]
    fn contract_address_rejects_short_values() {
        let err = "0x1234".parse::<ContractAddress>().unwrap_err();
        assert_matches!(err, CardsError::InvalidContractAddress(_));
    }

    #[test]
    fn range_forms() {
        assert_eq!("5-10".parse::<TokenRange>().unwrap(), TokenRange::new(5, 10).unwrap());
        assert_eq!("5..=10".parse::<TokenRange>().unwrap(), TokenRange::new(5, 10).unwrap());
        assert_eq!("5..11".parse::<TokenRange>().unwrap(), TokenRange::new(5, 10).unwrap());
        assert_eq!("7".parse::<TokenRange>().unwrap(), TokenRange::new(7, 7).unwrap());
    }

    #[test]
    fn range_rejects_reversed_bounds() {
        let err = "10-5".parse::<TokenRange>().unwrap_err();
        assert_matches!(err, CardsError::InvalidRange(_));
    }
}
