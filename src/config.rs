use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{ContractAddress, DEFAULT_MAX_TOKEN_ID, DEFAULT_MIN_TOKEN_ID, TokenRange};
use crate::error::CardsError;

pub const DEFAULT_CONFIG_FILE: &str = "buterin-cards.json";
pub const DEFAULT_RESULTS_FILE: &str = "token_quote_mapping.json";
pub const DEFAULT_MAPPING_FILE: &str = "quote_token_mapping.json";
pub const DEFAULT_CSV_FILE: &str = "quote_token_mapping.csv";
pub const DEFAULT_BATCH_SIZE: u64 = 50;
pub const DEFAULT_DELAY_MS: u64 = 100;

pub const RPC_URL_VAR: &str = "BUTERIN_CARDS_RPC_URL";
pub const INFURA_PROJECT_VAR: &str = "INFURA_PROJECT_ID";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub min_token_id: Option<u64>,
    #[serde(default)]
    pub max_token_id: Option<u64>,
    #[serde(default)]
    pub batch_size: Option<u64>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub results_file: Option<String>,
    #[serde(default)]
    pub mapping_file: Option<String>,
    #[serde(default)]
    pub csv_file: Option<String>,
    #[serde(default)]
    pub refresh_token_zero: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub contract: ContractAddress,
    pub range: TokenRange,
    pub batch_size: u64,
    pub delay: Duration,
    pub results_file: Utf8PathBuf,
    pub mapping_file: Utf8PathBuf,
    pub csv_file: Utf8PathBuf,
    pub refresh_token_zero: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            contract: ContractAddress::default(),
            range: TokenRange::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            results_file: Utf8PathBuf::from(DEFAULT_RESULTS_FILE),
            mapping_file: Utf8PathBuf::from(DEFAULT_MAPPING_FILE),
            csv_file: Utf8PathBuf::from(DEFAULT_CSV_FILE),
            refresh_token_zero: true,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; the default file is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CardsError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CardsError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CardsError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CardsError> {
        let defaults = ResolvedConfig::default();

        let contract = match config.contract {
            Some(value) => value.parse()?,
            None => defaults.contract,
        };
        let range = TokenRange::new(
            config.min_token_id.unwrap_or(DEFAULT_MIN_TOKEN_ID),
            config.max_token_id.unwrap_or(DEFAULT_MAX_TOKEN_ID),
        )?;
        let batch_size = validate_batch_size(config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE))?;

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            contract,
            range,
            batch_size,
            delay: config
                .delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
            results_file: config
                .results_file
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.results_file),
            mapping_file: config
                .mapping_file
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.mapping_file),
            csv_file: config
                .csv_file
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.csv_file),
            refresh_token_zero: config
                .refresh_token_zero
                .unwrap_or(defaults.refresh_token_zero),
        })
    }
}

pub fn validate_batch_size(batch_size: u64) -> Result<u64, CardsError> {
    if batch_size == 0 {
        return Err(CardsError::InvalidBatchSize(batch_size));
    }
    Ok(batch_size)
}

/// Loads `.env` from the working directory when there is one.
pub fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            tracing::warn!(error = %err, "ignoring unreadable .env file");
        }
    }
}

pub fn rpc_endpoint() -> Result<String, CardsError> {
    resolve_endpoint(|name| env::var(name).ok())
}

/// A full URL wins over an Infura project ID.
pub fn resolve_endpoint<F>(lookup: F) -> Result<String, CardsError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(url) = non_empty(RPC_URL_VAR) {
        return Ok(url.trim().to_string());
    }
    if let Some(project_id) = non_empty(INFURA_PROJECT_VAR) {
        return Ok(format!("https://mainnet.infura.io/v3/{}", project_id.trim()));
    }
    Err(CardsError::MissingEndpoint)
}
