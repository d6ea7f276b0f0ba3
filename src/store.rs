use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ResolvedConfig;
use crate::error::CardsError;
use crate::metadata::TokenEntry;
use crate::quotes::QuoteMapping;

/// Token ID to fetched entry, kept in numeric order.
pub type ResultsStore = BTreeMap<u64, TokenEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loaded(usize),
    Missing,
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct Store {
    results_path: Utf8PathBuf,
    mapping_path: Utf8PathBuf,
    csv_path: Utf8PathBuf,
}

impl Store {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self::new_with_paths(
            config.results_file.clone(),
            config.mapping_file.clone(),
            config.csv_file.clone(),
        )
    }

    pub fn new_with_paths(
        results_path: Utf8PathBuf,
        mapping_path: Utf8PathBuf,
        csv_path: Utf8PathBuf,
    ) -> Self {
        Self {
            results_path,
            mapping_path,
            csv_path,
        }
    }

    /// Lays the three files out under one directory with their default names.
    pub fn in_dir(dir: &Utf8Path) -> Self {
        Self::new_with_paths(
            dir.join(crate::config::DEFAULT_RESULTS_FILE),
            dir.join(crate::config::DEFAULT_MAPPING_FILE),
            dir.join(crate::config::DEFAULT_CSV_FILE),
        )
    }

    pub fn results_path(&self) -> &Utf8Path {
        &self.results_path
    }

    pub fn mapping_path(&self) -> &Utf8Path {
        &self.mapping_path
    }

    pub fn csv_path(&self) -> &Utf8Path {
        &self.csv_path
    }

    /// A missing or unreadable checkpoint yields an empty store.
    pub fn load_results(&self) -> (ResultsStore, LoadState) {
        let (results, state) = load_or_default::<ResultsStore>(&self.results_path);
        let state = match state {
            LoadState::Loaded(_) => LoadState::Loaded(results.len()),
            other => other,
        };
        (results, state)
    }

    pub fn load_mapping(&self) -> (QuoteMapping, LoadState) {
        let (mut mapping, state) = load_or_default::<QuoteMapping>(&self.mapping_path);
        mapping.dedup();
        let state = match state {
            LoadState::Loaded(_) => LoadState::Loaded(mapping.len()),
            other => other,
        };
        (mapping, state)
    }

    /// Reads the results file, failing when it is absent or malformed.
    pub fn read_results(&self) -> Result<ResultsStore, CardsError> {
        let content = fs::read_to_string(self.results_path.as_std_path()).map_err(|err| {
            CardsError::Filesystem(format!("read {}: {err}", self.results_path))
        })?;
        serde_json::from_str(&content)
            .map_err(|err| CardsError::Filesystem(format!("parse {}: {err}", self.results_path)))
    }

    pub fn read_mapping(&self) -> Result<QuoteMapping, CardsError> {
        let content = fs::read_to_string(self.mapping_path.as_std_path()).map_err(|err| {
            CardsError::Filesystem(format!("read {}: {err}", self.mapping_path))
        })?;
        let mut mapping: QuoteMapping = serde_json::from_str(&content)
            .map_err(|err| CardsError::Filesystem(format!("parse {}: {err}", self.mapping_path)))?;
        mapping.dedup();
        Ok(mapping)
    }

    pub fn save_results(&self, results: &ResultsStore) -> Result<(), CardsError> {
        Self::write_json_atomic(&self.results_path, results)
    }

    pub fn save_mapping(&self, mapping: &QuoteMapping) -> Result<(), CardsError> {
        Self::write_json_atomic(&self.mapping_path, mapping)
    }

    pub fn write_json_atomic<T: Serialize + ?Sized>(
        path: &Utf8Path,
        value: &T,
    ) -> Result<(), CardsError> {
        let mut content = serde_json::to_vec_pretty(value)
            .map_err(|err| CardsError::Filesystem(err.to_string()))?;
        content.push(b'\n');
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CardsError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CardsError::Filesystem(err.to_string()))?;
        }
        let tmp_path = tmp_path_for(path);
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| CardsError::Filesystem(format!("write {tmp_path}: {err}")))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| CardsError::Filesystem(format!("rename to {path}: {err}")))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Utf8Path) -> Utf8PathBuf {
    match path.extension() {
        Some(ext) => path.with_extension(format!("{ext}.tmp")),
        None => path.with_extension("tmp"),
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Utf8Path) -> (T, LoadState) {
    let content = match fs::read_to_string(path.as_std_path()) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return (T::default(), LoadState::Missing),
        Err(err) => return (T::default(), LoadState::Corrupt(err.to_string())),
    };
    match serde_json::from_str(&content) {
        Ok(value) => (value, LoadState::Loaded(0)),
        Err(err) => (T::default(), LoadState::Corrupt(err.to_string())),
    }
}
