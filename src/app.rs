use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::decode::{DecodeError, decode};
use crate::domain::TokenRange;
use crate::error::CardsError;
use crate::export::{ExportSummary, write_csv};
use crate::metadata::{TokenEntry, entry_from_payload, truncate_with_marker};
use crate::quotes::{AggregateOutcome, QuoteMapping, quote_title};
use crate::rpc::TokenUriSource;
use crate::store::{LoadState, ResultsStore, Store};

const URI_PREVIEW_CHARS: usize = 200;
const REBUILD_SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub batch_size: u64,
    pub delay: Duration,
    pub refresh_token_zero: bool,
}

impl FetchOptions {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            delay: config.delay,
            refresh_token_zero: config.refresh_token_zero,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    pub range: String,
    pub started_at: String,
    pub finished_at: String,
    pub checkpoint_entries: usize,
    pub processed: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub new_quotes: u64,
    pub mapped_tokens: u64,
    pub results_total: usize,
    pub quotes_total: usize,
    pub results_path: String,
    pub mapping_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteSample {
    pub quote: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildSummary {
    pub records: usize,
    pub quotes: usize,
    pub tokens: usize,
    pub sample: Vec<QuoteSample>,
    pub mapping_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectItem {
    pub token_id: u64,
    pub uri_preview: Option<String>,
    pub entry: TokenEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub items: Vec<InspectItem>,
}

#[derive(Debug, Clone, Copy)]
pub enum ExportSource {
    Mapping,
    Results,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

/// Position of the fetch loop after one token, skipped or fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenProgress {
    pub token_id: u64,
    pub position: u64,
    pub total: u64,
    pub fetched: bool,
    pub failed: bool,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    fn token(&self, _progress: TokenProgress) {}
}

const PROGRESS_LOG_EVERY: u64 = 100;

/// Forwards progress to the tracing subscriber.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }

    fn token(&self, progress: TokenProgress) {
        tracing::debug!(
            token_id = progress.token_id,
            fetched = progress.fetched,
            failed = progress.failed,
            "token {}/{}",
            progress.position,
            progress.total
        );
        if progress.position % PROGRESS_LOG_EVERY == 0 || progress.position == progress.total {
            tracing::info!(
                token_id = progress.token_id,
                "progress {}/{}",
                progress.position,
                progress.total
            );
        }
    }
}

pub struct App<S: TokenUriSource> {
    store: Store,
    source: S,
}

impl<S: TokenUriSource> App<S> {
    pub fn new(store: Store, source: S) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Fetches, decodes and normalizes one token. Failures come back as error entries.
    pub fn fetch_token(&self, token_id: u64) -> TokenEntry {
        match self.source.token_uri(token_id) {
            Ok(uri) => entry_for_uri(token_id, &uri),
            Err(err) => TokenEntry::failed(token_id, err.to_string(), None),
        }
    }

    pub fn fetch_range(
        &self,
        range: TokenRange,
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchSummary, CardsError> {
        crate::config::validate_batch_size(options.batch_size)?;
        let started = Instant::now();
        let mut summary = FetchSummary {
            range: range.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            results_path: self.store.results_path().to_string(),
            mapping_path: self.store.mapping_path().to_string(),
            ..FetchSummary::default()
        };

        let (mut results, state) = self.store.load_results();
        report_load("results", self.store.results_path().as_str(), &state);
        summary.checkpoint_entries = results.len();
        let (mut mapping, state) = self.store.load_mapping();
        report_load("quote mapping", self.store.mapping_path().as_str(), &state);

        let total = range.len();
        sink.event(ProgressEvent {
            message: format!(
                "phase=Fetch; tokens {range} ({total} ids, {} already checkpointed)",
                results.len()
            ),
            elapsed: None,
        });

        let mut dirty = false;
        for (position, token_id) in (1u64..).zip(range.ids()) {
            if !needs_fetch(&results, token_id, options.refresh_token_zero) {
                summary.skipped += 1;
                sink.token(TokenProgress {
                    token_id,
                    position,
                    total,
                    fetched: false,
                    failed: false,
                });
                continue;
            }

            if !options.delay.is_zero() {
                thread::sleep(options.delay);
            }

            let entry = self.fetch_token(token_id);
            summary.processed += 1;
            if let TokenEntry::Failed(failure) = &entry {
                summary.failed += 1;
                tracing::warn!(token_id, error = %failure.error, "token recorded as failed");
            } else {
                summary.succeeded += 1;
            }
            sink.token(TokenProgress {
                token_id,
                position,
                total,
                fetched: true,
                failed: entry.is_error(),
            });

            if let Some(record) = entry.record() {
                match mapping.aggregate(token_id, record) {
                    AggregateOutcome::NewQuote => {
                        summary.new_quotes += 1;
                        summary.mapped_tokens += 1;
                        tracing::info!(token_id, quote = ?quote_title(record), "new quote");
                        self.store.save_mapping(&mapping)?;
                    }
                    AggregateOutcome::Appended => {
                        summary.mapped_tokens += 1;
                        tracing::debug!(token_id, quote = ?quote_title(record), "mapped token");
                    }
                    AggregateOutcome::AlreadyPresent => {}
                    AggregateOutcome::NoQuote => {
                        tracing::debug!(
                            token_id,
                            attributes = ?record.attributes.keys().collect::<Vec<_>>(),
                            "no quote title"
                        );
                    }
                }
            }

            results.insert(token_id, entry);
            dirty = true;

            if token_id % options.batch_size == 0 || token_id == range.max() {
                self.store.save_results(&results)?;
                dirty = false;
                sink.event(ProgressEvent {
                    message: format!(
                        "phase=Store; checkpoint after token {token_id} ({} entries)",
                        results.len()
                    ),
                    elapsed: Some(started.elapsed()),
                });
            }
        }

        if dirty {
            self.store.save_results(&results)?;
        }
        self.store.save_mapping(&mapping)?;

        summary.results_total = results.len();
        summary.quotes_total = mapping.len();
        summary.finished_at = chrono::Utc::now().to_rfc3339();
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; processed {} skipped {} failed {}; {} quotes",
                summary.processed,
                summary.skipped,
                summary.failed,
                mapping.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(summary)
    }

    /// Derives the quote mapping from the results file alone and persists it.
    pub fn rebuild_mapping(&self, sink: &dyn ProgressSink) -> Result<RebuildSummary, CardsError> {
        sink.event(ProgressEvent {
            message: format!("phase=Rebuild; reading {}", self.store.results_path()),
            elapsed: None,
        });
        let results = self.store.read_results()?;
        let mapping = mapping_from_results(&results);
        self.store.save_mapping(&mapping)?;

        Ok(RebuildSummary {
            records: results.values().filter(|entry| entry.record().is_some()).count(),
            quotes: mapping.len(),
            tokens: mapping.token_count(),
            sample: mapping
                .iter()
                .take(REBUILD_SAMPLE_SIZE)
                .map(|(quote, ids)| QuoteSample {
                    quote: quote.to_string(),
                    tokens: ids.len(),
                })
                .collect(),
            mapping_path: self.store.mapping_path().to_string(),
        })
    }

    pub fn export_csv(
        &self,
        source: ExportSource,
        sink: &dyn ProgressSink,
    ) -> Result<ExportSummary, CardsError> {
        let mapping = match source {
            ExportSource::Mapping => self.store.read_mapping()?,
            ExportSource::Results => mapping_from_results(&self.store.read_results()?),
        };
        sink.event(ProgressEvent {
            message: format!(
                "phase=Export; {} quotes to {}",
                mapping.len(),
                self.store.csv_path()
            ),
            elapsed: None,
        });
        write_csv(self.store.csv_path(), &mapping)
    }

    /// Fetches a few tokens for a look at their metadata. Nothing is persisted.
    pub fn inspect(&self, token_ids: &[u64], delay: Duration) -> InspectResult {
        let mut items = Vec::with_capacity(token_ids.len());
        for (index, token_id) in token_ids.iter().copied().enumerate() {
            if index > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }
            let item = match self.source.token_uri(token_id) {
                Ok(uri) => InspectItem {
                    token_id,
                    uri_preview: Some(truncate_with_marker(&uri, URI_PREVIEW_CHARS)),
                    entry: entry_for_uri(token_id, &uri),
                },
                Err(err) => InspectItem {
                    token_id,
                    uri_preview: None,
                    entry: TokenEntry::failed(token_id, err.to_string(), None),
                },
            };
            items.push(item);
        }
        InspectResult { items }
    }
}

/// Non-error entries are never fetched again, except token 0 when `refresh_token_zero` is set.
pub fn needs_fetch(results: &ResultsStore, token_id: u64, refresh_token_zero: bool) -> bool {
    match results.get(&token_id) {
        Some(entry) if !entry.is_error() => token_id == 0 && refresh_token_zero,
        _ => true,
    }
}

pub fn mapping_from_results(results: &ResultsStore) -> QuoteMapping {
    let mut mapping = QuoteMapping::new();
    for (token_id, entry) in results {
        if let Some(record) = entry.record() {
            mapping.aggregate(*token_id, record);
        }
    }
    mapping
}

fn decode_entry(token_id: u64, uri: &str) -> Result<TokenEntry, DecodeError> {
    let payload = decode(uri)?;
    Ok(entry_from_payload(token_id, payload))
}

fn entry_for_uri(token_id: u64, uri: &str) -> TokenEntry {
    decode_entry(token_id, uri).unwrap_or_else(|err| TokenEntry::from_decode_error(token_id, &err))
}

fn report_load(label: &str, path: &str, state: &LoadState) {
    match state {
        LoadState::Loaded(count) => tracing::info!(path, count, "loaded existing {label}"),
        LoadState::Missing => tracing::info!(path, "no existing {label}, starting fresh"),
        LoadState::Corrupt(reason) => {
            tracing::warn!(path, %reason, "unreadable {label}, starting fresh")
        }
    }
}
