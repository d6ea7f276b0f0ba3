use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::Utf8PathBuf;
use serde_json::json;

use buterin_cards::app::{
    App, ExportSource, FetchOptions, ProgressEvent, ProgressSink, TokenProgress,
    mapping_from_results,
};
use buterin_cards::decode::BASE64_JSON_PREFIX;
use buterin_cards::domain::TokenRange;
use buterin_cards::error::CardsError;
use buterin_cards::metadata::TokenEntry;
use buterin_cards::output::JsonOutput;
use buterin_cards::rpc::TokenUriSource;
use buterin_cards::store::{ResultsStore, Store};

#[derive(Default)]
struct FakeContract {
    uris: HashMap<u64, String>,
    calls: Mutex<Vec<u64>>,
}

impl FakeContract {
    fn with_quote(mut self, token_id: u64, quote: &str) -> Self {
        let metadata = json!({
            "name": format!("Buterin Card #{token_id}"),
            "description": "A card",
            "image": "data:image/jpeg;base64,/9j/",
            "attributes": [
                {"trait_type": "Quote Title", "value": quote},
                {"trait_type": "Phase", "value": "1"}
            ]
        });
        self.uris.insert(
            token_id,
            format!("{BASE64_JSON_PREFIX}{}", STANDARD.encode(metadata.to_string())),
        );
        self
    }

    fn with_uri(mut self, token_id: u64, uri: &str) -> Self {
        self.uris.insert(token_id, uri.to_string());
        self
    }

    fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }
}

impl TokenUriSource for FakeContract {
    fn token_uri(&self, token_id: u64) -> Result<String, CardsError> {
        self.calls.lock().unwrap().push(token_id);
        self.uris
            .get(&token_id)
            .cloned()
            .ok_or_else(|| CardsError::RpcCall("execution reverted [code 3]".to_string()))
    }
}

#[derive(Default)]
struct RecordingSink {
    tokens: Mutex<Vec<TokenProgress>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, _event: ProgressEvent) {}

    fn token(&self, progress: TokenProgress) {
        self.tokens.lock().unwrap().push(progress);
    }
}

fn options(batch_size: u64) -> FetchOptions {
    FetchOptions {
        batch_size,
        delay: Duration::ZERO,
        refresh_token_zero: true,
    }
}

fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, Store::in_dir(&dir))
}

fn read(path: &camino::Utf8Path) -> String {
    std::fs::read_to_string(path.as_std_path()).unwrap()
}

#[test]
fn checkpointed_token_is_not_fetched_again() {
    let (_temp, store) = temp_store();
    let mut existing = ResultsStore::new();
    let seeded = App::new(store.clone(), FakeContract::default().with_quote(7, "Q")).fetch_token(7);
    existing.insert(7, seeded);
    store.save_results(&existing).unwrap();

    let contract = (5..=10).fold(FakeContract::default(), |c, id| c.with_quote(id, "Q"));
    let app = App::new(store, &contract);
    let summary = app
        .fetch_range(TokenRange::new(5, 10).unwrap(), &options(50), &JsonOutput)
        .unwrap();

    assert_eq!(contract.calls(), vec![5, 6, 8, 9, 10]);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.processed, 5);
}

#[test]
fn token_zero_is_always_refetched() {
    let (_temp, store) = temp_store();
    let contract = FakeContract::default().with_quote(0, "Zero").with_quote(1, "One");
    let app = App::new(store, &contract);
    let range = TokenRange::new(0, 1).unwrap();

    app.fetch_range(range, &options(50), &JsonOutput).unwrap();
    app.fetch_range(range, &options(50), &JsonOutput).unwrap();
    assert_eq!(contract.calls(), vec![0, 1, 0]);

    let mut opts = options(50);
    opts.refresh_token_zero = false;
    app.fetch_range(range, &opts, &JsonOutput).unwrap();
    assert_eq!(contract.calls(), vec![0, 1, 0]);
}

#[test]
fn second_run_leaves_both_files_identical() {
    let (_temp, store) = temp_store();
    let contract = FakeContract::default()
        .with_quote(0, "Credible neutrality")
        .with_quote(1, "On collusion")
        .with_quote(2, "Credible neutrality")
        .with_uri(3, "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg'/>");
    let app = App::new(store.clone(), &contract);
    let range = TokenRange::new(0, 4).unwrap();

    app.fetch_range(range, &options(2), &JsonOutput).unwrap();
    let results_first = read(store.results_path());
    let mapping_first = read(store.mapping_path());

    app.fetch_range(range, &options(2), &JsonOutput).unwrap();
    assert_eq!(read(store.results_path()), results_first);
    assert_eq!(read(store.mapping_path()), mapping_first);

    let mapping = store.read_mapping().unwrap();
    assert_eq!(mapping.get("Credible neutrality"), Some(&[0, 2][..]));
    assert_eq!(mapping.get("On collusion"), Some(&[1][..]));
}

#[test]
fn failures_are_recorded_and_do_not_stop_the_loop() {
    let (_temp, store) = temp_store();
    let contract = FakeContract::default()
        .with_quote(1, "A")
        .with_uri(2, "ipfs://QmSomething")
        .with_uri(3, &format!("{BASE64_JSON_PREFIX}@@@"))
        .with_quote(5, "B");
    let app = App::new(store.clone(), &contract);

    let summary = app
        .fetch_range(TokenRange::new(1, 5).unwrap(), &options(50), &JsonOutput)
        .unwrap();
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.succeeded, 2);

    let results = store.read_results().unwrap();
    assert_eq!(results.len(), 5);
    match &results[&2] {
        TokenEntry::Failed(failure) => {
            assert_eq!(failure.preview.as_deref(), Some("ipfs://QmSomething"));
        }
        other => panic!("unexpected entry {other:?}"),
    }
    match &results[&4] {
        TokenEntry::Failed(failure) => assert!(failure.error.contains("execution reverted")),
        other => panic!("unexpected entry {other:?}"),
    }
    assert!(results[&5].record().is_some());
}

#[test]
fn error_records_are_retried() {
    let (_temp, store) = temp_store();
    let mut existing = ResultsStore::new();
    existing.insert(4, TokenEntry::failed(4, "timeout", None));
    store.save_results(&existing).unwrap();

    let contract = FakeContract::default().with_quote(4, "Recovered");
    let app = App::new(store.clone(), &contract);
    app.fetch_range(TokenRange::new(4, 4).unwrap(), &options(50), &JsonOutput)
        .unwrap();

    assert_eq!(contract.calls(), vec![4]);
    assert!(store.read_results().unwrap()[&4].record().is_some());
    assert_eq!(store.read_mapping().unwrap().get("Recovered"), Some(&[4][..]));
}

#[test]
fn corrupt_checkpoint_starts_fresh() {
    let (_temp, store) = temp_store();
    std::fs::write(store.results_path().as_std_path(), "[[[").unwrap();
    std::fs::write(store.mapping_path().as_std_path(), "nope").unwrap();

    let contract = FakeContract::default().with_quote(1, "A");
    let app = App::new(store.clone(), &contract);
    let summary = app
        .fetch_range(TokenRange::new(1, 1).unwrap(), &options(50), &JsonOutput)
        .unwrap();

    assert_eq!(summary.checkpoint_entries, 0);
    assert_eq!(store.read_results().unwrap().len(), 1);
}

/// Looks at the files on disk each time it is called.
struct Observer<'a> {
    inner: FakeContract,
    store: &'a Store,
    seen: Mutex<Vec<(u64, usize, usize)>>,
}

impl TokenUriSource for Observer<'_> {
    fn token_uri(&self, token_id: u64) -> Result<String, CardsError> {
        let (results, _) = self.store.load_results();
        let (mapping, _) = self.store.load_mapping();
        self.seen
            .lock()
            .unwrap()
            .push((token_id, results.len(), mapping.token_count()));
        self.inner.token_uri(token_id)
    }
}

#[test]
fn results_flush_on_batch_boundaries_and_mapping_on_new_quotes() {
    let (_temp, store) = temp_store();
    let inner = FakeContract::default()
        .with_quote(1, "A")
        .with_quote(2, "A")
        .with_quote(3, "B")
        .with_quote(4, "B")
        .with_quote(5, "C");
    let observer = Observer {
        inner,
        store: &store,
        seen: Mutex::new(Vec::new()),
    };
    let app = App::new(store.clone(), &observer);
    app.fetch_range(TokenRange::new(1, 5).unwrap(), &options(2), &JsonOutput)
        .unwrap();

    // (token about to be fetched, results on disk, mapped tokens on disk)
    let seen = observer.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![(1, 0, 0), (2, 0, 1), (3, 2, 1), (4, 2, 3), (5, 4, 3)]
    );

    assert_eq!(store.read_results().unwrap().len(), 5);
    assert_eq!(store.read_mapping().unwrap().token_count(), 5);
}

#[test]
fn rebuild_and_export_from_results() {
    let (_temp, store) = temp_store();
    let contract = FakeContract::default()
        .with_quote(5, "A")
        .with_quote(1, "A")
        .with_quote(3, "B");
    let app = App::new(store.clone(), &contract);
    app.fetch_range(TokenRange::new(1, 5).unwrap(), &options(50), &JsonOutput)
        .unwrap();
    std::fs::remove_file(store.mapping_path().as_std_path()).unwrap();

    let rebuilt = app.rebuild_mapping(&JsonOutput).unwrap();
    assert_eq!(rebuilt.quotes, 2);
    assert_eq!(rebuilt.tokens, 3);
    assert_eq!(rebuilt.sample[0].quote, "A");

    let export = app.export_csv(ExportSource::Mapping, &JsonOutput).unwrap();
    assert_eq!(export.rows, 3);
    assert_eq!(export.quotes, 2);
    assert_eq!(read(store.csv_path()), "quote,token_id\nA,1\nB,3\nA,5\n");

    let again = app.export_csv(ExportSource::Results, &JsonOutput).unwrap();
    assert_eq!(again.rows, 3);
}

#[test]
fn rebuild_never_duplicates() {
    let mut results = ResultsStore::new();
    let app = App::new(
        Store::in_dir(camino::Utf8Path::new("unused")),
        FakeContract::default().with_quote(2, "Q"),
    );
    results.insert(2, app.fetch_token(2));
    let once = mapping_from_results(&results);
    let mut twice = once.clone();
    for (token_id, entry) in &results {
        twice.aggregate(*token_id, entry.record().unwrap());
    }
    assert_eq!(once, twice);
    assert_eq!(once.get("Q"), Some(&[2][..]));
}

#[test]
fn inspect_writes_nothing() {
    let (temp, store) = temp_store();
    let contract = FakeContract::default().with_quote(1, "A");
    let app = App::new(store, &contract);
    let result = app.inspect(&[1, 2], Duration::ZERO);

    assert_eq!(result.items.len(), 2);
    assert!(result.items[0].entry.record().is_some());
    assert!(result.items[0].uri_preview.is_some());
    assert!(result.items[1].entry.is_error());
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn every_token_in_the_range_reports_progress() {
    let (_temp, store) = temp_store();
    let mut existing = ResultsStore::new();
    let seeded = App::new(store.clone(), FakeContract::default().with_quote(2, "Q")).fetch_token(2);
    existing.insert(2, seeded);
    store.save_results(&existing).unwrap();

    let contract = FakeContract::default().with_quote(1, "Q").with_quote(2, "Q");
    let sink = RecordingSink::default();
    App::new(store, &contract)
        .fetch_range(TokenRange::new(1, 3).unwrap(), &options(50), &sink)
        .unwrap();

    let seen: Vec<_> = sink
        .tokens
        .lock()
        .unwrap()
        .iter()
        .map(|p| (p.token_id, p.position, p.total, p.fetched, p.failed))
        .collect();
    assert_eq!(
        seen,
        vec![
            (1, 1, 3, true, false),
            (2, 2, 3, false, false),
            (3, 3, 3, true, true)
        ]
    );
}
