use std::io::{self, Write};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::app::{
    FetchSummary, InspectResult, ProgressEvent, ProgressSink, RebuildSummary, TokenProgress,
    TracingProgress,
};
use crate::export::ExportSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_rebuild(result: &RebuildSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_export(result: &ExportSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_inspect(result: &InspectResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

const BAR_TEMPLATE: &str =
    "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec}) {msg}";

/// Terminal progress bar for interactive fetches. Log lines are printed above the bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn event(&self, event: ProgressEvent) {
        self.bar.suspend(|| TracingProgress.event(event));
    }

    fn token(&self, progress: TokenProgress) {
        if self.bar.length() != Some(progress.total) {
            self.bar.set_length(progress.total);
        }
        self.bar.set_position(progress.position);
        let state = match (progress.fetched, progress.failed) {
            (false, _) => "cached",
            (true, false) => "ok",
            (true, true) => "failed",
        };
        self.bar.set_message(format!("token {} {state}", progress.token_id));
        if progress.position == progress.total {
            self.bar.finish_and_clear();
        }
    }
}
