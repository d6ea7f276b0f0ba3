use std::io::Write;

use camino::Utf8Path;
use serde::Serialize;

use crate::error::CardsError;
use crate::quotes::QuoteMapping;

pub const CSV_HEADER: [&str; 2] = ["quote", "token_id"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvRow {
    pub quote: String,
    pub token_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub path: String,
    pub rows: usize,
    pub quotes: usize,
}

/// One row per quote membership, ordered by token ID. Ties keep mapping order.
pub fn csv_rows(mapping: &QuoteMapping) -> Vec<CsvRow> {
    let mut rows: Vec<CsvRow> = mapping
        .iter()
        .flat_map(|(quote, ids)| {
            ids.iter().map(move |token_id| CsvRow {
                quote: quote.to_string(),
                token_id: *token_id,
            })
        })
        .collect();
    rows.sort_by_key(|row| row.token_id);
    rows
}

/// The header is written even when there are no rows.
pub fn write_rows<W: Write>(writer: W, rows: &[CsvRow]) -> Result<(), CardsError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)
        .map_err(|err| CardsError::Csv(err.to_string()))?;
    for row in rows {
        let token_id = row.token_id.to_string();
        csv.write_record([row.quote.as_str(), token_id.as_str()])
            .map_err(|err| CardsError::Csv(err.to_string()))?;
    }
    csv.flush().map_err(|err| CardsError::Csv(err.to_string()))?;
    Ok(())
}

pub fn write_csv(path: &Utf8Path, mapping: &QuoteMapping) -> Result<ExportSummary, CardsError> {
    let rows = csv_rows(mapping);

    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    std::fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CardsError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".buterin-cards-csv")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CardsError::Filesystem(err.to_string()))?;
    write_rows(temp.as_file_mut(), &rows)?;
    temp.persist(path.as_std_path())
        .map_err(|err| CardsError::Filesystem(format!("persist {path}: {err}")))?;

    tracing::info!(path = %path, rows = rows.len(), quotes = mapping.len(), "wrote CSV export");
    Ok(ExportSummary {
        path: path.to_string(),
        rows: rows.len(),
        quotes: mapping.len(),
    })
}
