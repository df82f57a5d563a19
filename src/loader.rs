use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;

/// Input file as read from disk: header plus string cells, nothing coerced yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadStats {
    pub bytes: usize,
    pub rows: usize,
    pub columns: usize,
    /// Rows whose cell count differed from the header; padded or truncated.
    pub ragged_rows: usize,
}

/// Read and parse the input CSV. A single attempt; retries live in the harness.
pub async fn load_table(path: &Path) -> Result<(RawTable, LoadStats)> {
    let bytes = tokio::fs::read(path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "input read");
    let (table, mut stats) = parse_table(&bytes)?;
    stats.bytes = bytes.len();
    info!(
        rows = stats.rows,
        columns = stats.columns,
        ragged = stats.ragged_rows,
        "[LOAD] {} rows x {} columns from {}",
        stats.rows,
        stats.columns,
        path.display(),
    );
    Ok((table, stats))
}

/// Parse CSV bytes into a [`RawTable`]. Headers are trimmed; cells are kept verbatim.
pub fn parse_table(bytes: &[u8]) -> Result<(RawTable, LoadStats)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut stats = LoadStats {
        columns: headers.len(),
        ..LoadStats::default()
    };
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        if cells.len() != headers.len() {
            stats.ragged_rows += 1;
            cells.resize(headers.len(), String::new());
        }
        rows.push(cells);
    }

    stats.rows = rows.len();
    Ok((RawTable { headers, rows }, stats))
}
