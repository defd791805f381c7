//! Merges the per-site CSV batches into one deduplicated table.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{NOT_INFORMED, RECORD_COLUMNS};
use crate::pipeline::batch::{read_table, write_table};

/// Columns that identify the same offer across batches
pub const KEY_COLUMNS: [&str; 3] = ["endereco", "preco", "site"];

/// A table in the fixed consolidated column order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsolidatedTable {
    pub rows: Vec<Vec<String>>,
}

impl ConsolidatedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Concatenates batches, reorders columns, back-fills missing ones with
    /// "N/I", and drops repeated (address, price, site) rows keeping the first.
    pub fn from_batches(batches: Vec<(Vec<String>, Vec<Vec<String>>)>) -> Self {
        let key_positions: Vec<usize> = KEY_COLUMNS
            .iter()
            .filter_map(|key| RECORD_COLUMNS.iter().position(|c| *c == *key))
            .collect();

        let mut seen = HashSet::new();
        let mut rows = Vec::new();

        for (header, batch_rows) in batches {
            let mapping: Vec<Option<usize>> = RECORD_COLUMNS
                .iter()
                .map(|column| header.iter().position(|h| h.as_str() == *column))
                .collect();

            for row in batch_rows {
                let normalized: Vec<String> = mapping
                    .iter()
                    .map(|source| {
                        source
                            .and_then(|i| row.get(i))
                            .cloned()
                            .unwrap_or_else(|| NOT_INFORMED.to_string())
                    })
                    .collect();

                let key: Vec<String> = key_positions.iter().map(|&i| normalized[i].clone()).collect();
                if seen.insert(key) {
                    rows.push(normalized);
                }
            }
        }

        Self { rows }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        RECORD_COLUMNS.iter().position(|c| *c == name)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_table(path, &RECORD_COLUMNS, &self.rows)
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingInputFile(path.to_path_buf()));
        }
        Ok(Self::from_batches(vec![read_table(path)?]))
    }
}

/// CSV batches in `dir`, sorted by file name
pub fn batch_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .collect();
    files.sort();
    files
}

/// The `consolidate` stage.
pub fn run_consolidation(batch_dir: &Path, output: &Path) -> Result<ConsolidatedTable> {
    let files = batch_files(batch_dir);
    if files.is_empty() {
        return Err(PipelineError::MissingInputFile(batch_dir.join("*.csv")));
    }

    info!("Consolidating {} CSV files...", files.len());

    let mut batches = Vec::new();
    for file in &files {
        match read_table(file) {
            Ok(batch) => batches.push(batch),
            Err(e) => warn!("Could not read {}: {}", file.display(), e),
        }
    }

    let table = ConsolidatedTable::from_batches(batches);
    if table.is_empty() {
        return Err(PipelineError::NoValidData("no rows to consolidate".to_string()));
    }

    table.write(output)?;
    info!(
        "✅ Consolidation complete! {} unique offers saved to '{}'",
        table.len(),
        output.display()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn drops_duplicates_keeping_the_first() {
        let header = strings(&RECORD_COLUMNS);
        let a = strings(&["A1", "Casa", "Rua 1, Centro", "R$ 100.000", "N/I", "2", "1", "1", "1", "a.com"]);
        let dup = strings(&["A2", "Casa", "Rua 1, Centro", "R$ 100.000", "90m²", "3", "1", "2", "0", "a.com"]);
        let b = strings(&["B1", "Apartamento", "Rua 2, Fábricas", "R$ 200.000", "N/I", "2", "1", "1", "1", "b.com"]);

        let table = ConsolidatedTable::from_batches(vec![
            (header.clone(), vec![a.clone()]),
            (header, vec![dup, b.clone()]),
        ]);

        assert_eq!(table.rows, vec![a, b]);
    }

    #[test]
    fn same_offer_on_different_sites_is_kept() {
        let header = strings(&["endereco", "preco", "site"]);
        let table = ConsolidatedTable::from_batches(vec![(
            header,
            vec![strings(&["Rua 1", "R$ 1", "a.com"]), strings(&["Rua 1", "R$ 1", "b.com"])],
        )]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn reorders_and_backfills_columns() {
        let header = strings(&["site", "preco", "endereco", "extra"]);
        let table = ConsolidatedTable::from_batches(vec![(header, vec![strings(&["a.com", "R$ 5", "Rua 9", "x"])])]);

        assert_eq!(
            table.rows[0],
            strings(&["N/I", "N/I", "Rua 9", "R$ 5", "N/I", "N/I", "N/I", "N/I", "N/I", "a.com"])
        );
    }

    #[test]
    fn consolidates_files_on_disk() {
        let dir = std::env::temp_dir().join(format!("scout-consolidate-{}", std::process::id()));
        let batches = dir.join("dados");
        std::fs::create_dir_all(&batches).unwrap();

        let header = RECORD_COLUMNS;
        let row = strings(&["N/I", "Casa", "Rua 1, Centro", "R$ 300.000", "N/I", "3", "N/I", "2", "1", "a.com"]);
        write_table(&batches.join("dados_a_com.csv"), &header, &[row.clone(), row.clone()]).unwrap();
        std::fs::write(batches.join("notes.txt"), "ignored").unwrap();

        let output = dir.join("OFERTAS.csv");
        let table = run_consolidation(&batches, &output).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(ConsolidatedTable::read(&output).unwrap(), table);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_directory_is_a_missing_input() {
        let err = run_consolidation(Path::new("/nonexistent/dados"), Path::new("/tmp/out.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInputFile(_)));
    }
}
