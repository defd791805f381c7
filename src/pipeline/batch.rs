use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PipelineError, Result};

/// UTF-8 byte-order mark so spreadsheet tools pick the right encoding
pub const BOM: &[u8] = b"\xEF\xBB\xBF";

/// `dados_www_imob_com_br.csv` for `www.imob.com.br`
pub fn batch_file_name(domain: &str) -> String {
    let safe: String = domain
        .chars()
        .map(|c| if c == '.' || c == ':' { '_' } else { c })
        .collect();
    format!("dados_{safe}.csv")
}

pub fn batch_path(output_dir: &Path, domain: &str) -> PathBuf {
    output_dir.join(batch_file_name(domain))
}

/// Writes `rows` as a BOM-prefixed CSV with a header row.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let csv_error = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut file = BufWriter::new(File::create(path).map_err(|e| PipelineError::io(path, e))?);
    file.write_all(BOM).map_err(|e| PipelineError::io(path, e))?;

    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))
}

/// Writes raw string rows under an explicit header.
pub fn write_table(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let csv_error = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut file = BufWriter::new(File::create(path).map_err(|e| PipelineError::io(path, e))?);
    file.write_all(BOM).map_err(|e| PipelineError::io(path, e))?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        writer.write_record(row).map_err(csv_error)?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))
}

/// Reads a CSV into its header and rows, tolerating a leading BOM.
pub fn read_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let csv_error = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let header = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        rows.push(record.iter().map(String::from).collect());
    }
    Ok((header, rows))
}
