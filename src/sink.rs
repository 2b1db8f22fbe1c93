use std::path::{Path, PathBuf};

use crate::error::FrostError;

/// A row that can be written as delimited text.
pub trait Record {
    fn keys(&self) -> Vec<String>;
    fn values(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { path: PathBuf, rows: usize },
    /// Nothing to write; no file was created.
    Skipped,
}

/// Writes `records` as CSV to `destination`, header first.
///
/// The header comes from the first record; any record with different keys, or
/// with a value count that does not match the header, aborts the write.
pub fn write<R: Record>(records: &[R], destination: &Path) -> Result<WriteOutcome, FrostError> {
    let Some(first) = records.first() else {
        tracing::warn!(path = %destination.display(), "no records to write, skipping output");
        return Ok(WriteOutcome::Skipped);
    };
    let header = first.keys();

    // Check before touching the filesystem so a bad batch leaves no partial file.
    for (row, record) in records.iter().enumerate() {
        let keys = record.keys();
        let values = record.values().len();
        if keys != header || values != header.len() {
            tracing::error!(row, values, "record columns differ from header");
            return Err(FrostError::SchemaMismatch {
                row,
                expected: header,
                found: keys,
                values,
            });
        }
    }

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| FrostError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let mut out = csv::Writer::from_path(destination).map_err(|e| FrostError::io(destination, e))?;
    out.write_record(&header)
        .map_err(|e| FrostError::io(destination, e))?;
    for record in records {
        out.write_record(record.values())
            .map_err(|e| FrostError::io(destination, e))?;
    }
    out.flush().map_err(|source| FrostError::Io {
        path: destination.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %destination.display(), rows = records.len(), "wrote records");
    Ok(WriteOutcome::Written {
        path: destination.to_path_buf(),
        rows: records.len(),
    })
}
