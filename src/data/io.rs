//! Parquet table I/O

use crate::artifacts::{stage_file, StagedFile};
use crate::error::Result;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Read a parquet table
pub fn read_parquet(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let df = ParquetReader::new(file).finish()?;
    tracing::debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Read table");
    Ok(df)
}

/// Write a gzip-compressed parquet table atomically
pub fn write_parquet(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    stage_parquet(df, path)?.commit()?;
    tracing::debug!(path = %path.display(), rows = df.height(), "Wrote table");
    Ok(())
}

/// Write a gzip-compressed parquet table to its temp file, leaving `path` alone
pub fn stage_parquet(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<StagedFile> {
    stage_file(path.as_ref(), |file| {
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Gzip(None))
            .finish(df)?;
        Ok(())
    })
}
