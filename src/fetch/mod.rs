// src/fetch/mod.rs

use reqwest::blocking::Client;
use std::{fs, path::PathBuf, time::Duration};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::table::RawTable;

/// Anything that can hand back the raw bytes of a named tabular source.
pub trait TableSource: Send + Sync {
    fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP GET with a hard deadline. Non-2xx is treated as unavailable.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("building http client: {}", e)))?;
        Ok(Self { client })
    }
}

impl TableSource for HttpSource {
    fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>> {
        let unavailable = |reason: String| PipelineError::SourceUnavailable {
            location: location.to_string(),
            reason,
        };
        debug!(%location, "GET");
        let bytes = self
            .client
            .get(location)
            .send()
            .map_err(|e| unavailable(format!("GET failed: {}", e)))?
            .error_for_status()
            .map_err(|e| unavailable(format!("non-success status: {}", e)))?
            .bytes()
            .map_err(|e| unavailable(format!("reading body: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Reads a local file; accepts `file://` URLs or bare paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

impl TableSource for FileSource {
    fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>> {
        let path = local_path(location);
        fs::read(&path).map_err(|e| PipelineError::SourceUnavailable {
            location: location.to_string(),
            reason: format!("reading {}: {}", path.display(), e),
        })
    }
}

fn local_path(location: &str) -> PathBuf {
    Url::parse(location)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
        .unwrap_or_else(|| PathBuf::from(location))
}

/// Pick a source implementation from the location's URL scheme.
pub fn source_for(location: &str, timeout: Duration) -> Result<Box<dyn TableSource>> {
    match Url::parse(location) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(Box::new(HttpSource::new(timeout)?)),
        Ok(u) if u.scheme() == "file" => Ok(Box::new(FileSource)),
        Ok(u) if u.scheme().len() > 1 => Err(PipelineError::Config(format!(
            "unsupported source scheme '{}' in {}",
            u.scheme(),
            location
        ))),
        // bare paths (and windows drive letters, which parse as a 1-char scheme)
        _ => Ok(Box::new(FileSource)),
    }
}

/// Fetch, parse and alias-normalize the source table.
#[instrument(level = "info", skip(source))]
pub fn fetch_and_parse(source: &dyn TableSource, location: &str) -> Result<RawTable> {
    let bytes = source.fetch_bytes(location)?;
    let table = RawTable::from_csv_bytes(location, &bytes)?.normalize_columns();
    info!(
        rows = table.num_rows(),
        columns = ?table.headers.iter().take(10).collect::<Vec<_>>(),
        "read source table"
    );
    Ok(table)
}
