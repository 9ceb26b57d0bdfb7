//! Errors from the mod repository: network, HTTP status, decoding and local file writes.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModDbError {
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Mod '{modid}' not found in the mod database.")]
    NotFound { modid: String },

    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
