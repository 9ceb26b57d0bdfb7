//! Vintage Story mod database: API types, the repository trait, URL helpers and the HTTP client.

mod changelog;
mod client;
mod error;

pub use changelog::parse_changelog;
pub use client::{ModDbClient, ModDbClientBuilder, DEFAULT_BASE_URL};
pub use error::ModDbError;

use crate::model::Changelog;
use serde::Deserialize;
use std::path::Path;

/// A mod as described by `GET /api/mod/<modid>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModRecord {
    pub assetid: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub urlalias: Option<String>,
    /// Newest first.
    #[serde(default)]
    pub releases: Vec<Release>,
}

/// One downloadable release of a mod.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub mainfile: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub modversion: String,
    /// Game versions the release is tagged for, e.g. `v1.19.3`.
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    statuscode: serde_json::Value,
    #[serde(rename = "mod", default)]
    record: Option<ModRecord>,
}

impl ApiResponse {
    fn is_ok(&self) -> bool {
        match &self.statuscode {
            serde_json::Value::String(s) => s.trim() == "200",
            serde_json::Value::Number(n) => n.as_u64() == Some(200),
            _ => false,
        }
    }
}

/// Where mod metadata, files and changelogs come from.
pub trait ModRepository {
    /// Base URL used for page links.
    fn base_url(&self) -> &str;

    fn fetch_mod(&self, modid: &str) -> Result<ModRecord, ModDbError>;

    /// Download `url` to `dest`, returning the number of bytes written.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, ModDbError>;

    fn fetch_changelog(&self, assetid: u64) -> Result<Changelog, ModDbError>;
}

pub fn api_url(base: &str, modid: &str) -> String {
    format!("{}/api/mod/{}", base, urlencoding::encode(modid.trim()))
}

pub fn changelog_url(base: &str, assetid: u64) -> String {
    format!("{}/show/mod/{}#tab-files", base, assetid)
}

/// Public page of a mod: its URL alias when it has one, otherwise the numeric show page.
pub fn mod_page_url(base: &str, record: &ModRecord) -> String {
    match record
        .urlalias
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
    {
        Some(alias) => format!("{}/{}", base, alias.trim_start_matches('/')),
        None => format!("{}/show/mod/{}", base, record.assetid),
    }
}

/// Absolute download URL for a release's main file.
pub fn file_url(base: &str, mainfile: &str) -> String {
    let mainfile = mainfile.trim();
    if mainfile.starts_with("http://") || mainfile.starts_with("https://") {
        mainfile.to_string()
    } else {
        format!("{}/{}", base, mainfile.trim_start_matches('/'))
    }
}

/// Last path component, so a name from the server can never leave the mods folder.
fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    match last {
        "" | "." | ".." => None,
        _ => Some(last.to_string()),
    }
}

/// File name for a downloaded release: the `filename` field, else the decoded last segment of
/// the main file URL.
pub fn download_file_name(release: &Release) -> Option<String> {
    if let Some(name) = release.filename.as_deref().and_then(sanitize_file_name) {
        return Some(name);
    }
    let without_query = release
        .mainfile
        .split(['?', '#'])
        .next()
        .unwrap_or(&release.mainfile);
    let segment = without_query.rsplit('/').next()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    sanitize_file_name(&decoded)
}

/// Decode an API body. A status other than 200 or a missing `mod` object means not found.
pub fn parse_api_response(body: &str, modid: &str, url: &str) -> Result<ModRecord, ModDbError> {
    let response: ApiResponse = serde_json::from_str(body).map_err(|e| ModDbError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !response.is_ok() {
        return Err(ModDbError::NotFound {
            modid: modid.to_string(),
        });
    }
    response.record.ok_or_else(|| ModDbError::NotFound {
        modid: modid.to_string(),
    })
}

impl ModRepository for ModDbClient {
    fn base_url(&self) -> &str {
        ModDbClient::base_url(self)
    }

    fn fetch_mod(&self, modid: &str) -> Result<ModRecord, ModDbError> {
        let url = api_url(ModDbClient::base_url(self), modid);
        let body = match self.fetch_text(&url) {
            Err(ModDbError::HttpStatus { status: 404, .. }) => {
                return Err(ModDbError::NotFound {
                    modid: modid.to_string(),
                })
            }
            other => other?,
        };
        parse_api_response(&body, modid, &url)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, ModDbError> {
        self.download_to(url, dest)
    }

    fn fetch_changelog(&self, assetid: u64) -> Result<Changelog, ModDbError> {
        let url = changelog_url(ModDbClient::base_url(self), assetid);
        let html = self.fetch_text(&url)?;
        Ok(parse_changelog(&html, &url))
    }
}
