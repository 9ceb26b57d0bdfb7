//! Reading mod metadata from the mods folder: `modinfo.json` inside zip archives and
//! attributes of single-file `.cs` mods. Also lists mod files and applies exclusions.

use crate::model::{ModInfo, ModKind};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

const MODINFO_NAME: &str = "modinfo.json";
const MODICON_NAME: &str = "modicon.png";

#[derive(Debug, Error)]
pub enum ModInfoError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a readable zip archive: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{path} has no modinfo.json.")]
    NoModInfo { path: PathBuf },

    #[error("{path}: mod metadata has no '{field}'.")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("{path}: not a mod file (expected .zip or .cs).")]
    UnsupportedKind { path: PathBuf },

    #[error("Cannot list mods folder {path}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Metadata fields as found in the file, before defaults are applied.
#[derive(Debug, Default, PartialEq, Eq)]
struct RawFields {
    name: Option<String>,
    modid: Option<String>,
    version: Option<String>,
    description: Option<String>,
}

fn kind_of(path: &Path) -> Option<ModKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "zip" => Some(ModKind::Zip),
        "cs" => Some(ModKind::Source),
        _ => None,
    }
}

/// Read metadata of one mod file.
pub fn read_mod(path: &Path) -> Result<ModInfo, ModInfoError> {
    let kind = kind_of(path).ok_or_else(|| ModInfoError::UnsupportedKind {
        path: path.to_path_buf(),
    })?;
    let fields = match kind {
        ModKind::Zip => {
            let text = read_zip_member_text(path, MODINFO_NAME)?.ok_or_else(|| {
                ModInfoError::NoModInfo {
                    path: path.to_path_buf(),
                }
            })?;
            parse_modinfo_text(&text)
        }
        ModKind::Source => {
            let bytes = std::fs::read(path).map_err(|e| ModInfoError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            parse_cs_source(&decode_text(&bytes))
        }
    };
    into_mod_info(fields, path, kind)
}

fn into_mod_info(fields: RawFields, path: &Path, kind: ModKind) -> Result<ModInfo, ModInfoError> {
    let name = fields
        .name
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ModInfoError::MissingField {
            path: path.to_path_buf(),
            field: "name",
        })?;
    let version = fields
        .version
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ModInfoError::MissingField {
            path: path.to_path_buf(),
            field: "version",
        })?;
    let modid = fields
        .modid
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| modid_from_name(&name));
    Ok(ModInfo {
        name: name.trim().to_string(),
        modid: modid.trim().to_string(),
        version: version.trim().to_string(),
        description: fields.description.filter(|s| !s.trim().is_empty()),
        path: path.to_path_buf(),
        kind,
    })
}

/// Repository id derived from a display name: whitespace removed, lowercased.
pub fn modid_from_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// UTF-8 decode with BOM stripped; invalid sequences are replaced.
fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, ModInfoError> {
    let file = File::open(path).map_err(|e| ModInfoError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    ZipArchive::new(file).map_err(|e| ModInfoError::Zip {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Name of a root-level archive member: exact match first, then case-insensitive.
fn find_member(archive: &ZipArchive<File>, wanted: &str) -> Option<String> {
    let names: Vec<&str> = archive.file_names().collect();
    names
        .iter()
        .find(|n| **n == wanted)
        .or_else(|| names.iter().find(|n| n.eq_ignore_ascii_case(wanted)))
        .map(|n| n.to_string())
}

fn read_zip_member(path: &Path, wanted: &str) -> Result<Option<Vec<u8>>, ModInfoError> {
    let mut archive = open_archive(path)?;
    let name = match find_member(&archive, wanted) {
        Some(n) => n,
        None => return Ok(None),
    };
    let mut entry = archive.by_name(&name).map_err(|e| ModInfoError::Zip {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(|e| ModInfoError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(Some(buf))
}

fn read_zip_member_text(path: &Path, wanted: &str) -> Result<Option<String>, ModInfoError> {
    Ok(read_zip_member(path, wanted)?.map(|b| decode_text(&b)))
}

/// Bytes of `modicon.png` from a zip mod. Source mods have no icon.
pub fn read_icon(path: &Path) -> Result<Option<Vec<u8>>, ModInfoError> {
    match kind_of(path) {
        Some(ModKind::Zip) => read_zip_member(path, MODICON_NAME),
        _ => Ok(None),
    }
}

/// True when the archive at `path` carries a `modinfo.json`.
fn is_mod_archive(path: &Path) -> bool {
    match open_archive(path) {
        Ok(archive) => find_member(&archive, MODINFO_NAME).is_some(),
        Err(e) => {
            debug!(error = %e, "ignoring unreadable archive");
            false
        }
    }
}

/// Parse `modinfo.json`. Strict JSON with case-insensitive keys first; the game also accepts
/// relaxed JSON (unquoted keys, trailing commas, comments) so fall back to field regexes.
fn parse_modinfo_text(text: &str) -> RawFields {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(text) {
        let get = |key: &str| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .and_then(|(_, v)| v.as_str())
                .map(String::from)
        };
        let fields = RawFields {
            name: get("name"),
            modid: get("modid"),
            version: get("version"),
            description: get("description"),
        };
        if fields.name.is_some() && fields.version.is_some() {
            return fields;
        }
    }
    RawFields {
        name: capture_json_field(text, "name"),
        modid: capture_json_field(text, "modid"),
        version: capture_json_field(text, "version"),
        description: capture_json_field(text, "description"),
    }
}

/// First `"key": "value"` (quotes on the key optional, key case-insensitive).
fn capture_json_field(text: &str, key: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)"?\b{}"?\s*:\s*"((?:[^"\\]|\\.)*)""#,
        regex::escape(key)
    );
    let re = Regex::new(&pattern).ok()?;
    let raw = re.captures(text)?.get(1)?.as_str();
    Some(unescape_json(raw))
}

fn unescape_json(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

/// Attributes of a `.cs` mod: namespace as name and id, `Version = "..."`, `Description = "..."`.
fn parse_cs_source(text: &str) -> RawFields {
    let capture = |pattern: &str| -> Option<String> {
        let re = Regex::new(pattern).ok()?;
        Some(re.captures(text)?.get(1)?.as_str().to_string())
    };
    let name = capture(r"(?i)\bnamespace\s+(\w+)");
    RawFields {
        modid: name.clone(),
        name,
        version: capture(r#"(?i)\bVersion\s*=\s*"([\d.]*)""#),
        description: capture(r#"(?i)\bDescription\s*=\s*"((?:[^"\\]|\\.)*)""#),
    }
}

/// Mod files in `dir`: zips with a `modinfo.json` and `.cs` files, sorted case-insensitively.
pub fn list_mod_files(dir: &Path) -> Result<Vec<PathBuf>, ModInfoError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ModInfoError::ListDir {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ModInfoError::ListDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match kind_of(&path) {
            Some(ModKind::Zip) => {
                if is_mod_archive(&path) {
                    files.push(path);
                } else {
                    debug!(file = %path.display(), "zip without modinfo.json, not a mod");
                }
            }
            Some(ModKind::Source) => files.push(path),
            None => {}
        }
    }
    files.sort_by_key(|p| sort_key(p));
    Ok(files)
}

fn sort_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Split mod files into (to check, excluded). Exclusions are matched against file names.
pub fn apply_exclusions(files: Vec<PathBuf>, excluded: &[String]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    files.into_iter().partition(|p| {
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        !excluded.iter().any(|e| e.trim() == name)
    })
}
