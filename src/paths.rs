//! Filesystem locations: the game's mods folder and the updater's own folder
//! (`<user config dir>/VS_ModsUpdater`) holding config.ini, logs, updates.log and PDF catalogs.

use crate::config::ConfigError;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const APP_DIR_NAME: &str = "VS_ModsUpdater";
const GAME_DATA_DIR_NAME: &str = "VintagestoryData";
const CONFIG_FILE_NAME: &str = "config.ini";
const LOGS_DIR_NAME: &str = "logs";
const LANG_DIR_NAME: &str = "lang";

/// Game's default mods folder: `%APPDATA%\VintagestoryData\Mods` on Windows,
/// `~/.config/VintagestoryData/Mods` on Linux.
pub fn default_mods_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(GAME_DATA_DIR_NAME).join("Mods"))
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir {
        path: dir.clone(),
        source: e,
    })?;
    Ok(dir)
}

/// The updater's own folder, created if missing.
pub fn app_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or(ConfigError::UnsupportedPlatform)?;
    ensure_dir(base.join(APP_DIR_NAME))
}

pub fn default_config_file(app_dir: &Path) -> PathBuf {
    app_dir.join(CONFIG_FILE_NAME)
}

/// Log folder under the app folder, created if missing.
pub fn logs_dir(app_dir: &Path) -> Result<PathBuf, ConfigError> {
    ensure_dir(app_dir.join(LOGS_DIR_NAME))
}

/// Where language files are looked up, in order: next to the executable, the working
/// directory, then the app folder.
pub fn lang_dirs(app_dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir.join(LANG_DIR_NAME));
    }
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join(LANG_DIR_NAME));
    }
    dirs.push(app_dir.join(LANG_DIR_NAME));
    dirs
}

/// First existing directory among: command-line path, configured path, the game's default.
pub fn resolve_mods_dir(
    from_cli: Option<&Path>,
    from_config: Option<&Path>,
    default: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let mut tried = Vec::new();
    for (origin, candidate) in [
        ("--modspath", from_cli),
        ("config.ini", from_config),
        ("default", default),
    ] {
        let Some(path) = candidate else { continue };
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
        if origin != "default" {
            warn!(path = %path.display(), origin, "mods folder does not exist, ignoring");
        }
        tried.push(path.display().to_string());
    }
    Err(ConfigError::NoModsDir {
        tried: if tried.is_empty() {
            "none".to_string()
        } else {
            tried.join(", ")
        },
    })
}
