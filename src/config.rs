//! `config.ini` handling. Default location is `<user config dir>/VS_ModsUpdater/config.ini`;
//! a missing or empty file is created with defaults on first launch.
//!
//! Sections: `[ModsUpdater]` (ver, force_update, disable_mod_dev), `[ModPath]` (path),
//! `[Language]` (language), `[Game_Version_max]` (version), `[Mod_Exclusion]` (mod1..modN).

use ini::{Ini, ParseOption};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Game version limit meaning "no limit".
pub const NO_GAME_VERSION_LIMIT: &str = "100.0.0";
pub const DEFAULT_LANGUAGE: &str = "en_US";
const EMPTY_EXCLUSION_SLOTS: usize = 10;

const SECTION_UPDATER: &str = "ModsUpdater";
const SECTION_PATH: &str = "ModPath";
const SECTION_LANGUAGE: &str = "Language";
const SECTION_GAME_VERSION: &str = "Game_Version_max";
const SECTION_EXCLUSION: &str = "Mod_Exclusion";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine the user configuration directory on this platform.")]
    UnsupportedPlatform,

    #[error("Cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Cannot write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value in config [{section}] {key}: '{value}' (expected true or false).")]
    InvalidBool {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("No mods folder found (tried: {tried}). Use --modspath or set [ModPath] path in config.ini.")]
    NoModsDir { tried: String },
}

/// Parsed `config.ini`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Updater version that wrote the file.
    pub created_by_version: Option<String>,
    /// Download the latest release even when the installed version is the same.
    pub force_update: bool,
    /// Ignore pre-release (dev, rc) versions when looking for updates.
    pub disable_mod_dev: bool,
    pub mods_path: Option<PathBuf>,
    pub language: String,
    /// Highest game version releases may require. `100.0.0` disables the limit.
    pub game_version_limit: String,
    /// File names of mods never updated. Sorted, no blanks.
    pub exclusions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            created_by_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            force_update: false,
            disable_mod_dev: false,
            mods_path: None,
            language: DEFAULT_LANGUAGE.to_string(),
            game_version_limit: NO_GAME_VERSION_LIMIT.to_string(),
            exclusions: Vec::new(),
        }
    }
}

/// Accepts true/false, yes/no, on/off, 1/0 in any case.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Drop lines the INI parser would reject. Older versions of the file carry bare
/// translated text lines without `=` in some sections.
fn sanitize(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.lines()
        .filter(|line| {
            let t = line.trim();
            t.is_empty()
                || t.starts_with('#')
                || t.starts_with(';')
                || t.starts_with('[')
                || t.contains('=')
                || t.contains(':')
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))?
        .iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
}

fn get_bool(
    ini: &Ini,
    section: &'static str,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(ini, section, key) {
        None | Some("") => Ok(default),
        Some(v) => parse_bool(v).ok_or_else(|| ConfigError::InvalidBool {
            section,
            key,
            value: v.to_string(),
        }),
    }
}

/// `modN` keys in numeric order; blank values dropped; result sorted.
fn exclusions(ini: &Ini) -> Vec<String> {
    let mut numbered: Vec<(u32, String)> = ini
        .section(Some(SECTION_EXCLUSION))
        .map(|props| {
            props
                .iter()
                .filter_map(|(k, v)| {
                    let k = k.trim().to_ascii_lowercase();
                    let n: u32 = k.strip_prefix("mod")?.parse().ok()?;
                    let v = v.trim();
                    (!v.is_empty()).then(|| (n, v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    numbered.sort_by_key(|(n, _)| *n);
    let mut out: Vec<String> = numbered.into_iter().map(|(_, v)| v).collect();
    out.sort();
    out.dedup();
    out
}

impl Config {
    /// Parse INI text. `path` is only used for error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let opt = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(&sanitize(text), opt).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let defaults = Config::default();
        Ok(Config {
            created_by_version: get(&ini, SECTION_UPDATER, "ver")
                .filter(|s| !s.is_empty())
                .map(String::from),
            force_update: get_bool(&ini, SECTION_UPDATER, "force_update", defaults.force_update)?,
            disable_mod_dev: get_bool(
                &ini,
                SECTION_UPDATER,
                "disable_mod_dev",
                defaults.disable_mod_dev,
            )?,
            mods_path: get(&ini, SECTION_PATH, "path")
                .filter(|s| !s.is_empty() && *s != "None")
                .map(PathBuf::from),
            language: get(&ini, SECTION_LANGUAGE, "language")
                .filter(|s| !s.is_empty())
                .map(String::from)
                .unwrap_or(defaults.language),
            game_version_limit: get(&ini, SECTION_GAME_VERSION, "version")
                .filter(|s| !s.is_empty())
                .map(String::from)
                .unwrap_or(defaults.game_version_limit),
            exclusions: exclusions(&ini),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text, path)
    }

    /// True when a game version limit other than the "no limit" sentinel is set.
    pub fn has_game_version_limit(&self) -> bool {
        self.game_version_limit.trim() != NO_GAME_VERSION_LIMIT
    }

    /// INI text with a comment above each option.
    pub fn render(&self) -> String {
        let version = self
            .created_by_version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
        let path = self
            .mods_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let mut lines = vec![
            format!("[{}]", SECTION_UPDATER),
            "# Version of the updater that created this file".to_string(),
            format!("ver = {}", version),
            "# Download the latest version of ALL mods, even when already up to date (true/false, default false)".to_string(),
            format!("force_update = {}", self.force_update),
            "# Skip updates to mod versions in development or pre-release (true/false, default false)".to_string(),
            format!("disable_mod_dev = {}", self.disable_mod_dev),
            String::new(),
            format!("[{}]", SECTION_PATH),
            format!("path = {}", path),
            String::new(),
            format!("[{}]", SECTION_LANGUAGE),
            "# Language file name without extension, e.g. en_US or fr_FR".to_string(),
            format!("language = {}", self.language),
            String::new(),
            format!("[{}]", SECTION_GAME_VERSION),
            "# Only install mod releases made for this game version or older. 100.0.0 means no limit".to_string(),
            format!("version = {}", self.game_version_limit),
            String::new(),
            format!("[{}]", SECTION_EXCLUSION),
            "# File names of mods (with extension) that must never be updated, one per modN key".to_string(),
        ];
        let slots = self.exclusions.len().max(EMPTY_EXCLUSION_SLOTS);
        for i in 0..slots {
            let value = self.exclusions.get(i).map(String::as_str).unwrap_or("");
            lines.push(format!("mod{} = {}", i + 1, value));
        }
        let mut text: String = lines
            .iter()
            .map(|line| line.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        text.push('\n');
        text
    }

    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::CreateDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }
        std::fs::write(path, self.render()).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// True when `path` is missing or empty, i.e. this is a first launch.
pub fn needs_creation(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() == 0,
        Err(_) => true,
    }
}

/// Load the config, writing `seed` first when the file is missing or empty.
/// Returns the config and whether it was just created.
pub fn load_or_create(path: &Path, seed: &Config) -> Result<(Config, bool), ConfigError> {
    let created = needs_creation(path);
    if created {
        seed.write(path)?;
    }
    Ok((Config::load(path)?, created))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Config {
        Config::parse(s, Path::new("config.ini")).unwrap()
    }

    #[test]
    fn parse_empty_config_gives_defaults() {
        let c = parse("");
        assert!(!c.force_update);
        assert!(!c.disable_mod_dev);
        assert!(c.mods_path.is_none());
        assert_eq!(c.language, "en_US");
        assert_eq!(c.game_version_limit, "100.0.0");
        assert!(c.exclusions.is_empty());
        assert!(!c.has_game_version_limit());
        assert!(c.created_by_version.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
[ModsUpdater]
# Info about the creation of the config.ini file
ver = 1.3.0
force_update = True
disable_mod_dev = yes

[ModPath]
path = C:\Users\me\AppData\Roaming\VintagestoryData\Mods

[Language]
Langue
language = fr_FR

[Game_Version_max]
version = 1.19.8

[Mod_Exclusion]
mod1 = zeta.zip
mod2 =
mod10 = alpha.zip
mod3 = beta.cs
"#;
        let c = parse(s);
        assert_eq!(c.created_by_version.as_deref(), Some("1.3.0"));
        assert!(c.force_update);
        assert!(c.disable_mod_dev);
        assert_eq!(
            c.mods_path.as_deref(),
            Some(Path::new(r"C:\Users\me\AppData\Roaming\VintagestoryData\Mods"))
        );
        assert_eq!(c.language, "fr_FR");
        assert_eq!(c.game_version_limit, "1.19.8");
        assert!(c.has_game_version_limit());
        assert_eq!(c.exclusions, ["alpha.zip", "beta.cs", "zeta.zip"]);
    }

    #[test]
    fn parse_bom_prefixed_file() {
        let c = parse("\u{feff}[Language]\nlanguage = de_DE\n");
        assert_eq!(c.language, "de_DE");
    }

    #[test]
    fn invalid_bool_errors() {
        let err = Config::parse("[ModsUpdater]\nforce_update = maybe\n", Path::new("c.ini"));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidBool {
                key: "force_update",
                ..
            })
        ));
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn render_then_parse_keeps_values() {
        let config = Config {
            created_by_version: Some("2.0.0".to_string()),
            force_update: true,
            disable_mod_dev: false,
            mods_path: Some(PathBuf::from("/home/me/.config/VintagestoryData/Mods")),
            language: "es_ES".to_string(),
            game_version_limit: "1.20.0".to_string(),
            exclusions: vec!["a.zip".to_string(), "b.zip".to_string()],
        };
        let text = config.render();
        assert!(text.contains("# Download the latest version of ALL mods"));
        assert!(text.contains("mod1 = a.zip"));
        assert!(text.contains("mod10 =\n"));
        assert_eq!(parse(&text), config);
    }

    #[test]
    fn load_or_create_writes_seed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.ini");
        let seed = Config {
            language: "it_IT".to_string(),
            ..Config::default()
        };
        let (config, created) = load_or_create(&path, &seed).unwrap();
        assert!(created);
        assert_eq!(config.language, "it_IT");

        let (_, created_again) = load_or_create(&path, &Config::default()).unwrap();
        assert!(!created_again);
    }

    #[test]
    fn empty_file_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "").unwrap();
        assert!(needs_creation(&path));
        std::fs::write(&path, "[Language]\nlanguage = en_US\n").unwrap();
        assert!(!needs_creation(&path));
    }
}
