//! User-facing strings. English is built in and the other offered languages are bundled from
//! `lang/<code>.json`. A file of the same name in a language directory (flat JSON object of
//! strings) overrides individual keys. Unknown keys fall back to English.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// (region, language code, display name) offered on first launch. File name is `<code>_<region>`.
pub const SUPPORTED_LANGUAGES: &[(&str, &str, &str)] = &[
    ("DE", "de", "Deutsch"),
    ("US", "en", "English"),
    ("ES", "es", "Español"),
    ("FR", "fr", "Français"),
    ("IT", "it", "Italiano"),
    ("BR", "pt", "Português"),
    ("RU", "ru", "Русский"),
    ("UA", "uk", "Українська"),
];

const ENGLISH: &[(&str, &str)] = &[
    ("title", "Vintage Story Mods Updater"),
    ("game_version_limit", "Mods updated for game version"),
    ("latest", "latest"),
    ("local_version", "local version"),
    ("online_version", "latest version online"),
    ("download_size", "Download size"),
    ("megabytes", "MB"),
    ("downloading", "is being downloaded"),
    ("would_update", "update available (dry run, not downloaded)"),
    ("summary_many", "Mods updated"),
    ("summary_many_detail", "The following mods have been updated"),
    ("summary_one", "One mod updated"),
    ("summary_one_detail", "The following mod has been updated"),
    ("summary_none", "No mod update available."),
    ("summary_pending", "Updates available (dry run)"),
    ("summary_excluded_one", "Mod excluded from the update"),
    ("summary_excluded_many", "Mods excluded from the update"),
    ("summary_skipped", "Mods not updated"),
    ("summary_failed", "Mods that could not be checked"),
    ("up_to_date", "up to date"),
    ("last_update", "Last update"),
    ("changelog", "Changelog"),
    ("no_mods", "No mods found in the mods folder"),
    ("first_launch_title", "First launch: creating the configuration file"),
    ("first_launch_lang_choice", "Choose your language"),
    ("first_launch_config_done", "Configuration file created"),
    ("first_launch_language", "Language"),
    ("first_launch_mods_path", "Mods folder"),
    ("first_launch_game_version", "Game version limit"),
    ("first_launch_edit_hint", "You can edit config.ini to exclude mods from updates."),
    ("first_launch_continue", "Update your mods now?"),
    ("make_pdf", "Create a PDF catalog of your mods?"),
    ("make_pdf_title", "Creating the PDF catalog"),
    ("adding_mods", "Adding mods"),
    ("pdf_title", "Vintage Story Mods"),
    ("pdf_done", "PDF catalog written to"),
    ("summary_log_written", "Summary appended to"),
    ("exit_prompt", "Press Enter to exit"),
    ("end_of_program", "Done."),
];

/// Translations compiled into the binary, keyed by file code.
const BUNDLED: &[(&str, &str)] = &[
    ("de_DE", include_str!("../lang/de_DE.json")),
    ("es_ES", include_str!("../lang/es_ES.json")),
    ("fr_FR", include_str!("../lang/fr_FR.json")),
    ("it_IT", include_str!("../lang/it_IT.json")),
    ("pt_BR", include_str!("../lang/pt_BR.json")),
    ("ru_RU", include_str!("../lang/ru_RU.json")),
    ("uk_UA", include_str!("../lang/uk_UA.json")),
];

/// Message catalog for one language.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    overrides: HashMap<String, String>,
}

impl Messages {
    /// Bundled translation for `code`, then `<dir>/<code>.json` from the first directory that
    /// has a valid one, key by key. English for whatever neither provides.
    pub fn load(code: &str, dirs: &[PathBuf]) -> Self {
        let mut overrides = bundled(code);
        for dir in dirs {
            let path = dir.join(format!("{}.json", code));
            if !path.is_file() {
                continue;
            }
            match read_overrides(&path) {
                Ok(file) => {
                    debug!(file = %path.display(), "loaded language file");
                    overrides.extend(file);
                    break;
                }
                Err(reason) => {
                    warn!(file = %path.display(), %reason, "ignoring language file");
                }
            }
        }
        if overrides.is_empty() && code != crate::config::DEFAULT_LANGUAGE {
            debug!(language = code, "no translation found, using English");
        }
        Self { overrides }
    }

    /// Translated message, the English default, or the key itself when unknown.
    pub fn get<'a>(&'a self, key: &'a str) -> &'a str {
        if let Some(s) = self.overrides.get(key) {
            return s;
        }
        ENGLISH
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .unwrap_or(key)
    }
}

fn bundled(code: &str) -> HashMap<String, String> {
    let Some((_, text)) = BUNDLED.iter().find(|(c, _)| *c == code) else {
        return HashMap::new();
    };
    parse_overrides(text).unwrap_or_else(|reason| {
        warn!(language = code, %reason, "bundled translation is invalid");
        HashMap::new()
    })
}

fn read_overrides(path: &Path) -> Result<HashMap<String, String>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    parse_overrides(&text)
}

/// String values of a flat JSON object. Non-string values are ignored.
fn parse_overrides(text: &str) -> Result<HashMap<String, String>, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let map = value
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;
    Ok(map
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect())
}

/// `fr_FR` style file code for a supported language entry.
pub fn language_code(region: &str, lang: &str) -> String {
    format!("{}_{}", lang, region)
}

/// Display name for a language code such as `fr_FR`, when it is one of the supported ones.
pub fn language_name(code: &str) -> Option<&'static str> {
    let (lang, region) = code.split_once('_')?;
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(r, l, _)| *r == region && *l == lang)
        .map(|(_, _, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_defaults_and_unknown_key() {
        let m = Messages::default();
        assert_eq!(m.get("summary_none"), "No mod update available.");
        assert_eq!(m.get("no_such_key"), "no_such_key");
        let m = Messages::load("en_US", &[]);
        assert_eq!(m.get("latest"), "latest");
    }

    #[test]
    fn every_offered_language_is_translated() {
        for (region, lang, name) in SUPPORTED_LANGUAGES {
            let code = language_code(region, lang);
            if code == crate::config::DEFAULT_LANGUAGE {
                continue;
            }
            let table = bundled(&code);
            for (key, _) in ENGLISH {
                assert!(table.contains_key(*key), "{} ({}) lacks {}", name, code, key);
            }
        }
    }

    #[test]
    fn bundled_translation_without_files() {
        let m = Messages::load("fr_FR", &[]);
        assert_eq!(m.get("summary_none"), "Aucune mise à jour de mod disponible.");
        assert_eq!(m.get("no_such_key"), "no_such_key");
    }

    #[test]
    fn file_overrides_fall_back_per_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("fr_FR.json"),
            "\u{feff}{\"summary_none\": \"Rien à faire.\", \"count\": 3}",
        )
        .unwrap();
        let m = Messages::load("fr_FR", &[dir.path().to_path_buf()]);
        assert_eq!(m.get("summary_none"), "Rien à faire.");
        assert_eq!(m.get("latest"), "dernière");
        assert_eq!(m.get("count"), "count");
    }

    #[test]
    fn unbundled_language_file_over_english() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nl_NL.json"), r#"{"latest": "nieuwste"}"#).unwrap();
        let m = Messages::load("nl_NL", &[dir.path().to_path_buf()]);
        assert_eq!(m.get("latest"), "nieuwste");
        assert_eq!(m.get("changelog"), "Changelog");
    }

    #[test]
    fn load_reads_first_matching_dir() {
        let empty = tempfile::tempdir().unwrap();
        let full = tempfile::tempdir().unwrap();
        std::fs::write(full.path().join("de_DE.json"), r#"{"latest": "allerneueste"}"#).unwrap();
        let m = Messages::load(
            "de_DE",
            &[empty.path().to_path_buf(), full.path().to_path_buf()],
        );
        assert_eq!(m.get("latest"), "allerneueste");
    }

    #[test]
    fn load_ignores_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("es_ES.json"), "[1, 2]").unwrap();
        let m = Messages::load("es_ES", &[dir.path().to_path_buf()]);
        assert_eq!(m.get("latest"), "última");
    }

    #[test]
    fn language_names() {
        assert_eq!(language_name("fr_FR"), Some("Français"));
        assert_eq!(language_name("pt_BR"), Some("Português"));
        assert_eq!(language_name("xx_YY"), None);
        assert_eq!(language_code("US", "en"), "en_US");
    }
}
