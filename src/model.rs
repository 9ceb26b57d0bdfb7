//! Canonical data model shared by the mod reader, the updater, the summary and the PDF catalog.

use std::path::PathBuf;

/// How a mod is packaged in the mods folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModKind {
    /// Zip archive with a `modinfo.json` at its root.
    Zip,
    /// Single C# source file loaded by the game at startup.
    Source,
}

/// Metadata of one installed mod, as read from its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInfo {
    pub name: String,
    /// Repository identifier. Falls back to the lowercased name without whitespace.
    pub modid: String,
    /// Version string exactly as declared by the mod.
    pub version: String,
    pub description: Option<String>,
    pub path: PathBuf,
    pub kind: ModKind,
}

/// Latest changelog entry scraped from the mod's page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changelog {
    /// Version heading of the entry (e.g. `v1.4.2`), when the page has one.
    pub version: Option<String>,
    pub lines: Vec<String>,
    pub url: String,
}

/// A mod that was replaced by a newer file during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedMod {
    pub name: String,
    pub modid: String,
    pub old_version: String,
    pub new_version: String,
    /// Path of the downloaded file.
    pub file: PathBuf,
    pub size_bytes: u64,
    pub changelog: Option<Changelog>,
}

/// What happened to one mod during an update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModOutcome {
    UpToDate {
        online: String,
    },
    Updated(UpdatedMod),
    /// Dry run: a newer release exists but nothing was downloaded.
    UpdateAvailable {
        online: String,
        download_url: String,
    },
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

/// One checked mod and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModResult {
    pub file: PathBuf,
    /// Mod name, or the file name when the metadata could not be read.
    pub name: String,
    pub local_version: Option<String>,
    pub outcome: ModOutcome,
}

/// A mod left out of the run by the exclusion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedMod {
    pub file: PathBuf,
    pub name: String,
    pub version: Option<String>,
}

/// Everything an update run produced, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub results: Vec<ModResult>,
    pub excluded: Vec<ExcludedMod>,
}

impl UpdateReport {
    pub fn updated(&self) -> impl Iterator<Item = &UpdatedMod> {
        self.results.iter().filter_map(|r| match &r.outcome {
            ModOutcome::Updated(u) => Some(u),
            _ => None,
        })
    }

    pub fn updated_count(&self) -> usize {
        self.updated().count()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ModResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ModOutcome::UpdateAvailable { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ModResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ModOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ModResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ModOutcome::Failed { .. }))
    }

    pub fn up_to_date_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ModOutcome::UpToDate { .. }))
            .count()
    }
}
