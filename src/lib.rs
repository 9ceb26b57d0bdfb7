//! modsupdater: CLI updater for installed Vintage Story mods, with update log and PDF catalog.

pub mod cli;
pub mod config;
pub mod i18n;
pub mod logging;
pub mod model;
pub mod moddb;
pub mod modinfo;
pub mod paths;
pub mod pdf;
pub mod report;
pub mod updater;
pub mod version;

// Re-exports for CLI and consumers.
pub use config::{Config, ConfigError};
pub use moddb::{ModDbClient, ModDbClientBuilder, ModDbError, ModRepository};
pub use model::{ModInfo, ModOutcome, ModResult, UpdateReport};
pub use pdf::{build_entries, write_catalog, CatalogEntry, PdfError};
pub use updater::{run_updates, UpdateError, UpdateOptions};
pub use version::ModVersion;
