//! Compare installed mods with the mod database and download newer releases.

use crate::config::Config;
use crate::moddb::{self, ModDbError, ModRecord, ModRepository, Release};
use crate::model::{ExcludedMod, ModInfo, ModOutcome, ModResult, UpdateReport, UpdatedMod};
use crate::modinfo;
use crate::version::{self, ModVersion, VersionError};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("{modid}: {source}")]
    Repository { modid: String, source: ModDbError },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Could not move the installed file {path} aside: {source}")]
    SetAside {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Download the selected release even when it is the installed version.
    pub force_update: bool,
    /// Ignore pre-release versions.
    pub disable_mod_dev: bool,
    pub game_version_limit: ModVersion,
    /// Report available updates without downloading.
    pub dry_run: bool,
}

impl UpdateOptions {
    pub fn new(game_version_limit: ModVersion) -> Self {
        Self {
            force_update: false,
            disable_mod_dev: false,
            game_version_limit,
            dry_run: false,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, VersionError> {
        Ok(Self {
            force_update: config.force_update,
            disable_mod_dev: config.disable_mod_dev,
            ..Self::new(ModVersion::parse(&config.game_version_limit)?)
        })
    }
}

/// Newest release (API order) allowed by the pre-release filter and the game version limit.
/// The error is a human-readable reason when none qualifies.
pub fn select_release<'a>(
    releases: &'a [Release],
    options: &UpdateOptions,
) -> Result<&'a Release, String> {
    if releases.is_empty() {
        return Err("no release published".to_string());
    }
    let mut too_new = 0;
    let mut prerelease = 0;
    for release in releases {
        let parsed = match ModVersion::parse(&release.modversion) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "ignoring release with unreadable version");
                continue;
            }
        };
        if options.disable_mod_dev && parsed.is_prerelease() {
            prerelease += 1;
            continue;
        }
        let required = version::min_game_version(&release.tags);
        if !version::within_game_limit(required.as_ref(), &options.game_version_limit) {
            too_new += 1;
            continue;
        }
        return Ok(release);
    }
    Err(match (too_new, prerelease) {
        (0, 0) => "no release with a readable version".to_string(),
        (0, _) => "only pre-release versions available".to_string(),
        _ => format!(
            "no release compatible with game version {}",
            options.game_version_limit
        ),
    })
}

fn repository_error(info: &ModInfo) -> impl FnOnce(ModDbError) -> UpdateError + '_ {
    move |source| UpdateError::Repository {
        modid: info.modid.clone(),
        source,
    }
}

/// `<file>.old` next to the installed file.
fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".old");
    path.with_file_name(name)
}

fn download_release<R: ModRepository + ?Sized>(
    repo: &R,
    info: &ModInfo,
    record: &ModRecord,
    release: &Release,
    url: &str,
) -> Result<UpdatedMod, UpdateError> {
    let file_name = moddb::download_file_name(release)
        .unwrap_or_else(|| format!("{}_{}.zip", info.modid, release.modversion));
    let dir = info.path.parent().unwrap_or_else(|| Path::new("."));
    let dest = dir.join(file_name);

    // The installed file stays under a backup name until the new one is in place.
    let backup = backup_path(&info.path);
    std::fs::rename(&info.path, &backup).map_err(|e| UpdateError::SetAside {
        path: info.path.clone(),
        source: e,
    })?;

    info!(modid = %info.modid, %url, file = %dest.display(), "downloading");
    let size_bytes = match repo.download(url, &dest) {
        Ok(n) => n,
        Err(e) => {
            if let Err(restore) = std::fs::rename(&backup, &info.path) {
                error!(
                    file = %backup.display(),
                    error = %restore,
                    "cannot restore the installed version"
                );
            }
            return Err(repository_error(info)(e));
        }
    };
    if let Err(e) = std::fs::remove_file(&backup) {
        warn!(file = %backup.display(), error = %e, "previous version left in the mods folder");
    }

    let changelog = match repo.fetch_changelog(record.assetid) {
        Ok(log) => Some(log),
        Err(e) => {
            warn!(modid = %info.modid, error = %e, "changelog unavailable");
            None
        }
    };

    Ok(UpdatedMod {
        name: info.name.clone(),
        modid: info.modid.clone(),
        old_version: info.version.clone(),
        new_version: release.modversion.clone(),
        file: dest,
        size_bytes,
        changelog,
    })
}

fn try_check_mod<R: ModRepository + ?Sized>(
    repo: &R,
    info: &ModInfo,
    options: &UpdateOptions,
) -> Result<ModOutcome, UpdateError> {
    let record = repo.fetch_mod(&info.modid).map_err(repository_error(info))?;
    let release = match select_release(&record.releases, options) {
        Ok(r) => r,
        Err(reason) => return Ok(ModOutcome::Skipped { reason }),
    };
    let online = release.modversion.clone();
    let order = version::compare_local_online(&info.version, &online)?;
    let wanted = order == Ordering::Less || (order == Ordering::Equal && options.force_update);
    debug!(modid = %info.modid, local = %info.version, %online, ?order, "compared");
    if !wanted {
        return Ok(ModOutcome::UpToDate { online });
    }

    let url = moddb::file_url(repo.base_url(), &release.mainfile);
    if options.dry_run {
        return Ok(ModOutcome::UpdateAvailable {
            online,
            download_url: url,
        });
    }
    download_release(repo, info, &record, release, &url).map(ModOutcome::Updated)
}

/// Check one mod. Every failure becomes a `Failed` outcome.
pub fn check_mod<R: ModRepository + ?Sized>(
    repo: &R,
    info: &ModInfo,
    options: &UpdateOptions,
) -> ModOutcome {
    try_check_mod(repo, info, options).unwrap_or_else(|e| ModOutcome::Failed {
        reason: e.to_string(),
    })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn excluded_entry(path: &Path) -> ExcludedMod {
    match modinfo::read_mod(path) {
        Ok(info) => ExcludedMod {
            file: path.to_path_buf(),
            name: info.name,
            version: Some(info.version),
        },
        Err(e) => {
            debug!(file = %path.display(), error = %e, "excluded mod unreadable");
            ExcludedMod {
                file: path.to_path_buf(),
                name: file_name_of(path),
                version: None,
            }
        }
    }
}

/// Progress callback: (1-based index, total, result of that mod).
pub type ProgressFn<'a> = &'a dyn Fn(usize, usize, &ModResult);

/// Check every mod file in case-insensitive name order. Mods are independent: a failure is
/// recorded for that mod and the run moves on.
pub fn run_updates<R: ModRepository + ?Sized>(
    repo: &R,
    files: &[PathBuf],
    excluded_files: &[PathBuf],
    options: &UpdateOptions,
    progress: Option<ProgressFn<'_>>,
) -> UpdateReport {
    let mut files: Vec<&PathBuf> = files.iter().collect();
    files.sort_by_key(|p| file_name_of(p).to_lowercase());

    let mut report = UpdateReport {
        results: Vec::with_capacity(files.len()),
        excluded: excluded_files.iter().map(|p| excluded_entry(p)).collect(),
    };

    let total = files.len();
    for (index, path) in files.into_iter().enumerate() {
        let result = match modinfo::read_mod(path) {
            Err(e) => {
                error!(file = %path.display(), error = %e, "cannot read mod");
                ModResult {
                    file: path.clone(),
                    name: file_name_of(path),
                    local_version: None,
                    outcome: ModOutcome::Failed {
                        reason: e.to_string(),
                    },
                }
            }
            Ok(info) => {
                let outcome = try_check_mod(repo, &info, options).unwrap_or_else(|e| {
                    error!(error = %e, "update check failed");
                    ModOutcome::Failed {
                        reason: e.to_string(),
                    }
                });
                ModResult {
                    file: info.path.clone(),
                    name: info.name,
                    local_version: Some(info.version),
                    outcome,
                }
            }
        };
        if let Some(cb) = progress {
            cb(index + 1, total, &result);
        }
        report.results.push(result);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Changelog;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs::File;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const BASE: &str = "https://mods.example";

    #[derive(Default)]
    struct FakeRepo {
        records: HashMap<String, ModRecord>,
        /// Mod ids answered with HTTP 500.
        failing: Vec<&'static str>,
        download_fails: bool,
        changelog_fails: bool,
        downloads: RefCell<Vec<String>>,
    }

    impl FakeRepo {
        fn with(mut self, modid: &str, releases: Vec<Release>) -> Self {
            self.records.insert(
                modid.to_string(),
                ModRecord {
                    assetid: 100 + self.records.len() as u64,
                    name: modid.to_string(),
                    urlalias: None,
                    releases,
                },
            );
            self
        }
    }

    impl ModRepository for FakeRepo {
        fn base_url(&self) -> &str {
            BASE
        }

        fn fetch_mod(&self, modid: &str) -> Result<ModRecord, ModDbError> {
            if self.failing.contains(&modid) {
                return Err(ModDbError::HttpStatus {
                    status: 500,
                    url: moddb::api_url(BASE, modid),
                });
            }
            self.records
                .get(modid)
                .cloned()
                .ok_or_else(|| ModDbError::NotFound {
                    modid: modid.to_string(),
                })
        }

        fn download(&self, url: &str, dest: &Path) -> Result<u64, ModDbError> {
            self.downloads.borrow_mut().push(url.to_string());
            if self.download_fails {
                return Err(ModDbError::HttpStatus {
                    status: 503,
                    url: url.to_string(),
                });
            }
            std::fs::write(dest, b"new").map_err(|e| ModDbError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;
            Ok(3)
        }

        fn fetch_changelog(&self, assetid: u64) -> Result<Changelog, ModDbError> {
            if self.changelog_fails {
                return Err(ModDbError::HttpStatus {
                    status: 404,
                    url: moddb::changelog_url(BASE, assetid),
                });
            }
            Ok(Changelog {
                version: Some("v9".to_string()),
                lines: vec!["Fixed things".to_string()],
                url: moddb::changelog_url(BASE, assetid),
            })
        }
    }

    fn release(version: &str, tags: &[&str]) -> Release {
        Release {
            mainfile: format!("files/{}.zip", version),
            filename: Some(format!("mod_{}.zip", version)),
            modversion: version.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn write_mod(dir: &Path, file: &str, modid: &str, version: &str) -> PathBuf {
        let path = dir.join(file);
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("modinfo.json", SimpleFileOptions::default())
            .unwrap();
        write!(
            zip,
            r#"{{"name": "Mod {id}", "modid": "{id}", "version": "{v}"}}"#,
            id = modid,
            v = version
        )
        .unwrap();
        zip.finish().unwrap();
        path
    }

    fn read_version(path: &Path) -> String {
        modinfo::read_mod(path).unwrap().version
    }

    fn options(limit: &str) -> UpdateOptions {
        UpdateOptions::new(ModVersion::parse(limit).unwrap())
    }

    #[test]
    fn select_release_applies_filters() {
        let releases = vec![
            release("2.0.0", &["v1.20.0"]),
            release("1.6.0-rc.1", &["v1.19.8"]),
            release("1.5.0", &["v1.19.8", "v1.19.7"]),
        ];
        let opts = options("1.19.8");
        assert_eq!(select_release(&releases, &opts).unwrap().modversion, "1.6.0-rc.1");
        let opts = UpdateOptions {
            disable_mod_dev: true,
            ..opts
        };
        assert_eq!(select_release(&releases, &opts).unwrap().modversion, "1.5.0");
        assert_eq!(
            select_release(&releases, &options("100.0.0")).unwrap().modversion,
            "2.0.0"
        );
    }

    #[test]
    fn select_release_reasons() {
        let opts = options("1.18.0");
        assert_eq!(select_release(&[], &opts).unwrap_err(), "no release published");
        let err = select_release(&[release("1.0.0", &["v1.19.0"])], &opts).unwrap_err();
        assert!(err.contains("1.18.0"));
        let opts = UpdateOptions {
            disable_mod_dev: true,
            ..options("100.0.0")
        };
        let err = select_release(&[release("1.0.0-dev.1", &[])], &opts).unwrap_err();
        assert_eq!(err, "only pre-release versions available");
    }

    #[test]
    fn newer_release_is_downloaded_and_old_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_mod(dir.path(), "mod_1.0.0.zip", "alpha", "1.0.0");
        let repo = FakeRepo::default().with("alpha", vec![release("1.1.0", &["v1.19.8"])]);

        let report = run_updates(&repo, &[old.clone()], &[], &options("100.0.0"), None);
        let updated: Vec<_> = report.updated().collect();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].old_version, "1.0.0");
        assert_eq!(updated[0].new_version, "1.1.0");
        assert_eq!(updated[0].file, dir.path().join("mod_1.1.0.zip"));
        assert_eq!(updated[0].changelog.as_ref().unwrap().lines, vec!["Fixed things"]);
        assert!(!old.exists());
        assert_eq!(
            repo.downloads.borrow().as_slice(),
            ["https://mods.example/files/1.1.0.zip"]
        );
    }

    #[test]
    fn same_version_is_up_to_date_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_mod(dir.path(), "mod_1.1.0.zip", "alpha", "1.1.0");
        let repo = FakeRepo {
            changelog_fails: true,
            ..FakeRepo::default()
        }
        .with("alpha", vec![release("1.1.0", &[])]);

        let report = run_updates(&repo, &[path.clone()], &[], &options("100.0.0"), None);
        assert_eq!(report.up_to_date_count(), 1);
        assert!(repo.downloads.borrow().is_empty());

        let forced = UpdateOptions {
            force_update: true,
            ..options("100.0.0")
        };
        let report = run_updates(&repo, &[path.clone()], &[], &forced, None);
        let updated: Vec<_> = report.updated().collect();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].changelog, None);
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn dry_run_reports_without_downloading() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_mod(dir.path(), "a.zip", "alpha", "0.9");
        let repo = FakeRepo::default().with("alpha", vec![release("1.0.0", &[])]);
        let opts = UpdateOptions {
            dry_run: true,
            ..options("100.0.0")
        };
        let report = run_updates(&repo, &[path.clone()], &[], &opts, None);
        assert_eq!(report.pending().count(), 1);
        assert!(path.exists());
        assert!(repo.downloads.borrow().is_empty());
    }

    #[test]
    fn failures_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("Broken.zip");
        std::fs::write(&broken, b"not a zip").unwrap();
        let unknown = write_mod(dir.path(), "unknown.zip", "ghost", "1.0.0");
        let good = write_mod(dir.path(), "alpha.zip", "alpha", "1.0.0");
        let skipped = write_mod(dir.path(), "Zeta.zip", "zeta", "1.0.0");
        let repo = FakeRepo::default()
            .with("alpha", vec![release("1.0.0", &[])])
            .with("zeta", vec![release("3.0.0", &["v1.21.0"])]);

        let seen = RefCell::new(Vec::new());
        let progress = |i: usize, total: usize, r: &ModResult| {
            seen.borrow_mut().push((i, total, r.name.clone()));
        };
        let report = run_updates(
            &repo,
            &[skipped, unknown, broken, good],
            &[],
            &options("1.20.0"),
            Some(&progress),
        );

        let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Mod alpha", "Broken.zip", "Mod ghost", "Mod zeta"]);
        assert_eq!(report.failed().count(), 2);
        assert_eq!(report.skipped().count(), 1);
        assert_eq!(report.up_to_date_count(), 1);
        assert_eq!(seen.borrow().len(), 4);
        assert_eq!(seen.borrow()[3], (4, 4, "Mod zeta".to_string()));
    }

    #[test]
    fn server_errors_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| write_mod(dir.path(), &format!("{}.zip", id), id, "1.0.0"))
            .collect();
        let repo = FakeRepo {
            failing: vec!["a", "b", "c"],
            ..FakeRepo::default()
        }
        .with("d", vec![release("2.0.0", &[])]);

        let report = run_updates(&repo, &files, &[], &options("100.0.0"), None);
        assert_eq!(report.results.len(), 4);
        assert_eq!(report.failed().count(), 3);
        let updated: Vec<_> = report.updated().collect();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].modid, "d");
        assert_eq!(repo.downloads.borrow().len(), 1);
        assert!(dir.path().join("mod_2.0.0.zip").exists());
        assert!(!dir.path().join("d.zip").exists());
    }

    #[test]
    fn installed_file_kept_when_it_cannot_be_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_mod(dir.path(), "a.zip", "alpha", "1.0.0");
        // A non-empty directory at the backup name makes the rename fail.
        let blocker = dir.path().join("a.zip.old");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();
        let repo = FakeRepo::default().with("alpha", vec![release("2.0.0", &[])]);

        let report = run_updates(&repo, &[old.clone()], &[], &options("100.0.0"), None);
        match &report.results[0].outcome {
            ModOutcome::Failed { reason } => assert!(reason.contains("aside"), "{}", reason),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(old.exists());
        assert!(!dir.path().join("mod_2.0.0.zip").exists());
        assert!(repo.downloads.borrow().is_empty());
    }

    #[test]
    fn failed_download_restores_installed_file() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_mod(dir.path(), "a.zip", "alpha", "1.0.0");
        let repo = FakeRepo {
            download_fails: true,
            ..FakeRepo::default()
        }
        .with("alpha", vec![release("2.0.0", &[])]);

        let report = run_updates(&repo, &[old.clone()], &[], &options("100.0.0"), None);
        assert_eq!(report.failed().count(), 1);
        assert!(old.exists());
        assert!(!dir.path().join("a.zip.old").exists());
        assert_eq!(read_version(&old), "1.0.0");
    }

    #[test]
    fn new_name_differing_only_in_case_keeps_download() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_mod(dir.path(), "MOD_2.0.0.zip", "alpha", "1.0.0");
        let repo = FakeRepo::default().with("alpha", vec![release("2.0.0", &[])]);

        let report = run_updates(&repo, &[old], &[], &options("100.0.0"), None);
        assert_eq!(report.updated_count(), 1);
        let new = dir.path().join("mod_2.0.0.zip");
        assert_eq!(std::fs::read(&new).unwrap(), b"new");
        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, [new.file_name().unwrap().to_os_string()]);
    }

    #[test]
    fn excluded_mods_are_listed_with_versions() {
        let dir = tempfile::tempdir().unwrap();
        let excluded = write_mod(dir.path(), "keep.zip", "keep", "2.3.4");
        let odd = dir.path().join("odd.zip");
        std::fs::write(&odd, b"junk").unwrap();
        let repo = FakeRepo::default();
        let report = run_updates(&repo, &[], &[excluded, odd], &options("100.0.0"), None);
        assert!(report.results.is_empty());
        assert_eq!(report.excluded[0].name, "Mod keep");
        assert_eq!(report.excluded[0].version.as_deref(), Some("2.3.4"));
        assert_eq!(report.excluded[1].name, "odd.zip");
        assert_eq!(report.excluded[1].version, None);
    }

    #[test]
    fn options_from_config() {
        let config = Config {
            force_update: true,
            game_version_limit: "1.19".to_string(),
            ..Config::default()
        };
        let opts = UpdateOptions::from_config(&config).unwrap();
        assert!(opts.force_update);
        assert_eq!(opts.game_version_limit.to_string(), "1.19.0");
        let bad = Config {
            game_version_limit: "abc".to_string(),
            ..Config::default()
        };
        assert!(UpdateOptions::from_config(&bad).is_err());
    }
    #[test]
    fn end_to_end_against_mock_database() {
        use crate::moddb::ModDbClient;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        let api = r#"{"statuscode": "200", "mod": {"assetid": 42, "name": "Mod alpha",
            "urlalias": "alpha", "releases": [{"mainfile": "files/alpha_1.1.0.zip",
            "filename": "alpha_1.1.0.zip", "modversion": "1.1.0", "tags": ["v1.19.8"]}]}}"#;
        let changelog = r#"<div class="changelogtext"><strong>v1.1.0</strong>
            <ul><li>Fixed crash on load</li></ul></div>"#;
        rt.block_on(async {
            Mock::given(method("GET"))
                .and(path("/api/mod/alpha"))
                .respond_with(ResponseTemplate::new(200).set_body_string(api))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/api/mod/beta"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/files/alpha_1.1.0.zip"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new archive".to_vec()))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/show/mod/42"))
                .respond_with(ResponseTemplate::new(200).set_body_string(changelog))
                .mount(&server)
                .await;
        });

        let dir = tempfile::tempdir().unwrap();
        let alpha = write_mod(dir.path(), "alpha_1.0.0.zip", "alpha", "1.0.0");
        let beta = write_mod(dir.path(), "beta.zip", "beta", "2.0.0");
        let client = ModDbClient::builder()
            .base_url(server.uri())
            .retry_count(1)
            .timeout_secs(5)
            .build()
            .unwrap();

        let report = run_updates(&client, &[beta, alpha.clone()], &[], &options("1.20.0"), None);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].name, "Mod alpha");
        let updated: Vec<_> = report.updated().collect();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].new_version, "1.1.0");
        assert_eq!(updated[0].size_bytes, 11);
        let log = updated[0].changelog.as_ref().unwrap();
        assert_eq!(log.lines, vec!["Fixed crash on load"]);
        assert!(!alpha.exists());
        assert_eq!(
            std::fs::read(dir.path().join("alpha_1.1.0.zip")).unwrap(),
            b"new archive"
        );
        assert!(matches!(
            report.results[1].outcome,
            ModOutcome::Failed { .. }
        ));
    }
}
