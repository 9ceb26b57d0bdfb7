//! Console output for an update run and the `updates.log` summary file.

use crate::i18n::Messages;
use crate::model::{ModOutcome, ModResult, UpdateReport, UpdatedMod};
use chrono::NaiveDateTime;
use colored::Colorize;
use std::io::Write as _;
use std::path::{Path, PathBuf};

const SUMMARY_LOG_NAME: &str = "updates.log";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn summary_log_path(app_dir: &Path) -> PathBuf {
    app_dir.join(SUMMARY_LOG_NAME)
}

/// `v1.2.0` for `1.2.0`; versions already starting with `v` are left alone.
fn with_v(version: &str) -> String {
    if version.starts_with(['v', 'V']) {
        version.to_string()
    } else {
        format!("v{}", version)
    }
}

/// Applies a style only when output is styled.
struct Painter {
    styled: bool,
}

impl Painter {
    fn paint(&self, text: &str, style: fn(&str) -> colored::ColoredString) -> String {
        if self.styled {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Title lines: tool name and the game version mods are updated for.
pub fn render_banner(
    messages: &Messages,
    game_version_limit: &str,
    unlimited: bool,
    styled: bool,
) -> String {
    let p = Painter { styled };
    let limit = if unlimited {
        messages.get("latest").to_string()
    } else {
        game_version_limit.to_string()
    };
    format!(
        "\n{}\n{}\n",
        p.paint(
            &format!("{} - v.{}", messages.get("title"), env!("CARGO_PKG_VERSION")),
            |s| s.cyan().bold()
        ),
        p.paint(
            &format!("{} : {}", messages.get("game_version_limit"), limit),
            |s| s.cyan()
        ),
    )
}

/// One line per checked mod, printed as the run progresses.
pub fn render_result_line(messages: &Messages, result: &ModResult, styled: bool) -> String {
    let p = Painter { styled };
    let local = result.local_version.as_deref().unwrap_or("?");
    let name = p.paint(&result.name, |s| s.bold());
    match &result.outcome {
        ModOutcome::UpToDate { online } => format!(
            "{}: {} {} / {} {} ({})",
            name,
            messages.get("local_version"),
            local,
            messages.get("online_version"),
            online,
            p.paint(messages.get("up_to_date"), |s| s.green())
        ),
        ModOutcome::Updated(u) => format!(
            "{}: {} {} / {} {} - {}: {:.2} {} {}",
            name,
            messages.get("local_version"),
            local,
            messages.get("online_version"),
            u.new_version,
            messages.get("download_size"),
            u.size_bytes as f64 / 1_048_576.0,
            messages.get("megabytes"),
            p.paint(messages.get("downloading"), |s| s.yellow())
        ),
        ModOutcome::UpdateAvailable { online, .. } => format!(
            "{}: {} {} / {} {} ({})",
            name,
            messages.get("local_version"),
            local,
            messages.get("online_version"),
            online,
            p.paint(messages.get("would_update"), |s| s.yellow())
        ),
        ModOutcome::Skipped { reason } => {
            format!("{}: {}", name, p.paint(reason, |s| s.dimmed()))
        }
        ModOutcome::Failed { reason } => format!("{}: {}", name, p.paint(reason, |s| s.red())),
    }
}

fn write_updated(out: &mut String, messages: &Messages, u: &UpdatedMod, p: &Painter) {
    let url = u
        .changelog
        .as_ref()
        .map(|c| format!(" ({})", c.url))
        .unwrap_or_default();
    out.push_str(&format!(
        " * {}: {} -> {}{}:\n",
        p.paint(&u.name, |s| s.green()),
        with_v(&u.old_version),
        with_v(&u.new_version),
        url
    ));
    if let Some(log) = &u.changelog {
        if log.version.is_some() || !log.lines.is_empty() {
            let heading = match &log.version {
                Some(v) => format!("{} {}:", messages.get("changelog"), v),
                None => format!("{}:", messages.get("changelog")),
            };
            out.push_str(&format!("\t{}\n", p.paint(&heading, |s| s.yellow().bold())));
            for line in &log.lines {
                let line = p.paint(&format!("- {}", line), |s| s.yellow());
                out.push_str(&format!("\t\t{}\n", line));
            }
        }
    }
}

/// End-of-run summary: updated mods with changelogs, then pending, skipped, failed and excluded.
pub fn render_summary(report: &UpdateReport, messages: &Messages, styled: bool) -> String {
    let p = Painter { styled };
    let mut out = String::new();

    let updated: Vec<&UpdatedMod> = report.updated().collect();
    let header = match updated.len() {
        0 => None,
        1 => Some(("summary_one", "summary_one_detail")),
        _ => Some(("summary_many", "summary_many_detail")),
    };
    match header {
        Some((title, detail)) => {
            let title = p.paint(messages.get(title), |s| s.yellow());
            out.push_str(&format!("  {}\n\n{}:\n\n", title, messages.get(detail)));
            for u in &updated {
                write_updated(&mut out, messages, u, &p);
            }
        }
        None if report.pending().next().is_none() => {
            let none = p.paint(messages.get("summary_none"), |s| s.yellow());
            out.push_str(&format!("  {}\n", none));
        }
        None => {}
    }

    let pending: Vec<&ModResult> = report.pending().collect();
    if !pending.is_empty() {
        out.push_str(&format!("\n {}:\n", messages.get("summary_pending")));
        for r in pending {
            if let ModOutcome::UpdateAvailable { online, .. } = &r.outcome {
                let local = with_v(r.local_version.as_deref().unwrap_or("?"));
                out.push_str(&format!(" - {}: {} -> {}\n", r.name, local, with_v(online)));
            }
        }
    }

    for (key, list) in [
        ("summary_skipped", report.skipped().collect::<Vec<_>>()),
        ("summary_failed", report.failed().collect::<Vec<_>>()),
    ] {
        if list.is_empty() {
            continue;
        }
        out.push_str(&format!("\n {}:\n", messages.get(key)));
        for r in list {
            let reason = match &r.outcome {
                ModOutcome::Skipped { reason } | ModOutcome::Failed { reason } => reason.as_str(),
                _ => "",
            };
            out.push_str(&format!(" - {}: {}\n", r.name, reason));
        }
    }

    if !report.excluded.is_empty() {
        let key = if report.excluded.len() == 1 {
            "summary_excluded_one"
        } else {
            "summary_excluded_many"
        };
        out.push_str(&format!("\n {}:\n", messages.get(key)));
        for ex in &report.excluded {
            let line = match &ex.version {
                Some(v) => format!(" - {} (v.{})", ex.name, v.trim_start_matches(['v', 'V'])),
                None => format!(" - {}", ex.name),
            };
            out.push_str(&format!("{}\n", p.paint(&line, |s| s.red())));
        }
    }
    out
}

/// Append the unstyled summary to the summary log under a dated header.
pub fn append_summary_log(
    path: &Path,
    report: &UpdateReport,
    messages: &Messages,
    now: NaiveDateTime,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(
        file,
        "Mods Vintage Story - {} : {}",
        messages.get("last_update"),
        now.format(TIMESTAMP_FORMAT)
    )?;
    writeln!(file)?;
    file.write_all(render_summary(report, messages, false).as_bytes())?;
    writeln!(file)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Changelog, ExcludedMod};
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap()
    }

    fn updated(name: &str, changelog: Option<Changelog>) -> ModResult {
        ModResult {
            file: PathBuf::from(format!("{}.zip", name)),
            name: name.to_string(),
            local_version: Some("1.0.0".to_string()),
            outcome: ModOutcome::Updated(UpdatedMod {
                name: name.to_string(),
                modid: name.to_lowercase(),
                old_version: "1.0.0".to_string(),
                new_version: "v1.1.0".to_string(),
                file: PathBuf::from(format!("{}_1.1.0.zip", name)),
                size_bytes: 2_097_152,
                changelog,
            }),
        }
    }

    fn sample_report() -> UpdateReport {
        UpdateReport {
            results: vec![
                updated(
                    "Alpha",
                    Some(Changelog {
                        version: Some("v1.1.0".to_string()),
                        lines: vec!["Fixed crash".to_string()],
                        url: "https://mods.vintagestory.at/show/mod/7#tab-files".to_string(),
                    }),
                ),
                updated("Beta", None),
                ModResult {
                    file: PathBuf::from("gamma.zip"),
                    name: "Gamma".to_string(),
                    local_version: Some("2.0".to_string()),
                    outcome: ModOutcome::Failed {
                        reason: "gamma: Mod 'gamma' not found in the mod database.".to_string(),
                    },
                },
            ],
            excluded: vec![ExcludedMod {
                file: PathBuf::from("delta.zip"),
                name: "Delta".to_string(),
                version: Some("3.1.0".to_string()),
            }],
        }
    }

    #[test]
    fn summary_lists_updates_changelog_failures_and_exclusions() {
        let text = render_summary(&sample_report(), &Messages::default(), false);
        assert!(text.starts_with("  Mods updated\n\nThe following mods have been updated:\n\n * Alpha"));
        assert!(!text.contains("Last update"));
        assert!(text.contains(
            " * Alpha: v1.0.0 -> v1.1.0 (https://mods.vintagestory.at/show/mod/7#tab-files):\n"
        ));
        assert!(text.contains("\tChangelog v1.1.0:\n\t\t- Fixed crash\n"));
        assert!(text.contains(" * Beta: v1.0.0 -> v1.1.0:\n"));
        assert!(text.contains("Mods that could not be checked:\n - Gamma: gamma: Mod"));
        assert!(text.contains("Mod excluded from the update:\n - Delta (v.3.1.0)\n"));
    }

    #[test]
    fn summary_without_updates() {
        let report = UpdateReport::default();
        let text = render_summary(&report, &Messages::default(), false);
        assert_eq!(text, "  No mod update available.\n");
    }

    #[test]
    fn dry_run_summary_lists_pending_without_no_update_line() {
        let report = UpdateReport {
            results: vec![ModResult {
                file: PathBuf::from("a.zip"),
                name: "Alpha".to_string(),
                local_version: Some("1.0.0".to_string()),
                outcome: ModOutcome::UpdateAvailable {
                    online: "1.1.0".to_string(),
                    download_url: "https://mods.example/files/a.zip".to_string(),
                },
            }],
            excluded: vec![],
        };
        let text = render_summary(&report, &Messages::default(), false);
        assert!(!text.contains("No mod update available."));
        assert_eq!(
            text,
            "\n Updates available (dry run):\n - Alpha: v1.0.0 -> v1.1.0\n"
        );
    }

    #[test]
    fn result_lines() {
        let m = Messages::default();
        let line = render_result_line(&m, &updated("Alpha", None), false);
        assert_eq!(
            line,
            "Alpha: local version 1.0.0 / latest version online v1.1.0 - Download size: 2.00 MB is being downloaded"
        );
        let up = ModResult {
            file: PathBuf::from("a.zip"),
            name: "A".to_string(),
            local_version: Some("1.0.0".to_string()),
            outcome: ModOutcome::UpToDate {
                online: "1.0.0".to_string(),
            },
        };
        assert!(render_result_line(&m, &up, false).ends_with("(up to date)"));
    }

    #[test]
    fn banner_shows_latest_when_unlimited() {
        let m = Messages::default();
        assert!(render_banner(&m, "100.0.0", true, false).contains("game version : latest"));
        assert!(render_banner(&m, "1.19.8", false, false).contains("game version : 1.19.8"));
    }

    #[test]
    fn summary_log_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = summary_log_path(dir.path());
        let m = Messages::default();
        append_summary_log(&path, &sample_report(), &m, now()).unwrap();
        append_summary_log(&path, &UpdateReport::default(), &m, now()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Mods Vintage Story - Last update : 2024-05-01 18:30:00\n\n"));
        assert_eq!(text.matches("Mods Vintage Story - Last update").count(), 2);
        assert!(text.ends_with("  No mod update available.\n\n"));
        assert!(!text.contains('\u{1b}'));
    }
}
