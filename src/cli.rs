//! CLI parsing and orchestration. Loads config, checks every mod against the mod database,
//! prints the summary, optionally writes the PDF catalog. Maps errors to exit codes.

use crate::config::{self, Config, ConfigError};
use crate::i18n::{self, Messages, SUPPORTED_LANGUAGES};
use crate::logging::{self, LogConfig};
use crate::model::ModResult;
use crate::moddb::{ModDbClient, ModRepository};
use crate::modinfo::{self, ModInfoError};
use crate::paths;
use crate::pdf::{self, PdfError};
use crate::report;
use crate::updater::{self, UpdateOptions};
use clap::Parser;
use std::cell::RefCell;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    ModInfo(#[from] ModInfoError),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("{0}")]
    Pdf(#[from] PdfError),

    #[error("{0}")]
    Output(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Config(_) | CliRunError::ModInfo(_) => 1,
            CliRunError::Client(_) => 2,
            CliRunError::Pdf(_) | CliRunError::Output(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "modsupdater", version)]
#[command(about = "Check installed Vintage Story mods for updates and download them")]
#[command(
    after_help = "Settings are read from config.ini in the VS_ModsUpdater folder of your user config directory (created on first launch). CLI flags override config."
)]
pub struct Args {
    /// Mods folder. Default: [ModPath] in config.ini, then the game's default folder.
    #[arg(long)]
    pub modspath: Option<PathBuf>,

    /// Config file to use instead of the default config.ini.
    #[arg(long)]
    pub configfile: Option<PathBuf>,

    /// Language code, e.g. en_US or fr_FR (overrides config).
    #[arg(long)]
    pub language: Option<String>,

    /// Never wait for input: no questions, no pause before exiting.
    #[arg(long, value_parser = parse_bool_arg, num_args = 0..=1, default_missing_value = "true")]
    pub nopause: Option<bool>,

    /// Mod file names to leave untouched during this run (added to config.ini on first launch).
    #[arg(long, num_args = 1..)]
    pub exclusion: Vec<String>,

    /// Download the latest release of every mod even when up to date (overrides config).
    #[arg(long, value_parser = parse_bool_arg, num_args = 0..=1, default_missing_value = "true")]
    pub forceupdate: Option<bool>,

    /// Write the PDF catalog of installed mods without asking.
    #[arg(long, value_parser = parse_bool_arg, num_args = 0..=1, default_missing_value = "true")]
    pub makepdf: Option<bool>,

    /// Ignore pre-release mod versions (overrides config).
    #[arg(
        long = "disable-mod-dev",
        alias = "disable_mod_dev",
        value_parser = parse_bool_arg,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub disable_mod_dev: Option<bool>,

    /// Request timeout in seconds (default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// HTTP User-Agent.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Check for updates and report them without downloading anything.
    #[arg(long)]
    pub dry_run: bool,

    /// PDF catalog path. Default: VS_Mods_YYYY_MM_DD.pdf in the VS_ModsUpdater folder.
    #[arg(long)]
    pub pdf_path: Option<PathBuf>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain and debug logs.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_bool_arg(s: &str) -> Result<bool, String> {
    config::parse_bool(s)
        .ok_or_else(|| format!("Invalid boolean value: '{}'. Use true or false.", s))
}

/// Config exclusions plus the ones given on the command line, sorted, no duplicates.
fn merged_exclusions(from_config: &[String], from_cli: &[String]) -> Vec<String> {
    let mut all: Vec<String> = from_config
        .iter()
        .chain(from_cli)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    all.sort();
    all.dedup();
    all
}

/// Update options: CLI flags over config values.
fn update_options(args: &Args, config: &Config) -> Result<UpdateOptions, CliRunError> {
    let mut options = UpdateOptions::from_config(config).map_err(|e| {
        CliRunError::InvalidInput(format!(
            "Invalid game version limit in config ([Game_Version_max] version): {}",
            e
        ))
    })?;
    if let Some(force) = args.forceupdate {
        options.force_update = force;
    }
    if let Some(disable) = args.disable_mod_dev {
        options.disable_mod_dev = disable;
    }
    options.dry_run = args.dry_run;
    Ok(options)
}

fn build_client(args: &Args) -> Result<ModDbClient, CliRunError> {
    let mut builder = ModDbClient::builder().show_progress(!args.quiet);
    if let Some(secs) = args.timeout {
        builder = builder.timeout_secs(secs);
    }
    if let Some(ua) = &args.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    Ok(builder.build()?)
}

fn pdf_output_path(args: &Args, app_dir: &Path, today: chrono::NaiveDate) -> PathBuf {
    args.pdf_path
        .clone()
        .unwrap_or_else(|| pdf::default_pdf_path(app_dir, today))
}

/// Questions asked during interactive runs.
trait Prompter {
    /// Language code picked on first launch. Cancelling keeps `default`.
    fn language(&self, prompt: &str, default: &str) -> String;

    /// Yes/no question; a cancelled prompt counts as no.
    fn confirm(&self, prompt: &str, default: bool) -> bool;

    /// Wait before the console window closes.
    fn pause(&self, message: &str);
}

struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn language(&self, prompt: &str, default: &str) -> String {
        let options: Vec<&str> = SUPPORTED_LANGUAGES.iter().map(|(_, _, name)| *name).collect();
        let start = SUPPORTED_LANGUAGES
            .iter()
            .position(|(region, lang, _)| i18n::language_code(region, lang) == default)
            .unwrap_or(0);
        match inquire::Select::new(prompt, options)
            .with_starting_cursor(start)
            .prompt()
        {
            Ok(choice) => SUPPORTED_LANGUAGES
                .iter()
                .find(|(_, _, name)| *name == choice)
                .map(|(region, lang, _)| i18n::language_code(region, lang))
                .unwrap_or_else(|| default.to_string()),
            Err(e) => {
                warn!(error = %e, "no language chosen");
                default.to_string()
            }
        }
    }

    fn confirm(&self, prompt: &str, default: bool) -> bool {
        inquire::Confirm::new(prompt)
            .with_default(default)
            .prompt()
            .unwrap_or(false)
    }

    fn pause(&self, message: &str) {
        println!("\n{}", message);
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }
}

/// How the run talks to the user.
#[derive(Clone, Copy)]
struct Console<'a> {
    /// Questions and the final pause are allowed.
    interactive: bool,
    /// Colours in terminal output.
    styled: bool,
    prompter: &'a dyn Prompter,
}

fn print_first_launch(messages: &Messages, config: &Config, config_path: &Path) {
    let language = i18n::language_name(&config.language).unwrap_or(config.language.as_str());
    let mods_path = config
        .mods_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    let game_version = if config.has_game_version_limit() {
        config.game_version_limit.clone()
    } else {
        messages.get("latest").to_string()
    };
    println!(
        "\n{}: {}",
        messages.get("first_launch_config_done"),
        config_path.display()
    );
    println!("  {}: {}", messages.get("first_launch_language"), language);
    println!("  {}: {}", messages.get("first_launch_mods_path"), mods_path);
    println!(
        "  {}: {}",
        messages.get("first_launch_game_version"),
        game_version
    );
    println!("{}\n", messages.get("first_launch_edit_hint"));
}

fn make_catalog<R: ModRepository + ?Sized>(
    repo: &R,
    mods_dir: &Path,
    output: &Path,
    messages: &Messages,
    quiet: bool,
) -> Result<(), CliRunError> {
    // Excluded mods belong in the catalog too.
    let files = modinfo::list_mod_files(mods_dir)?;
    if !quiet {
        println!("\n{}", messages.get("make_pdf_title"));
    }

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: usize, total: usize| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar.set_message(messages.get("adding_mods").to_string());
            bar
        });
        pb.set_position(n as u64);
    };
    let progress: Option<&dyn Fn(usize, usize)> = if quiet { None } else { Some(&progress_cb) };

    let entries = pdf::build_entries(repo, &files, progress);
    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    pdf::write_catalog(&entries, output, messages.get("pdf_title"))?;
    info!(path = %output.display(), mods = entries.len(), "PDF catalog written");
    if !quiet {
        println!("{} {}", messages.get("pdf_done"), output.display());
    }
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let app_dir = paths::app_dir()?;
    let client = build_client(args)?;
    let console = Console {
        interactive: !args.nopause.unwrap_or(false) && std::io::stdin().is_terminal(),
        styled: std::io::stdout().is_terminal(),
        prompter: &TerminalPrompter,
    };
    run_in(args, &app_dir, &client, &console)
}

/// One run with everything the updater writes kept under `app_dir`.
fn run_in<R: ModRepository + ?Sized>(
    args: &Args,
    app_dir: &Path,
    repo: &R,
    console: &Console<'_>,
) -> Result<(), CliRunError> {
    let Console {
        interactive,
        styled,
        prompter,
    } = *console;
    let now = chrono::Local::now().naive_local();
    let log_dir = paths::logs_dir(app_dir)?;
    let _log_guard = logging::init_logging(&LogConfig::from_flags(
        args.quiet,
        args.verbose,
        Some(logging::log_file_path(&log_dir, now)),
    ))
    .map_err(|e| CliRunError::Output(format!("Cannot open log file in {}: {}", log_dir.display(), e)))?;
    let lang_dirs = paths::lang_dirs(app_dir);

    let config_path = args
        .configfile
        .clone()
        .unwrap_or_else(|| paths::default_config_file(app_dir));
    let first_launch = config::needs_creation(&config_path);
    let mut seed = Config {
        mods_path: args.modspath.clone(),
        exclusions: merged_exclusions(&[], &args.exclusion),
        ..Config::default()
    };
    if let Some(lang) = &args.language {
        seed.language = lang.clone();
    } else if first_launch && interactive {
        let english = Messages::default();
        println!("{}", english.get("first_launch_title"));
        seed.language = prompter.language(english.get("first_launch_lang_choice"), &seed.language);
    }
    let (config, created) = config::load_or_create(&config_path, &seed)?;
    info!(config = %config_path.display(), created, "configuration loaded");

    let language = args.language.clone().unwrap_or_else(|| config.language.clone());
    let messages = Messages::load(&language, &lang_dirs);

    if created {
        print_first_launch(&messages, &config, &config_path);
        if interactive && !prompter.confirm(messages.get("first_launch_continue"), true) {
            return Ok(());
        }
    }

    let options = update_options(args, &config)?;
    let default_mods = paths::default_mods_dir();
    let mods_dir = paths::resolve_mods_dir(
        args.modspath.as_deref(),
        config.mods_path.as_deref(),
        default_mods.as_deref(),
    )?;
    info!(mods_dir = %mods_dir.display(), "mods folder");

    if !args.quiet {
        print!(
            "{}",
            report::render_banner(
                &messages,
                &config.game_version_limit,
                !config.has_game_version_limit(),
                styled
            )
        );
    }

    let all_files = modinfo::list_mod_files(&mods_dir)?;
    if all_files.is_empty() {
        return Err(CliRunError::InvalidInput(format!(
            "{}: {}",
            messages.get("no_mods"),
            mods_dir.display()
        )));
    }
    let exclusions = merged_exclusions(&config.exclusions, &args.exclusion);
    let (files, excluded) = modinfo::apply_exclusions(all_files, &exclusions);

    let print_line = |_: usize, _: usize, result: &ModResult| {
        println!("{}", report::render_result_line(&messages, result, styled));
    };
    let progress: Option<updater::ProgressFn<'_>> = if args.quiet {
        None
    } else {
        Some(&print_line)
    };
    let update_report = updater::run_updates(repo, &files, &excluded, &options, progress);

    print!(
        "{}",
        report::render_summary(&update_report, &messages, styled)
    );
    if !args.dry_run {
        let log_path = report::summary_log_path(app_dir);
        report::append_summary_log(&log_path, &update_report, &messages, now).map_err(|e| {
            CliRunError::Output(format!(
                "Cannot write summary log {}: {}",
                log_path.display(),
                e
            ))
        })?;
        if !args.quiet {
            println!("{} {}", messages.get("summary_log_written"), log_path.display());
        }
    }

    let want_pdf = match args.makepdf {
        Some(choice) => choice,
        None => interactive && prompter.confirm(messages.get("make_pdf"), false),
    };
    if want_pdf {
        let output = pdf_output_path(args, app_dir, now.date());
        make_catalog(repo, &mods_dir, &output, &messages, args.quiet)?;
    }

    if interactive {
        prompter.pause(messages.get("exit_prompt"));
    } else if !args.quiet {
        println!("{}", messages.get("end_of_program"));
    }
    Ok(())
}
