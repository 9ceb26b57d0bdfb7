use clap::Parser;
use colored::Colorize;
use std::error::Error;

fn main() {
    let args = modsupdater::cli::Args::parse();
    let Err(e) = modsupdater::cli::run(&args) else {
        return;
    };
    eprintln!("{} {}", "error:".red().bold(), e);
    if args.verbose {
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
    }
    std::process::exit(e.exit_code());
}
