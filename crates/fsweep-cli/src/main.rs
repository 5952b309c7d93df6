//! fsweep command-line interface.
//!
//! Streams search results to stdout as they are found. SIGINT/SIGTERM trip
//! the engine's cancellation token; in-flight results drain and the
//! process exits cleanly.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use fsweep::events::TracingSink;
use fsweep::humanize::format_size;
use fsweep::{search_with, CancellationToken, SearchOptions};

/// Fast file search utility.
///
/// Supports multiple patterns and extensions. Example:
/// `fsweep -p "*.txt" -p "*.doc" -e txt -e doc -i /home /usr`
#[derive(Debug, Parser)]
#[command(name = "fsweep")]
struct Args {
    /// Directories to search.
    #[arg(value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Search patterns (repeatable); `*` matches any sequence.
    #[arg(short, long = "pattern", value_name = "PATTERN")]
    pattern: Vec<String>,

    /// File extensions, with or without the dot (repeatable).
    #[arg(short, long = "ext", value_name = "EXT")]
    ext: Vec<String>,

    /// Case-insensitive matching.
    #[arg(short, long)]
    ignore_case: bool,

    /// Worker threads (default: number of CPU cores).
    #[arg(short, long, default_value_t = 0, value_name = "N")]
    workers: usize,

    /// Size of the internal buffers.
    #[arg(short, long, default_value_t = 1000, value_name = "N")]
    buffer: usize,

    /// Show file sizes in human units.
    #[arg(short = 's', long = "size")]
    show_size: bool,

    /// Reveal the match in the file manager when exactly one is found.
    #[arg(short, long)]
    open: bool,

    /// Print version information and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            // Help and version are "errors" to clap but successes to us.
            if error.use_stderr() {
                let _ = error.print();
                return ExitCode::FAILURE;
            }
            let _ = error.print();
            return ExitCode::SUCCESS;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    if args.version {
        println!("fsweep v{}", fsweep::VERSION);
        return Ok(());
    }
    anyhow::ensure!(
        !args.roots.is_empty(),
        "at least one search directory is required"
    );

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nSearch interrupted by user");
        handler_token.cancel();
    })
    .context("failed to install signal handler")?;

    let opts = SearchOptions {
        roots: args.roots,
        patterns: args.pattern,
        extensions: args.ext,
        ignore_case: args.ignore_case,
        workers: args.workers,
        buffer_size: args.buffer,
        ..Default::default()
    };

    let stream = search_with(opts, cancel, Arc::new(TracingSink));

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message("Searching");

    let mut found: Vec<PathBuf> = Vec::new();
    for result in stream {
        if let Some(error) = &result.error {
            bar.println(format!(
                "Error processing {}: {error}",
                result.path.display()
            ));
        }
        let size_note = if args.show_size {
            format!(" ({})", format_size(result.size))
        } else {
            String::new()
        };
        bar.println(format!("Found: {}{size_note}", result.path.display()));
        found.push(result.path);
        bar.set_message(format!("Searching ({} found)", found.len()));
        bar.tick();
    }
    bar.finish_and_clear();

    println!("Total files found: {}", found.len());

    if args.open && found.len() == 1 {
        println!("Opening file location...");
        if let Err(error) = reveal_in_file_manager(&found[0]) {
            eprintln!("Error opening file location: {error:#}");
        }
    }

    Ok(())
}

/// Asks the platform file manager to reveal `path`.
fn reveal_in_file_manager(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    let status = Command::new("open").arg("-R").arg(path).status();

    #[cfg(target_os = "windows")]
    let status = Command::new("explorer")
        .arg(format!("/select,{}", path.display()))
        .status();

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let status = Command::new("xdg-open")
        .arg(path.parent().unwrap_or(Path::new(".")))
        .status();

    let status = status.context("failed to launch file manager")?;
    anyhow::ensure!(status.success(), "file manager exited with {status}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_full_flag_set() {
        let args = Args::try_parse_from([
            "fsweep", "-p", "*.txt", "-p", "report", "-e", "txt", "-i", "-w", "4", "-b", "500",
            "-s", "-o", "/tmp",
        ])
        .unwrap();
        assert_eq!(args.roots, vec![PathBuf::from("/tmp")]);
        assert_eq!(args.pattern, vec!["*.txt", "report"]);
        assert_eq!(args.ext, vec!["txt"]);
        assert!(args.ignore_case);
        assert_eq!(args.workers, 4);
        assert_eq!(args.buffer, 500);
        assert!(args.show_size);
        assert!(args.open);
        assert!(!args.version);
    }

    #[test]
    fn defaults_leave_workers_to_the_engine() {
        let args = Args::try_parse_from(["fsweep", "/data"]).unwrap();
        assert_eq!(args.workers, 0);
        assert_eq!(args.buffer, 1000);
        assert!(!args.ignore_case);
    }

    #[test]
    fn version_flag_needs_no_roots() {
        let args = Args::try_parse_from(["fsweep", "-v"]).unwrap();
        assert!(args.version);
        assert!(args.roots.is_empty());
    }
}
