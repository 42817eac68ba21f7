use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use log::{info, Level, LevelFilter};
use srpatch::{
    AppliedDiff, ApplyDiffRequest, ApplyError, ApplyOptions, CancellationToken, DiffApplier,
    DiskWorkspace, LineRange, Session, DEFAULT_BUFFER_LINES, DEFAULT_FUZZ_THRESHOLD,
};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

// --- Main Application Entry Point ---

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        // Using {:?} prints the full error chain, including match diagnostics.
        eprintln!("{} {:?}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Contains the primary logic of the application.
fn run(args: Args) -> Result<()> {
    setup_logging(args.verbose);

    // --- Argument Validation ---
    if !(0.0..=1.0).contains(&args.threshold) {
        return Err(anyhow!("Threshold must be between 0.0 and 1.0."));
    }
    if let Some(root) = &args.root {
        if !root.is_dir() {
            return Err(anyhow!(
                "Root directory '{}' not found or is not a directory.",
                root.display()
            ));
        }
    }

    let diff = fs::read_to_string(&args.diff_file)
        .with_context(|| format!("Failed to read diff file '{}'", args.diff_file.display()))?;

    let mut builder = ApplyOptions::builder()
        .fuzz_threshold(args.threshold)
        .buffer_lines(args.buffer_lines)
        .settle_delay(Duration::from_millis(args.settle_ms))
        .dry_run(args.dry_run);
    if let Some(dir) = &args.backup_dir {
        builder = builder.backup_dir(dir);
    }
    let options = builder.build();
    info!(
        "Fuzzy matching threshold: {:.2}, scan buffer: {} lines",
        options.fuzz_threshold, options.buffer_lines
    );

    let cancel = CancellationToken::new();
    let result = match &args.root {
        Some(root) => {
            let session = Session::new(root, DiskWorkspace, options);
            let request = ApplyDiffRequest {
                path: args.target.to_string_lossy().into_owned(),
                diff,
                start_line: args.start_line,
                end_line: args.end_line,
            };
            session.apply(&request, &cancel)
        }
        None => LineRange::from_bounds(args.start_line, args.end_line)
            .map_err(ApplyError::from)
            .and_then(|hint| {
                DiffApplier::new(DiskWorkspace, options).apply(&args.target, &diff, hint, &cancel)
            }),
    };

    let applied =
        result.with_context(|| format!("Failed to apply diff to '{}'", args.target.display()))?;
    print_result(&applied);

    if args.dry_run {
        info!("DRY RUN completed. No files were modified.");
    }
    Ok(())
}

// --- Helper Structs and Functions ---

/// Prints the outcome: the proposed diff in a dry run, the numbered file otherwise.
fn print_result(applied: &AppliedDiff) {
    println!("{}", applied.summary());
    match &applied.diff {
        Some(diff) => {
            println!("----- Proposed Changes for {} -----", applied.path.display());
            print!("{}", diff);
            println!("------------------------------------");
        }
        None => {
            println!();
            println!("Current file state:");
            println!("{}", "=".repeat(80));
            println!("{}", applied.numbered_content());
        }
    }
}

/// Defines the command-line arguments for the application.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Apply a SEARCH/REPLACE block to a file, locating the region by fuzzy matching.",
    long_about = "Finds the SEARCH text in the current file (near --start-line/--end-line when given), \
                  re-indents the REPLACE text to fit, then writes, verifies and rolls back on failure."
)]
struct Args {
    /// Path to the file containing the <<<<<<< SEARCH / ======= / >>>>>>> REPLACE block.
    diff_file: PathBuf,
    /// The file to patch. Relative to --root when one is given.
    target: PathBuf,
    /// Workspace root. The target must resolve inside it.
    #[arg(long)]
    root: Option<PathBuf>,
    /// First line (1-based) where the SEARCH text is expected. Requires --end-line.
    #[arg(long, requires = "end_line")]
    start_line: Option<usize>,
    /// Last line (1-based, inclusive) where the SEARCH text is expected. Requires --start-line.
    #[arg(long, requires = "start_line")]
    end_line: Option<usize>,
    /// The similarity threshold for fuzzy matching (0.0 to 1.0). Higher is stricter.
    #[arg(short = 't', long, default_value_t = DEFAULT_FUZZ_THRESHOLD)]
    threshold: f64,
    /// Lines scanned on each side of the hinted range when it does not match.
    #[arg(long, default_value_t = DEFAULT_BUFFER_LINES)]
    buffer_lines: usize,
    /// Milliseconds to wait between writing and verifying (at most 2000).
    #[arg(long, default_value_t = 100)]
    settle_ms: u64,
    /// Directory to keep a timestamped copy of the file's previous content in.
    #[arg(long)]
    backup_dir: Option<PathBuf>,
    /// If set, show what would be done, but don't modify any files.
    #[arg(
        short = 'n',
        long,
        help = "Show what would be done, but don't modify files."
    )]
    dry_run: bool,
    /// Increase logging verbosity. Can be used multiple times.
    /// -v for info, -vv for debug, -vvv for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Sets up the global logger with colored level prefixes.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| match record.level() {
            Level::Error => writeln!(buf, "{} {}", "error:".red().bold(), record.args()),
            Level::Warn => writeln!(buf, "{} {}", "warning:".yellow().bold(), record.args()),
            Level::Info => writeln!(buf, "{}", record.args()),
            Level::Debug => writeln!(buf, "{} {}", "debug:".blue().bold(), record.args()),
            Level::Trace => writeln!(buf, "{} {}", "trace:".cyan().bold(), record.args()),
        })
        .init();
}
