// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CLI tool for scanning directories and reporting duplicate files.

use blockdedup::digest::{DigestFactory, DigestKind};
use blockdedup::{BlockingItem, FileDeduplicator, FileDeduplicatorConfig};
use clap::{ArgAction, Parser};
use humansize::{SizeFormatter, BINARY};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
    registry::Registry,
};

macro_rules! die {
    ($fmt:literal, $($arg:tt)*) => {{
        eprintln!($fmt, $($arg)*);
        std::process::exit(1);
    }};

    ($msg:literal) => {{
        eprintln!($msg);
        std::process::exit(1);
    }};
}

#[allow(unused_imports)]
use tracing::{debug, info, warn};

fn init_tracing(quiet: bool, verbose: u8, debug: bool) -> LevelFilter {
    let level_filter = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    tracing_log::LogTracer::init().expect("Failed to set log tracer");

    let registry = Registry::default();

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("BLOCKDEDUP_LOG")
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(debug)
        .with_line_number(debug)
        .compact();

    let subscriber = registry.with(env_filter).with(fmt_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        die!("INTERNAL ERROR: setting default tracing::subscriber failed");
    }

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing_panic::panic_hook(info);
        prev_hook(info);
    }));

    level_filter
}

/// Scan directory trees and report duplicate files.
#[derive(Parser, Debug)]
#[command(name = "blockdedup")]
#[command(about = "Scan directory trees and report duplicate files")]
struct ToolArgs {
    /// Directory to scan (repeatable).
    #[arg(short, long = "dir", value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// Digest to use, by id (repeatable; overrides the default chain).
    #[arg(short, long = "alg", value_name = "ALG")]
    algs: Vec<String>,

    /// Write the report to this file instead of stdout.
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    /// Output format. Only "robot" is currently supported.
    #[arg(short, long, default_value = "robot")]
    format: String,

    /// Print scan progress to stderr.
    #[arg(short = 'P', long)]
    progress: bool,

    /// Suppress all output except for errors. This overrides -v.
    #[arg(short, long)]
    quiet: bool,

    /// Increase verbosity. Supply multiple times to increase further.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Include source-location suffixes on warnings.
    #[arg(long)]
    debug: bool,
}

fn human(bytes: u64) -> String {
    SizeFormatter::new(bytes, BINARY).to_string()
}

fn render_progress(scanned: u64, bytes: u64) {
    eprint!("\rscanned {scanned} files, {}          ", human(bytes));
    let _ = std::io::stderr().flush();
}

fn resolve_algs(ids: &[String]) -> Vec<DigestKind> {
    ids.iter()
        .map(|id| {
            DigestKind::by_id(id).unwrap_or_else(|| {
                die!("unknown digest \"{}\" passed to --alg", id);
            })
        })
        .collect()
}

fn render_robot(groups: &[Vec<PathBuf>]) -> String {
    let mut lines: Vec<String> = groups
        .iter()
        .filter(|g| g.len() > 1)
        .map(|g| {
            let mut paths: Vec<String> = g.iter().map(|p| p.display().to_string()).collect();
            paths.sort();
            paths.join("\t")
        })
        .collect();
    lines.sort();
    lines.join("\n")
}

fn render_stats(dedup: &FileDeduplicator, total_files: u64, unreadable: u64, unreadable_bytes: u64, groups: &[Vec<PathBuf>]) -> String {
    let mut out = String::new();

    out.push_str(&format!("total files scanned: {total_files}\n"));
    if unreadable > 0 {
        out.push_str(&format!(
            "unreadable files skipped: {unreadable} ({})\n",
            human(unreadable_bytes)
        ));
    }

    let unique = groups.iter().filter(|g| g.len() == 1).count();
    let with_duplicates = groups.iter().filter(|g| g.len() > 1).count();
    let duplicates: usize = groups.iter().filter(|g| g.len() > 1).map(|g| g.len() - 1).sum();
    out.push_str(&format!(
        "unique: {unique}, distinct with duplicates: {with_duplicates}, duplicates: {duplicates}\n"
    ));

    let invocations = dedup.count_digests();
    let collisions = dedup.count_collisions();
    for (i, f) in dedup.blocking().iter().enumerate() {
        let inv = invocations.get(i).copied().unwrap_or(0);
        let col = collisions.get(i).copied().unwrap_or(0);
        out.push_str(&format!("{} : {} invocations, {} collisions\n", f.name(), inv, col));
    }

    out.pop();
    out
}

fn main() {
    let args = ToolArgs::parse();
    init_tracing(args.quiet, args.verbose, args.debug);

    if args.format != "robot" {
        die!("unsupported --format \"{}\"; only \"robot\" is supported", args.format);
    }
    if args.dirs.is_empty() {
        die!("at least one --dir is required");
    }

    let algs = resolve_algs(&args.algs);
    let blocking = if algs.is_empty() {
        None
    } else {
        Some(vec![BlockingItem::factory(DigestFactory::with_chain(algs))])
    };

    let mut dedup = match FileDeduplicator::new(FileDeduplicatorConfig {
        ignore_empty: false,
        blocking,
    }) {
        Ok(d) => d,
        Err(e) => die!("failed to configure engine: {}", e),
    };

    let mut total_files = 0u64;
    let mut total_bytes = 0u64;
    let mut unreadable = 0u64;
    let mut unreadable_bytes = 0u64;

    for dir in &args.dirs {
        info!(dir = %dir.display(), "scanning directory");
        let progress_enabled = args.progress;
        let result = {
            let mut callback = |size: u64, ignored_unreadable: bool| {
                total_files += 1;
                if ignored_unreadable {
                    unreadable += 1;
                    unreadable_bytes += size;
                } else {
                    total_bytes += size;
                }
                if progress_enabled && total_files % 1000 == 0 {
                    render_progress(total_files, total_bytes);
                }
            };
            dedup.scan(dir, Some(&mut callback))
        };
        if let Err(e) = result {
            die!("error scanning {}: {}", dir.display(), e);
        }
    }

    if args.progress {
        eprintln!();
    }

    let groups = dedup.duplicates(None);
    let report = render_robot(&groups);

    let writing_to_stdout = args.outfile.is_none();
    let show_stats = args.verbose > 0 && !args.quiet && writing_to_stdout;

    match &args.outfile {
        Some(path) => {
            if let Err(e) = std::fs::write(path, format!("{report}\n")) {
                die!("failed to write {}: {}", path.display(), e);
            }
        }
        None => {
            if show_stats {
                let separator = "-".repeat(30);
                println!("{separator}");
                println!("{report}");
                println!("{separator}");
                println!(
                    "{}",
                    render_stats(&dedup, total_files, unreadable, unreadable_bytes, &groups)
                );
            } else {
                println!("{report}");
            }
        }
    }
}
