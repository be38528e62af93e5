use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use parz_core::{ArchivePipeline, PipelineOptions, RunSummary};

#[derive(Parser)]
#[command(
    name = "parz",
    version,
    about = "Parallel tar+zstd archiver",
    long_about = "Pack a directory tree into per-shard tar+zstd archives, or extract them back, \
                  overlapping file I/O with compression across a pool of worker threads."
)]
struct Cli {
    /// Worker threads (0 = one per available core).
    #[arg(long, global = true, default_value_t = 0)]
    threads: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a file or directory tree into .tar.zst archives.
    Compress {
        /// Source file or directory to archive.
        #[arg(long)]
        in_path: PathBuf,

        /// Directory receiving one archive per shard.
        #[arg(long)]
        out_dir: PathBuf,

        /// zstd compression level (0 = library default).
        #[arg(long, default_value_t = 0)]
        level: i32,

        /// Pooled block size (supports suffixes K/M/G, e.g. 128K, 1M).
        #[arg(long, default_value = "128K", value_parser = parse_size)]
        block_size: usize,

        /// Blocks retained by each pipeline's pool.
        #[arg(long, default_value_t = 10)]
        pool_blocks: usize,
    },
    /// Extract previously written archives into a directory.
    Decompress {
        /// Directory containing .tar.zst archives.
        #[arg(long)]
        in_dir: PathBuf,

        /// Directory the tree is restored under.
        #[arg(long)]
        out_dir: PathBuf,
    },
}

fn main() {
    init_logging();
    let code = match run() {
        Ok(errors) if errors > 0 => 1,
        Ok(_) => 0,
        Err(error) => {
            tracing::error!(error = %error, "run failed");
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<usize, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let started_at = Instant::now();

    let summary = match cli.command {
        Commands::Compress {
            in_path,
            out_dir,
            level,
            block_size,
            pool_blocks,
        } => {
            let options = PipelineOptions {
                threads: cli.threads,
                level,
                block_size,
                pool_blocks,
                ..PipelineOptions::default()
            };
            let summary = ArchivePipeline::new(options).compress_tree(&in_path, &out_dir)?;
            print_summary("compress", &summary);
            summary
        }
        Commands::Decompress { in_dir, out_dir } => {
            let options = PipelineOptions {
                threads: cli.threads,
                ..PipelineOptions::default()
            };
            let summary = ArchivePipeline::new(options).extract_tree(&in_dir, &out_dir)?;
            print_summary("decompress", &summary);
            summary
        }
    };

    tracing::info!(
        duration_ms = started_at.elapsed().as_millis() as u64,
        errors = summary.errors,
        "done"
    );
    Ok(summary.errors)
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::filter::LevelFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(op: &str, summary: &RunSummary) {
    if summary.succeeded() {
        println!("{op} complete");
    } else {
        println!("{op} finished with {} error(s)", summary.errors);
    }
    println!("  shards: {}", summary.shards);
    println!("  files: {}", summary.files);
    println!("  bytes read: {}", format_bytes(summary.bytes_read));
    println!("  bytes written: {}", format_bytes(summary.bytes_written));
    println!("  elapsed: {:.3}s", summary.elapsed.as_secs_f64());
    println!(
        "  buffer pool: created {} | recycled {} | dropped {}",
        summary.pool.created, summary.pool.recycled, summary.pool.dropped
    );
}

fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;

    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1usize,
        "k" | "kb" => 1024usize,
        "m" | "mb" => 1024usize * 1024usize,
        "g" | "gb" => 1024usize * 1024usize * 1024usize,
        other => return Err(format!("invalid size suffix '{other}' in '{value}'")),
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: {value}"))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
