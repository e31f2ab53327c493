use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wikiclean::config::{self, PipelineConfig};
use wikiclean::extract::run_extraction;
use wikiclean::writer::read_batch;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "wikiclean")]
#[command(about = "Turn Wikipedia dumps into cleaned, zstd-compressed JSONL batches")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every article in a dump and write numbered batch files
    Extract(ExtractArgs),
    /// Decode a batch file and show what is in it
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Path to the Wikipedia dump file (.xml.bz2 or .xml)
    #[arg(short, long, env = "DUMP_PATH")]
    input: PathBuf,

    /// Output directory for batch files
    #[arg(short, long, env = "OUTPUT_DIR")]
    output: PathBuf,

    /// Articles per batch file
    #[arg(long, env = "BATCH_SIZE", default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Cleaning workers (defaults to one fewer than the CPU count)
    #[arg(long, env = "NUM_WORKERS")]
    workers: Option<usize>,

    /// Pages handed to a worker at a time
    #[arg(long, default_value_t = config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// zstd compression level
    #[arg(long, default_value_t = config::DEFAULT_COMPRESSION_LEVEL)]
    compression_level: i32,

    /// Limit number of eligible pages to process (for testing)
    #[arg(long)]
    limit: Option<u64>,

    /// Remove the output directory before starting
    #[arg(long)]
    clean: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Batch file to decode
    file: PathBuf,

    /// Number of articles to list
    #[arg(long, default_value_t = 5)]
    show: usize,
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    if args.clean && args.output.exists() {
        info!("Cleaning output directory: {}", args.output.display());
        fs::remove_dir_all(&args.output).with_context(|| {
            format!("Failed to clean output directory: {}", args.output.display())
        })?;
    }

    let config = PipelineConfig::new(&args.input, &args.output)
        .with_batch_size(args.batch_size)
        .with_workers(args.workers.unwrap_or_else(config::default_workers))
        .with_chunk_size(args.chunk_size)
        .with_compression_level(args.compression_level)
        .with_limit(args.limit);

    let start = Instant::now();
    let report = run_extraction(&config)?;
    let elapsed = start.elapsed();
    let stats = &report.stats;

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", elapsed.as_secs_f64());
    println!();
    println!("Pages seen:         {}", stats.pages());
    println!("Eligible pages:     {}", stats.eligible());
    println!("Skipped namespace:  {}", stats.skipped_namespace());
    println!("Skipped redirect:   {}", stats.skipped_redirect());
    println!("Skipped no text:    {}", stats.skipped_empty());
    println!("Articles cleaned:   {}", stats.cleaned());
    println!("Discarded (empty):  {}", stats.discarded());
    println!("Cleaning failures:  {}", stats.failures());
    println!("Batches written:    {}", stats.batches());
    println!("Articles written:   {}", stats.articles_written());
    println!("Bytes written:      {}", stats.bytes());

    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let articles = read_batch(&args.file)?;

    println!("{}: {} articles", args.file.display(), articles.len());
    for article in articles.iter().take(args.show) {
        println!("  [{}] {} <{}>", article.id, article.title, article.url);
    }
    if articles.len() > args.show {
        println!("  ... {} more", articles.len() - args.show);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG, when set, wins over -v.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Inspect(args) => run_inspect(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
