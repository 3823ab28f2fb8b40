use bcalm_lib::builder::Pipeline;
use bcalm_lib::{build_compacted_graph, BuildConfiguration, MemoryStore, PipelineReport};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "bcalm")]
#[command(version = "0.1.0")]
#[command(about = "Compacted de Bruijn graph construction by minimizer bucketing", long_about = None)]
struct Cli {
    /// Verbose output (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the compacted graph of a k-mer file
    Build {
        /// Input file, one k-mer per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to <input stem>.unitigs.txt)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// K-mer length
        #[arg(short, default_value = "31")]
        k: usize,

        /// Minimizer half-width
        #[arg(short, default_value = "5")]
        m: usize,

        /// Keep intermediate streams under this directory instead of in memory
        #[arg(long)]
        tmp_dir: Option<PathBuf>,

        /// Use the lexicographic minimizer order, skipping the counting pass
        #[arg(long)]
        no_count: bool,

        /// File receiving the content of each new largest bucket
        #[arg(long)]
        dump_largest: Option<PathBuf>,
    },

    /// Partition a k-mer file without building anything and report superbucket sizes
    Partition {
        /// Input file, one k-mer per line
        #[arg(short, long)]
        input: PathBuf,

        /// K-mer length
        #[arg(short, default_value = "31")]
        k: usize,

        /// Minimizer half-width
        #[arg(short, default_value = "5")]
        m: usize,

        /// Use the lexicographic minimizer order, skipping the counting pass
        #[arg(long)]
        no_count: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: use RUST_LOG if set, otherwise info (debug with --verbose)
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Build { input, output, k, m, tmp_dir, no_count, dump_largest } => {
            let mut config = configuration(k, m, no_count, cli.verbose)?;
            config.tmp_dirname = tmp_dir;
            if dump_largest.is_some() {
                config.largest_bucket_dump = dump_largest;
            }
            build_command(config, &input, output)?;
        }
        Commands::Partition { input, k, m, no_count } => {
            let config = configuration(k, m, no_count, cli.verbose)?;
            partition_command(config, &input)?;
        }
    }

    Ok(())
}

fn configuration(k: usize, m: usize, no_count: bool, verbose: bool) -> anyhow::Result<BuildConfiguration> {
    let mut config = BuildConfiguration::new(k, m).map_err(|e| anyhow::anyhow!("{}", e))?;
    config.count_mmers = !no_count;
    config.verbose = verbose;
    Ok(config)
}

/// Build the compacted graph and write it next to the input unless told otherwise
fn build_command(config: BuildConfiguration, input: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| {
        let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("bcalm");
        PathBuf::from(format!("{}.unitigs.txt", stem))
    });
    info!("Building compacted de Bruijn graph...");
    info!("  Input: {:?}", input);
    info!("  Output: {:?}", output);

    let report = build_compacted_graph(&config, input, &output)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &PipelineReport) {
    info!("Build summary:");
    info!("  k-mers: {}", report.num_kmers);
    info!("  superbuckets used: {}", report.num_superbuckets);
    info!("  buckets compacted: {}", report.num_buckets);
    info!("  records processed: {} ({} through tags)", report.num_records, report.num_tags);
    info!("  largest bucket: {} records", report.largest_bucket);
    info!("  nodes written: {}", report.num_final);
}

/// Dry-run partitioning: one line per non-empty superbucket
fn partition_command(config: BuildConfiguration, input: &Path) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::new(config, MemoryStore::new())?;
    let stats = pipeline.dry_run(input)?;
    for (superbucket, &size) in stats.superbucket_sizes.iter().enumerate() {
        if size > 0 {
            println!("{}\t{}", superbucket, size);
        }
    }
    info!(
        "{} k-mers in {} non-empty superbuckets (largest {})",
        stats.num_kmers,
        stats.num_nonempty(),
        stats.max_superbucket()
    );
    Ok(())
}
