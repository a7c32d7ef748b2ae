use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error};

use link_pipeline::categorize::run_categorize;
use link_pipeline::config::{parse_delimiter, PipelineConfig};
use link_pipeline::forum::run_forum;
use link_pipeline::pipeline::{
    parse_utc_offset, run_canonicalize, run_extract, run_filter, run_link_stats, run_report,
    run_resolve, FilterOptions, Period,
};
use link_pipeline::url_canonicalizer::Canonicalizer;
use link_pipeline::url_resolver::{RedirectResolver, ResolverConfig};
use link_pipeline::utils::logger::init_logger;
use link_pipeline::utils::output_path;

#[derive(Parser, Debug)]
#[command(name = "link-pipeline", version, about = "Extract, resolve and canonicalize links in a text corpus")]
struct Cli {
    /// TOML configuration file; missing files are ignored
    #[arg(long, global = true, default_value = "link_pipeline.toml")]
    config: PathBuf,

    /// Write logs to a timestamped file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Column separator, overrides the configured one
    #[arg(long, global = true)]
    delimiter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract links from the corpus into `_links` and `_dictionary` files
    Extract { corpus: PathBuf },
    /// Resolve the redirects of a dictionary file in place
    Resolve {
        dictionary: PathBuf,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        max_redirect_depth: Option<usize>,
    },
    /// Canonicalize the expanded URLs of a resolved dictionary
    Canonicalize { dictionary: PathBuf },
    /// Archive links and link counts by domain, month and user
    Report {
        links: PathBuf,
        processed: PathBuf,
        /// Output prefix; defaults to the links file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Per-period statistics of records with external links
    LinkStats(LinkStatsArgs),
    /// Filter a table by date range and project columns
    Filter(FilterArgs),
    /// Add keyword category columns to a table
    Categorize {
        categories: PathBuf,
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Defaults to the configured record text column
        #[arg(long)]
        text_column: Option<String>,
    },
    /// Merge saved forum thread pages into one table
    Forum {
        /// File pattern, `*` and `?` allowed in the file name
        pattern: String,
        save_folder: PathBuf,
    },
}

#[derive(Args, Debug)]
struct LinkStatsArgs {
    corpus: PathBuf,
    dictionary: PathBuf,
    links: PathBuf,
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, conflicts_with = "split_by_hour")]
    split_by_day: bool,
    #[arg(long)]
    split_by_hour: bool,
}

#[derive(Args, Debug)]
struct FilterArgs {
    input: PathBuf,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// First day to keep (YYYY-MM-DD)
    #[arg(long)]
    from_date: Option<NaiveDate>,
    /// Last day to keep (YYYY-MM-DD)
    #[arg(long)]
    to_date: Option<NaiveDate>,
    /// Fixed offset such as +09:00
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<String>,
    /// Defaults to the configured record timestamp column
    #[arg(long)]
    date_col: Option<String>,
    /// Columns to keep, repeatable and comma-separated
    #[arg(long = "col")]
    columns: Vec<String>,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(Some(cli.config.as_path()))?;
    if let Some(delimiter) = &cli.delimiter {
        parse_delimiter(delimiter)?;
        config.csv.delimiter = delimiter.clone();
    }
    if let Command::Resolve {
        chunk_size,
        max_redirect_depth,
        ..
    } = &cli.command
    {
        if let Some(size) = chunk_size {
            config.resolver.chunk_size = *size;
        }
        if let Some(depth) = max_redirect_depth {
            config.resolver.max_redirect_depth = *depth;
        }
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    debug!("Running {:?}", cli.command);
    let delimiter = config.csv.delimiter_byte()?;

    match cli.command {
        Command::Extract { corpus } => {
            let outputs = run_extract(&corpus, &config)?;
            println!(
                "Extracted {} links ({} unique urls)",
                outputs.link_count, outputs.unique_urls
            );
        }
        Command::Resolve { dictionary, .. } => {
            let resolver = RedirectResolver::new(ResolverConfig::from(&config.resolver))?;
            run_resolve(&dictionary, &config, &resolver).await?;
        }
        Command::Canonicalize { dictionary } => {
            let canonicalizer = Canonicalizer::new(&config.canonicalizer)?;
            let path = run_canonicalize(&dictionary, &config, &canonicalizer)?;
            println!("Saved {}", path.display());
        }
        Command::Report {
            links,
            processed,
            output,
        } => {
            let output = output.unwrap_or_else(|| links.clone());
            run_report(&links, &processed, &output, &config)?;
        }
        Command::LinkStats(args) => {
            let period = if args.split_by_hour {
                Period::Hour
            } else if args.split_by_day {
                Period::Day
            } else {
                Period::Month
            };
            let canonicalizer = Canonicalizer::new(&config.canonicalizer)?;
            let output = args.output.unwrap_or_else(|| args.corpus.clone());
            run_link_stats(
                &args.corpus,
                &args.dictionary,
                &args.links,
                &output,
                period,
                &config,
                canonicalizer.suffixes(),
            )?;
        }
        Command::Filter(args) => {
            let utc_offset = args.utc_offset.as_deref().map(parse_utc_offset).transpose()?;
            let options = FilterOptions {
                date_column: args
                    .date_col
                    .unwrap_or_else(|| config.records.timestamp.clone()),
                from_date: args.from_date,
                to_date: args.to_date,
                utc_offset,
                columns: args.columns,
            };
            let output = args
                .output
                .unwrap_or_else(|| output_path(&args.input, "_filtered"));
            run_filter(&args.input, &output, &options, delimiter)?;
        }
        Command::Categorize {
            categories,
            input,
            output,
            text_column,
        } => {
            let output = output.unwrap_or_else(|| output_path(&input, "_categorized"));
            let frequencies = output_path(&output, "_frequencies");
            let text_column = text_column.unwrap_or_else(|| config.records.text.clone());
            run_categorize(
                &categories,
                &input,
                &output,
                &frequencies,
                &text_column,
                delimiter,
            )?;
        }
        Command::Forum {
            pattern,
            save_folder,
        } => {
            run_forum(&pattern, &save_folder, delimiter)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_dir.as_deref(), cli.verbose).context("Failed to initialize logger")?;

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
