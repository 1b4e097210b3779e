//! LogLens CLI
//!
//! Command-line interface for LogLens operations:
//! - Import log files
//! - Query, explain and inspect records
//! - Timelines and store statistics
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use loglens::{
    generate_default_config, Aggregation, Config, FilterCondition, LogLens, ParserConfig,
    ParserKind, Query, TimelineRequest,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "loglens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ingest log files into structured records and query them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides the configured path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a log file
    Import {
        /// Path to the log file
        path: PathBuf,
        /// Format: plain, json, regex, grok or auto
        #[arg(short, long, default_value = "auto")]
        format: String,
        /// Pattern for the regex format
        #[arg(long)]
        pattern: Option<String>,
        /// strftime layout for captured timestamps (regex format)
        #[arg(long)]
        time_format: Option<String>,
        /// Only store records matching these filters
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Query stored records
    Query {
        /// Filters: field=value, field!=value, field~text, field=~regex, field>=value ...
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Sort field (default: timestamp, descending)
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
        /// Aggregations: fn or fn:field (count, avg, sum, min, max)
        #[arg(long = "agg")]
        aggregations: Vec<String>,
        /// Print the execution plan instead of running the query
        #[arg(long)]
        explain: bool,
    },

    /// Show one record
    Get {
        /// Record id
        id: String,
    },

    /// Record counts per time bucket
    Timeline {
        /// Bucket width in milliseconds
        #[arg(long)]
        bucket_ms: i64,
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Show store statistics
    Stats,

    /// Guess the format of a log file
    Detect {
        /// Path to the log file
        path: PathBuf,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(db) = &cli.db {
        config.storage.database_path = db.clone();
    }

    init_logging(&config);

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("failed to write {:?}", path))?;
                eprintln!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let sample_size = config.import.sample_size;
    let lens = LogLens::open(config)?;
    let outcome = run(&lens, cli.command, sample_size).await;
    lens.close()?;
    outcome
}

async fn run(lens: &LogLens, command: Commands, sample_size: usize) -> anyhow::Result<()> {
    match command {
        Commands::Import {
            path,
            format,
            pattern,
            time_format,
            filters,
        } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling import");
                    on_signal.cancel();
                }
            });

            let filters = parse_filters(&filters)?;

            let result = if format == "auto" && pattern.is_none() && filters.is_empty() {
                let (kind, result) = lens.auto_import_file(&path, cancel).await?;
                tracing::info!("Imported {:?} as {}", path, kind);
                result
            } else {
                let kind = if format == "auto" {
                    let sample = read_sample(&path, sample_size)?;
                    lens.auto_detect_format(&sample)
                } else {
                    format.parse::<ParserKind>()?
                };

                let mut parser_config = ParserConfig::new(kind);
                parser_config.pattern = pattern;
                parser_config.time_format = time_format;

                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("failed to open {:?}", path))?;
                lens.import_stream_filtered(&parser_config, &filters, file, cancel)
                    .await?
            };

            print_json(&result)
        }

        Commands::Query {
            filters,
            sort,
            desc,
            limit,
            offset,
            aggregations,
            explain,
        } => {
            let mut query = Query::new();
            query.filters = parse_filters(&filters)?;
            query.sort_by = sort;
            query.sort_desc = desc;
            query.limit = limit;
            query.offset = offset;
            for agg in &aggregations {
                query = query.aggregate(parse_aggregation(agg));
            }

            if explain {
                println!("{}", lens.explain_query(&query));
                return Ok(());
            }

            print_json(&lens.execute_query(query).await?)
        }

        Commands::Get { id } => print_json(&lens.get_record(&id).await?),

        Commands::Timeline { bucket_ms, filters } => {
            let request = TimelineRequest {
                filters: parse_filters(&filters)?,
                bucket_ms,
            };
            print_json(&lens.get_timeline(request).await?)
        }

        Commands::Stats => print_json(&lens.stats().await?),

        Commands::Detect { path } => {
            let sample = read_sample(&path, sample_size)?;
            println!("{}", lens.auto_detect_format(&sample));
            Ok(())
        }

        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("loglens={}", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn read_sample(path: &Path, size: usize) -> anyhow::Result<Vec<u8>> {
    use std::io::Read;

    let file = std::fs::File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut sample = Vec::with_capacity(size);
    file.take(size as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_filters(raw: &[String]) -> anyhow::Result<Vec<FilterCondition>> {
    raw.iter().map(|f| parse_filter(f)).collect()
}

/// Parse `field<op>value`. Operators: `=`, `!=`, `~` (contains), `=~` (regexp),
/// `>`, `>=`, `<`, `<=`.
fn parse_filter(raw: &str) -> anyhow::Result<FilterCondition> {
    let start = raw
        .find(['=', '!', '~', '<', '>'])
        .ok_or_else(|| anyhow!("filter {:?} has no operator", raw))?;

    let field = raw[..start].trim();
    if field.is_empty() {
        bail!("filter {:?} has no field", raw);
    }

    let rest = &raw[start..];
    let (op, value) = ["!=", ">=", "<=", "=~", "=", "~", ">", "<"]
        .iter()
        .find_map(|op| rest.strip_prefix(op).map(|value| (*op, value)))
        .ok_or_else(|| anyhow!("filter {:?} has an unknown operator", raw))?;

    let condition = match op {
        "=" => FilterCondition::equality(field, scalar(value)),
        "!=" => FilterCondition::exclusion(field, scalar(value)),
        "~" => FilterCondition::contains(field, value),
        "=~" => FilterCondition::regexp(field, value),
        ">" => FilterCondition::range(field, "gt", scalar(value)),
        ">=" => FilterCondition::range(field, "gte", scalar(value)),
        "<" => FilterCondition::range(field, "lt", scalar(value)),
        _ => FilterCondition::range(field, "lte", scalar(value)),
    };
    Ok(condition)
}

/// Numbers stay numbers, everything else is a string
fn scalar(value: &str) -> Value {
    value
        .parse::<i64>()
        .map(Value::from)
        .or_else(|_| value.parse::<f64>().map(Value::from))
        .unwrap_or_else(|_| Value::from(value))
}

fn parse_aggregation(raw: &str) -> Aggregation {
    match raw.split_once(':') {
        Some((function, field)) => Aggregation::new(function).on(field),
        None => Aggregation::new(raw),
    }
}
