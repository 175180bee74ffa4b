mod commands;
mod settings;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use model::Granularity;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tracing_subscriber::EnvFilter;

use commands::{BucketRequest, Sampling};
use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "ridestats", author, version, about = "Ride statistics from GPX tracks", long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Per-track statistics and an overall summary as JSON
    Stats(StatsArgs),
    /// Distance per hour/day/month/year for charting
    Buckets(BucketArgs),
    /// Rewrite tracks as GPX, CSV or NDJSON (chosen by the output extension)
    Convert(ConvertArgs),
}

#[derive(Parser, Debug)]
struct StatsArgs {
    /// GPX/CSV/NDJSON files to read
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Include the elevation profile of every track
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,

    /// Also write one CSV row per track
    #[arg(long, value_hint = ValueHint::FilePath)]
    csv: Option<PathBuf>,

    /// Minimum speed (km/h) that counts as moving
    #[arg(long)]
    stationary_speed: Option<f64>,
}

#[derive(Parser, Debug)]
struct BucketArgs {
    /// GPX/CSV/NDJSON files to read
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Bucket size (defaults to the configured granularity)
    #[arg(short, long, value_enum)]
    granularity: Option<GranularityOpt>,

    /// Window start, RFC 3339 (defaults to the earliest timestamp)
    #[arg(long, value_parser = parse_timestamp)]
    from: Option<OffsetDateTime>,

    /// Window end, RFC 3339 (defaults to the latest timestamp)
    #[arg(long, value_parser = parse_timestamp)]
    to: Option<OffsetDateTime>,

    /// Count each track's whole distance at its start time
    #[arg(long, action = ArgAction::SetTrue)]
    by_track: bool,

    /// Drop buckets without distance
    #[arg(long, action = ArgAction::SetTrue)]
    skip_empty: bool,

    /// Write buckets to CSV instead of printing JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    csv: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// GPX/CSV/NDJSON files to read
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Destination (.gpx, .csv, .ndjson or .jsonl)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Keep at most one point per this many seconds
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    sample_secs: Option<u32>,

    /// Thin every track to about this many points
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_points: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GranularityOpt {
    Hour,
    Day,
    Month,
    Year,
}

impl From<GranularityOpt> for Granularity {
    fn from(value: GranularityOpt) -> Self {
        match value {
            GranularityOpt::Hour => Granularity::Hour,
            GranularityOpt::Day => Granularity::Day,
            GranularityOpt::Month => Granularity::Month,
            GranularityOpt::Year => Granularity::Year,
        }
    }
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| format!("expected RFC 3339 timestamp: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Stats(args) => {
            if let Some(v) = args.stationary_speed {
                settings.stats.stationary_speed_kmh = v;
            }
            let docs = commands::load_documents(&args.inputs)?;
            let out = commands::stats(&docs, &settings, args.profile, args.csv.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Buckets(args) => {
            let tracks = commands::load_tracks(&args.inputs)?;
            let req = BucketRequest {
                granularity: args.granularity.map(Into::into).unwrap_or(settings.granularity),
                from: args.from,
                to: args.to,
                by_track: args.by_track,
                skip_empty: args.skip_empty || settings.skip_empty,
            };
            let buckets = commands::buckets(&tracks, &req, &settings)?;
            match args.csv {
                Some(path) => iox::export_buckets_csv(&buckets, &path)?,
                None => println!("{}", serde_json::to_string_pretty(&buckets)?),
            }
        }
        Command::Convert(args) => {
            let tracks = commands::load_tracks(&args.inputs)?;
            let sampling = Sampling {
                interval: args.sample_secs.map(|s| Duration::seconds(i64::from(s))),
                max_points: args.max_points.map(|n| n as usize),
            };
            commands::convert(&tracks, &args.output, &sampling)?;
        }
    }
    Ok(())
}
