//! Stream collector CLI.
//!
//! Reads keyword, user-ID, and GeoJSON bounding-box filter files, compiles
//! them into server-side filtered-stream rules, synchronizes the rule store,
//! then tails the filtered stream (or the sampled stream when no filters were
//! given) into hourly-rolling log files.

#![forbid(unsafe_code)]

mod config;
mod error;
mod filters;
mod geo;
mod output;
mod rules;
mod stream;
mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use config::StreamConfig;
use filters::FilterSet;
use output::StatusSink;
use rules::RulesClient;
use stream::StreamKind;

/// Collect a platform's v2 stream into rolling log files.
#[derive(Debug, Parser)]
#[command(name = "stream-filter", version, about, long_about = None)]
struct Args {
    /// File containing keywords to track, one per line
    #[arg(short = 'k', long, value_name = "FILE")]
    keywords: Option<PathBuf>,

    /// GeoJSON file containing bounding boxes to track
    #[arg(short = 'b', long, value_name = "GEOJSON")]
    bounds: Option<PathBuf>,

    /// File containing user IDs to follow, one per line
    #[arg(short = 'u', long, value_name = "FILE")]
    users: Option<PathBuf>,

    /// Directory for the rolling statuses and warnings logs
    #[arg(long, value_name = "DIR", default_value = ".")]
    log_dir: PathBuf,

    /// Print the compiled rules and exit without contacting the service
    #[arg(long)]
    dry_run: bool,
}

fn load_filters(args: &Args) -> Result<FilterSet> {
    let mut set = FilterSet::default();

    if let Some(path) = &args.keywords {
        set.keywords = filters::read_lines(path)
            .with_context(|| format!("reading keyword file {}", path.display()))?;
    }
    if let Some(path) = &args.users {
        set.user_ids = filters::read_user_ids(path)
            .with_context(|| format!("reading user file {}", path.display()))?;
    }
    if let Some(path) = &args.bounds {
        set.bounding_boxes = geo::read_bounding_boxes(path)
            .with_context(|| format!("reading GeoJSON file {}", path.display()))?;
    }

    Ok(set)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filters = load_filters(&args)?;
    let rules = filters.compile()?;

    if args.dry_run {
        for rule in &rules {
            println!("{}: {}", rule.tag.as_deref().unwrap_or("-"), rule.value);
        }
        return Ok(());
    }

    std::fs::create_dir_all(&args.log_dir)
        .with_context(|| format!("creating log directory {}", args.log_dir.display()))?;
    let _log_guard = output::init_logging(&args.log_dir);

    let config = StreamConfig::from_env()?;

    let kind = if filters.is_empty() {
        info!("no filters supplied, reading the sampled stream");
        StreamKind::Sampled
    } else {
        let client = RulesClient::new(&config)?;
        let created = client.sync(&rules).await.context("synchronizing rules")?;
        for rule in &created {
            info!(
                id = rule.id.as_deref().unwrap_or("-"),
                tag = rule.tag.as_deref().unwrap_or("-"),
                value = %rule.value,
                "rule active"
            );
        }
        StreamKind::Filtered
    };

    let mut sink = StatusSink::new(&args.log_dir);
    stream::run(&config, kind, &mut sink).await?;

    Ok(())
}
