//! Re-fetch Spotify metadata (album art, popularity, ISRC, release year) for
//! stored tracks and merge it without overwriting existing values.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Instant;
use tracing::{debug, info};

use trackpack::config::{load_env_files, Config};
use trackpack::enrichment::{backfill_tracks, BackfillOptions};
use trackpack::pacing::Pacer;
use trackpack::progress::{format_duration, init_logging};
use trackpack::spotify::{SpotifyClient, MAX_IDS_PER_REQUEST};
use trackpack::store::Store;

#[derive(Parser)]
#[command(name = "backfill-tracks")]
#[command(about = "Backfill missing Spotify metadata for stored tracks")]
struct Args {
    /// Only process the N most recently created tracks
    #[arg(long)]
    limit: Option<usize>,

    /// Tracks per catalog request (max 50)
    #[arg(long, default_value_t = MAX_IDS_PER_REQUEST)]
    batch_size: usize,

    /// Re-fetch every track, not just those missing album art
    #[arg(long)]
    force_all: bool,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long)]
    log_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let env_files = load_env_files();
    init_logging(args.log_only);
    debug!(?env_files, "Loaded env files");

    let config = Config::from_env()?;
    let start = Instant::now();

    let mut store = Store::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    let mut catalog = SpotifyClient::new(config.spotify()?.clone());

    let options = BackfillOptions {
        limit: args.limit,
        force_all: args.force_all,
        batch_size: args.batch_size,
    };
    info!(?options, "Starting backfill");

    let summary = backfill_tracks(&mut store, &mut catalog, &options, &Pacer::backfill())?;

    println!("\n{:=<60}", "");
    println!("Backfill complete");
    println!("  Tracks processed: {}", summary.processed);
    println!("  Tracks updated: {}", summary.updated);
    println!("  Failed or not found: {}", summary.failed);
    println!("  Batches: {}", summary.batches);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}
