//! Artist enrichment in three phases with a manual review step:
//! `fetch` writes a review file, `dedupe` keeps one row per Spotify artist,
//! `apply` merges the reviewed file into the database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use trackpack::config::{load_env_files, Config};
use trackpack::enrichment::{
    apply_artist_enrichment, default_review_path, fetch_artist_enrichment, read_review_file,
    write_review_file,
};
use trackpack::matching::dedupe_enrichments;
use trackpack::models::MatchType;
use trackpack::pacing::Pacer;
use trackpack::progress::{format_duration, init_logging};
use trackpack::safety::validate_output_path;
use trackpack::spotify::SpotifyClient;
use trackpack::store::Store;

/// Review file names must contain this.
const REVIEW_PATTERN: &str = "enrichment";

/// Fuzzy rows printed by `apply` before merging.
const FUZZY_SAMPLE: usize = 10;

#[derive(Parser)]
#[command(name = "enrich-artists")]
#[command(about = "Match stored artists to Spotify artists and merge genres, followers and images")]
struct Args {
    /// Hide progress bars and log periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search Spotify for artists without an id and write a review file
    Fetch {
        #[arg(long, default_value = "scripts/data")]
        output_dir: PathBuf,
    },
    /// Keep one row per Spotify artist id
    Dedupe { input: PathBuf, output: PathBuf },
    /// Merge a reviewed file into the database
    Apply { file: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let env_files = load_env_files();
    init_logging(args.log_only);
    debug!(?env_files, "Loaded env files");

    let config = Config::from_env()?;
    let start = Instant::now();

    match args.command {
        Command::Fetch { output_dir } => {
            let output = default_review_path(&output_dir);
            validate_output_path(&output, REVIEW_PATTERN, &[config.database_path.as_path()])?;

            let store = Store::open(&config.database_path).with_context(|| {
                format!("Failed to open database {}", config.database_path.display())
            })?;
            let mut catalog = SpotifyClient::new(config.spotify()?.clone());

            let summary = fetch_artist_enrichment(&store, &mut catalog, &Pacer::artist_search())?;
            write_review_file(&output, &summary.rows)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!("\n{:=<60}", "");
            println!("Artist search complete");
            println!("  Already enriched: {}", summary.already_enriched);
            println!("  Exact matches: {}", summary.count(MatchType::Exact));
            println!("  Fuzzy matches: {}", summary.count(MatchType::Fuzzy));
            println!("  Not matched: {}", summary.not_matched);
            println!("  Failed: {}", summary.failed);
            println!("  Review file: {}", output.display());
            println!("{:=<60}", "");
            println!("Review the fuzzy matches, then run: enrich-artists apply {}", output.display());
        }

        Command::Dedupe { input, output } => {
            validate_output_path(&output, REVIEW_PATTERN, &[input.as_path(), config.database_path.as_path()])?;

            let rows = read_review_file(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let before = rows.len();
            let (kept, removed) = dedupe_enrichments(rows);
            write_review_file(&output, &kept)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!("Rows: {} -> {} ({} duplicates removed)", before, kept.len(), removed);
            println!("Written to {}", output.display());
        }

        Command::Apply { file } => {
            let rows =
                read_review_file(&file).with_context(|| format!("Failed to read {}", file.display()))?;

            let fuzzy: Vec<_> = rows.iter().filter(|r| r.match_type == MatchType::Fuzzy).collect();
            println!("Loaded {} enrichments", rows.len());
            println!("  Exact: {}", rows.len() - fuzzy.len());
            println!("  Fuzzy: {}", fuzzy.len());
            for row in fuzzy.iter().take(FUZZY_SAMPLE) {
                println!(
                    "    {} -> {} ({:.2})",
                    row.db_name, row.matched_name, row.similarity
                );
            }
            if fuzzy.len() > FUZZY_SAMPLE {
                println!("    ... and {} more", fuzzy.len() - FUZZY_SAMPLE);
            }

            let mut store = Store::open(&config.database_path).with_context(|| {
                format!("Failed to open database {}", config.database_path.display())
            })?;
            info!("Applying enrichments");
            let summary = apply_artist_enrichment(&mut store, &rows)?;

            println!("\n{:=<60}", "");
            println!("Enrichment applied");
            println!("  Artists updated: {}", summary.updated);
            println!("  Skipped (id owned by another artist): {}", summary.skipped_conflicts);
            println!("  Artists not found: {}", summary.missing_artists);
            println!("{:=<60}", "");
        }
    }

    println!("Elapsed: {}", format_duration(start.elapsed()));
    Ok(())
}
