use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use trackpack::config::{load_env_files, Config};
use trackpack::packs::{
    pack_from_list, pack_from_playlist, pack_from_youtube, packs_from_channel, PackOutcome,
    TRACK_STAR_CHANNEL,
};
use trackpack::pacing::Pacer;
use trackpack::progress::{create_spinner, format_duration, init_logging};
use trackpack::spotify::SpotifyClient;
use trackpack::store::Store;
use trackpack::youtube::VideoSource;

#[derive(Parser)]
#[command(name = "pack-builder")]
#[command(about = "Create song packs from YouTube track lists, song list files and Spotify playlists")]
struct Args {
    /// Hide progress bars and log periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a pack from one Track Star episode
    Youtube {
        url: String,
        /// Pack name (default: guest name, then video title)
        name: Option<String>,
    },
    /// Create one pack per video on a channel
    Channel {
        #[arg(long, default_value = TRACK_STAR_CHANNEL)]
        url: String,

        /// Only process the first N videos
        #[arg(long)]
        limit: Option<usize>,

        /// Process videos that already have a pack
        #[arg(long)]
        allow_duplicates: bool,
    },
    /// Create a pack from a "Song Title - Artist Name" list file
    List {
        file: PathBuf,
        name: String,
        tags: Vec<String>,
    },
    /// Create a pack from a Spotify playlist URL, URI or id
    Playlist {
        playlist: String,
        name: Option<String>,
    },
    /// List packs with their track counts
    Packs {
        /// Also print each pack's tracks in order
        #[arg(long)]
        tracks: bool,
    },
}

fn print_outcome(outcome: &PackOutcome) {
    println!("\n{:=<60}", "");
    println!("Pack created: {}", outcome.name);
    println!("  Pack ID: {}", outcome.pack_id);
    println!("  Tracks found: {}/{}", outcome.matched, outcome.parsed);
    println!("  Tracks added: {}", outcome.report.pack_links_created);
    println!("  Artists: {}", outcome.report.artists_resolved);
    if !outcome.unmatched.is_empty() {
        println!("  Not found:");
        for line in &outcome.unmatched {
            println!("    - {}", line);
        }
    }
    println!("{:=<60}", "");
}

fn list_packs(store: &Store, with_tracks: bool) -> Result<()> {
    let packs = store.list_packs()?;
    if packs.is_empty() {
        println!("No packs found.");
        return Ok(());
    }

    println!("{:-<80}", "");
    for summary in &packs {
        let pack = &summary.pack;
        println!("[{}] {} ({} tracks)", pack.id, pack.name, summary.track_count);
        if !pack.tags.is_empty() {
            println!("    Tags: {}", pack.tags.join(", "));
        }
        println!("    Created: {}", pack.created_at);

        if with_tracks {
            for entry in store.pack_tracks(pack.id)? {
                let year = entry
                    .release_year
                    .map(|y| format!(" ({})", y))
                    .unwrap_or_default();
                println!(
                    "    {:>3}. {} - {}{}",
                    entry.position,
                    entry.title,
                    entry.artists.join(", "),
                    year
                );
            }
        }
    }
    println!("{:-<80}", "");
    println!("Total packs: {}", packs.len());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let env_files = load_env_files();
    init_logging(args.log_only);
    debug!(?env_files, "Loaded env files");

    let config = Config::from_env()?;
    let start = Instant::now();

    info!("Opening database: {}", config.database_path.display());
    let mut store = Store::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    match args.command {
        Command::Packs { tracks } => return list_packs(&store, tracks),

        Command::Youtube { url, name } => {
            let mut catalog = SpotifyClient::new(config.spotify()?.clone());
            let outcome = pack_from_youtube(
                &mut store,
                &mut catalog,
                &VideoSource::new(),
                &url,
                name.as_deref(),
                &Pacer::title_search(),
            )
            .with_context(|| format!("Failed to create pack from {}", url))?;
            print_outcome(&outcome);
        }

        Command::Channel {
            url,
            limit,
            allow_duplicates,
        } => {
            let mut catalog = SpotifyClient::new(config.spotify()?.clone());
            let videos = VideoSource::new();

            let spinner = create_spinner("Fetching channel videos");
            let video_urls = videos.channel_videos(&url, limit)?;
            spinner.finish_and_clear();
            if video_urls.is_empty() {
                bail!("No videos found on {}", url);
            }
            info!("Found {} videos", video_urls.len());

            let summary = packs_from_channel(
                &mut store,
                &mut catalog,
                &video_urls,
                |video_url| videos.video(video_url),
                allow_duplicates,
                &Pacer::title_search(),
            )?;

            for outcome in &summary.created {
                print_outcome(outcome);
            }
            println!("\nChannel summary:");
            println!("  Created: {}", summary.created.len());
            println!("  Skipped (already processed): {}", summary.skipped.len());
            println!("  Failed: {}", summary.failed.len());
            for failed in &summary.failed {
                println!("    - {}", failed);
            }
        }

        Command::List { file, name, tags } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let mut catalog = SpotifyClient::new(config.spotify()?.clone());
            let outcome = pack_from_list(
                &mut store,
                &mut catalog,
                &text,
                &file_name,
                &name,
                &tags,
                &Pacer::title_search(),
            )?;
            print_outcome(&outcome);
            if !tags.is_empty() {
                println!("Tags: {}", tags.join(", "));
            }
        }

        Command::Playlist { playlist, name } => {
            let mut catalog = SpotifyClient::new(config.spotify()?.clone());
            let outcome = pack_from_playlist(&mut store, &mut catalog, &playlist, name.as_deref())
                .with_context(|| format!("Failed to create pack from playlist {}", playlist))?;
            print_outcome(&outcome);
        }
    }

    println!("Elapsed: {}", format_duration(start.elapsed()));
    Ok(())
}
