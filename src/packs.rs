//! Pack creation workflows.
//!
//! Every workflow ends the same way: resolve titles against the catalog, then
//! write the pack row and all of its tracks, artists and links in a single
//! transaction.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ingest::add_tracks_in;
use crate::models::{ImportReport, NewPack, PackId, PackSummary, ParsedTrack, TrackPayload};
use crate::pacing::Pacer;
use crate::progress::{create_progress_bar, log_progress};
use crate::spotify::Catalog;
use crate::store::{create_pack, Store};
use crate::tracklist::{extract_episode_guest, parse_song_list, parse_track_list};
use crate::youtube::{VideoPage, VideoSource};

pub const TRACK_STAR_CHANNEL: &str = "https://www.youtube.com/@track-star-show/videos";

const FALLBACK_PACK_NAME: &str = "Track Star Pack";

/// Result of one pack creation.
#[derive(Debug, Clone, Serialize)]
pub struct PackOutcome {
    pub pack_id: i64,
    pub name: String,
    pub parsed: usize,
    pub matched: usize,
    pub unmatched: Vec<String>,
    pub report: ImportReport,
}

// ============================================================================
// Shared steps
// ============================================================================

/// Search the catalog for every parsed title. Returns matched payloads in
/// input order and the entries that found nothing. A failed search counts as
/// unmatched.
pub fn resolve_parsed_tracks<C: Catalog + ?Sized>(
    catalog: &mut C,
    parsed: &[ParsedTrack],
    pacer: &Pacer,
) -> Result<(Vec<TrackPayload>, Vec<ParsedTrack>)> {
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    let pb = create_progress_bar(parsed.len(), "Searching catalog");

    for (i, entry) in parsed.iter().enumerate() {
        match catalog.search_track(&entry.title, &entry.artist) {
            Ok(Some(track)) => {
                info!(
                    query = %entry.raw,
                    found = %format!("{} - {}", track.title, track.artist_display()),
                    "Found"
                );
                matched.push(track);
            }
            Ok(None) => {
                warn!(title = %entry.title, artist = %entry.artist, "Not found in catalog");
                unmatched.push(entry.clone());
            }
            Err(e) if e.is_batch_fatal() => return Err(e),
            Err(e) => {
                warn!(title = %entry.title, artist = %entry.artist, error = %e, "Search failed");
                unmatched.push(entry.clone());
            }
        }
        pb.inc(1);
        log_progress("search", i + 1, parsed.len(), 10);
        pacer.pause(i + 1, parsed.len());
    }

    pb.finish_and_clear();
    Ok((matched, unmatched))
}

/// Insert the pack and add every track to it, all in one transaction.
pub fn create_pack_with_tracks(
    store: &mut Store,
    pack: &NewPack,
    tracks: &[TrackPayload],
) -> Result<(PackId, ImportReport)> {
    store.in_transaction(|tx| {
        let pack_id = create_pack(tx, pack)?;
        let report = add_tracks_in(tx, pack_id, tracks)?;
        Ok((pack_id, report))
    })
}

fn finish_pack<C: Catalog + ?Sized>(
    store: &mut Store,
    catalog: &mut C,
    parsed: &[ParsedTrack],
    pack: impl FnOnce() -> NewPack,
    pacer: &Pacer,
) -> Result<PackOutcome> {
    let (tracks, unmatched) = resolve_parsed_tracks(catalog, parsed, pacer)?;
    if tracks.is_empty() {
        return Err(Error::Catalog("no tracks found in the catalog".to_string()));
    }
    info!(found = tracks.len(), total = parsed.len(), "Resolved titles");

    let pack = pack();
    let (pack_id, report) = create_pack_with_tracks(store, &pack, &tracks)?;
    info!(pack_id = pack_id.0, name = %pack.name, ?report, "Created pack");

    Ok(PackOutcome {
        pack_id: pack_id.0,
        name: pack.name,
        parsed: parsed.len(),
        matched: tracks.len() - report.skipped_malformed,
        unmatched: unmatched.into_iter().map(|p| p.raw).collect(),
        report,
    })
}

// ============================================================================
// YouTube
// ============================================================================

/// Custom name, else "Track Star - <guest>", else the video title.
pub fn youtube_pack_name(custom: Option<&str>, guest: Option<&str>, video_title: Option<&str>) -> String {
    custom
        .map(str::to_string)
        .or_else(|| guest.map(|g| format!("Track Star - {}", g)))
        .or_else(|| video_title.map(str::to_string))
        .unwrap_or_else(|| FALLBACK_PACK_NAME.to_string())
}

pub fn youtube_pack_description(url: &str) -> String {
    format!("Track list from Track Star episode\n\nSource: {}", url)
}

/// Build a pack from an already fetched video page.
pub fn pack_from_video<C: Catalog + ?Sized>(
    store: &mut Store,
    catalog: &mut C,
    page: &VideoPage,
    custom_name: Option<&str>,
    pacer: &Pacer,
) -> Result<PackOutcome> {
    let description = page.description.as_deref().ok_or_else(|| {
        Error::MalformedInput(format!("could not extract description from {}", page.url))
    })?;
    let parsed = parse_track_list(description);
    if parsed.is_empty() {
        return Err(Error::MalformedInput(format!(
            "could not parse a track list from {}",
            page.url
        )));
    }
    info!(tracks = parsed.len(), url = %page.url, "Parsed track list");

    finish_pack(
        store,
        catalog,
        &parsed,
        || NewPack {
            name: youtube_pack_name(
                custom_name,
                extract_episode_guest(description).as_deref(),
                page.title.as_deref(),
            ),
            description: Some(youtube_pack_description(&page.url)),
            tags: Vec::new(),
        },
        pacer,
    )
}

pub fn pack_from_youtube<C: Catalog + ?Sized>(
    store: &mut Store,
    catalog: &mut C,
    videos: &VideoSource,
    url: &str,
    custom_name: Option<&str>,
    pacer: &Pacer,
) -> Result<PackOutcome> {
    let page = videos.video(url)?;
    pack_from_video(store, catalog, &page, custom_name, pacer)
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ChannelSummary {
    pub created: Vec<PackOutcome>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// True when an existing pack description already cites `video_url`.
pub fn video_already_processed(video_url: &str, packs: &[PackSummary]) -> bool {
    packs.iter().any(|p| {
        p.pack
            .description
            .as_deref()
            .is_some_and(|d| d.contains(video_url))
    })
}

/// Create one pack per channel video. Videos already cited by a pack are
/// skipped unless `allow_duplicates`; a video that fails is recorded and the
/// run continues.
pub fn packs_from_channel<C, F>(
    store: &mut Store,
    catalog: &mut C,
    video_urls: &[String],
    mut fetch_page: F,
    allow_duplicates: bool,
    pacer: &Pacer,
) -> Result<ChannelSummary>
where
    C: Catalog + ?Sized,
    F: FnMut(&str) -> Result<VideoPage>,
{
    let existing = store.list_packs()?;
    let mut summary = ChannelSummary::default();

    for (i, url) in video_urls.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, video_urls.len(), url);
        if !allow_duplicates && video_already_processed(url, &existing) {
            info!(url = %url, "Already processed, skipping");
            summary.skipped.push(url.clone());
            continue;
        }

        let outcome = fetch_page(url).and_then(|page| pack_from_video(store, catalog, &page, None, pacer));
        match outcome {
            Ok(outcome) => summary.created.push(outcome),
            Err(e) if e.is_batch_fatal() => return Err(e),
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to create pack");
                summary.failed.push(url.clone());
            }
        }
    }

    Ok(summary)
}

// ============================================================================
// List files and playlists
// ============================================================================

pub fn list_pack_description(file_name: &str) -> String {
    format!("Custom song pack created from {}", file_name)
}

/// Build a pack from the contents of a "Title - Artist" list file.
pub fn pack_from_list<C: Catalog + ?Sized>(
    store: &mut Store,
    catalog: &mut C,
    text: &str,
    file_name: &str,
    pack_name: &str,
    tags: &[String],
    pacer: &Pacer,
) -> Result<PackOutcome> {
    let parsed = parse_song_list(text);
    if parsed.is_empty() {
        return Err(Error::MalformedInput(format!("no valid songs found in {}", file_name)));
    }
    info!(songs = parsed.len(), file = file_name, "Parsed song list");

    finish_pack(
        store,
        catalog,
        &parsed,
        || NewPack {
            name: pack_name.to_string(),
            description: Some(list_pack_description(file_name)),
            tags: tags.to_vec(),
        },
        pacer,
    )
}

/// Build a pack from every track of a catalog playlist, in playlist order.
pub fn pack_from_playlist<C: Catalog + ?Sized>(
    store: &mut Store,
    catalog: &mut C,
    playlist_ref: &str,
    custom_name: Option<&str>,
) -> Result<PackOutcome> {
    let playlist = catalog.playlist(playlist_ref)?;
    if playlist.tracks.is_empty() {
        return Err(Error::Catalog(format!("playlist {} has no tracks", playlist.name)));
    }

    let pack = NewPack {
        name: custom_name.map(str::to_string).unwrap_or_else(|| playlist.name.clone()),
        description: Some(format!("Pack created from Spotify playlist: {}", playlist.name)),
        tags: Vec::new(),
    };
    let (pack_id, report) = create_pack_with_tracks(store, &pack, &playlist.tracks)?;
    info!(pack_id = pack_id.0, name = %pack.name, ?report, "Created pack");

    Ok(PackOutcome {
        pack_id: pack_id.0,
        name: pack.name,
        parsed: playlist.tracks.len(),
        matched: playlist.tracks.len() - report.skipped_malformed,
        unmatched: Vec::new(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtistCredit, Playlist};
    use crate::testing::{track, FakeCatalog};

    fn catalog() -> FakeCatalog {
        FakeCatalog::default()
            .with_search("Song A", track("sa", "Song A", &[("a1", "Artist A")]))
            .with_search("Song B", track("sb", "Song B", &[("b1", "Artist B")]))
    }

    fn video_page(url: &str) -> VideoPage {
        VideoPage {
            url: url.to_string(),
            title: Some("Episode 12".to_string()),
            description: Some(
                "We had the best time having Mac DeMarco on the show.\n\n\
                 Track List:\nSong A - Artist A\nbadline\nMissing - Nobody\nSong B - Artist B\n\nOutro"
                    .to_string(),
            ),
        }
    }

    #[test]
    fn test_youtube_pack_name_fallbacks() {
        assert_eq!(youtube_pack_name(Some("Custom"), Some("Guest"), Some("Title")), "Custom");
        assert_eq!(youtube_pack_name(None, Some("Guest"), Some("Title")), "Track Star - Guest");
        assert_eq!(youtube_pack_name(None, None, Some("Title")), "Title");
        assert_eq!(youtube_pack_name(None, None, None), "Track Star Pack");
    }

    #[test]
    fn test_pack_from_video() {
        let mut store = Store::open_in_memory().unwrap();
        let mut catalog = catalog();
        let page = video_page("https://www.youtube.com/watch?v=abc");

        let outcome = pack_from_video(&mut store, &mut catalog, &page, None, &Pacer::none()).unwrap();
        assert_eq!(outcome.name, "Track Star - Mac DeMarco");
        assert_eq!(outcome.parsed, 3);
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.unmatched, vec!["Missing - Nobody"]);

        let packs = store.list_packs().unwrap();
        assert_eq!(packs[0].track_count, 2);
        assert!(packs[0].pack.description.as_deref().unwrap().ends_with("Source: https://www.youtube.com/watch?v=abc"));

        let entries = store.pack_tracks(PackId(outcome.pack_id)).unwrap();
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Song A", "Song B"]);
    }

    #[test]
    fn test_pack_not_created_when_nothing_matches() {
        let mut store = Store::open_in_memory().unwrap();
        let mut catalog = FakeCatalog::default();
        let page = video_page("https://www.youtube.com/watch?v=abc");

        let result = pack_from_video(&mut store, &mut catalog, &page, None, &Pacer::none());
        assert!(matches!(result, Err(Error::Catalog(_))));
        assert_eq!(store.counts().unwrap().packs, 0);
    }

    #[test]
    fn test_failed_search_counts_as_unmatched() {
        let mut catalog = catalog();
        catalog.failing_titles.insert("Song B".to_string());
        let parsed = parse_song_list("Song A - Artist A\nSong B - Artist B");

        let (matched, unmatched) = resolve_parsed_tracks(&mut catalog, &parsed, &Pacer::none()).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(unmatched[0].title, "Song B");
    }

    #[test]
    fn test_channel_skips_processed_videos() {
        let mut store = Store::open_in_memory().unwrap();
        let mut catalog = catalog();
        let first = "https://www.youtube.com/watch?v=one".to_string();
        let second = "https://www.youtube.com/watch?v=two".to_string();
        let broken = "https://www.youtube.com/watch?v=broken".to_string();

        pack_from_video(&mut store, &mut catalog, &video_page(&first), None, &Pacer::none()).unwrap();

        let urls = vec![first.clone(), second.clone(), broken.clone()];
        let summary = packs_from_channel(
            &mut store,
            &mut catalog,
            &urls,
            |url| {
                if url.ends_with("broken") {
                    Ok(VideoPage {
                        url: url.to_string(),
                        ..Default::default()
                    })
                } else {
                    Ok(video_page(url))
                }
            },
            false,
            &Pacer::none(),
        )
        .unwrap();

        assert_eq!(summary.skipped, vec![first]);
        assert_eq!(summary.created.len(), 1);
        assert_eq!(summary.failed, vec![broken]);
        assert_eq!(store.counts().unwrap().packs, 2);
        // Shared tracks are stored once
        assert_eq!(store.counts().unwrap().tracks, 2);
    }

    #[test]
    fn test_pack_from_list_with_tags() {
        let mut store = Store::open_in_memory().unwrap();
        let mut catalog = catalog();
        let text = "# picks\nSong B - Artist B\nSong A - Artist A\n";
        let tags = vec!["Rock".to_string(), "80s".to_string()];

        let outcome = pack_from_list(
            &mut store,
            &mut catalog,
            text,
            "picks.txt",
            "My Pack",
            &tags,
            &Pacer::none(),
        )
        .unwrap();

        let packs = store.list_packs().unwrap();
        assert_eq!(packs[0].pack.name, "My Pack");
        assert_eq!(packs[0].pack.tags, tags);
        assert_eq!(packs[0].pack.description.as_deref(), Some("Custom song pack created from picks.txt"));
        let entries = store.pack_tracks(PackId(outcome.pack_id)).unwrap();
        assert_eq!(entries[0].spotify_id, "sb");

        let empty = pack_from_list(&mut store, &mut catalog, "# nothing\n", "e.txt", "E", &[], &Pacer::none());
        assert!(matches!(empty, Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_pack_from_playlist() {
        let mut store = Store::open_in_memory().unwrap();
        let mut catalog = FakeCatalog::default();
        catalog.playlists.insert(
            "37i9dQZF1DXcBWIGoYBM5M".to_string(),
            Playlist {
                name: "Today's Top Hits".to_string(),
                tracks: vec![
                    track("p1", "First", &[("x", "X")]),
                    track("p2", "Second", &[("x", "X"), ("y", "Y")]),
                ],
            },
        );

        let outcome = pack_from_playlist(
            &mut store,
            &mut catalog,
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=1",
            None,
        )
        .unwrap();
        assert_eq!(outcome.name, "Today's Top Hits");
        assert_eq!(outcome.report.artists_resolved, 2);
        assert_eq!(outcome.report.artist_links_created, 3);
        assert_eq!(
            store.list_packs().unwrap()[0].pack.description.as_deref(),
            Some("Pack created from Spotify playlist: Today's Top Hits")
        );
    }

    #[test]
    fn test_playlist_payloads_cleaned_and_malformed_skipped() {
        let mut store = Store::open_in_memory().unwrap();
        let mut catalog = FakeCatalog::default();
        let mut messy = track("m1", "Redemption Song", &[]);
        messy.artists = vec![ArtistCredit::name_only("Bob  Marley")];
        messy.album_name = Some(String::new());
        messy.album_image_url = Some(" ".to_string());
        messy.isrc = Some(String::new());
        catalog.playlists.insert(
            "pl1".to_string(),
            Playlist {
                name: "Mixed".to_string(),
                tracks: vec![messy, track("m2", "", &[("z", "Z")])],
            },
        );

        let outcome = pack_from_playlist(&mut store, &mut catalog, "pl1", None).unwrap();
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.report.skipped_malformed, 1);
        assert_eq!(outcome.report.artist_links_created, 1);

        let entries = store.pack_tracks(PackId(outcome.pack_id)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].artists, vec!["Bob Marley"]);
        let stored = store.track_by_spotify_id("m1").unwrap().unwrap();
        assert_eq!(stored.album_name, None);
        assert_eq!(stored.album_image_url, None);
        assert_eq!(stored.isrc, None);
    }
}
