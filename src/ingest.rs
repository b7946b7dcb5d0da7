//! Batch import: validation, then tracks, artists and links in one transaction.
//!
//! ```text
//! RawTrack ──validate──> TrackPayload ──> upsert_tracks ──> resolve_artists
//!                                               │                  │
//!                                               └──> link_track_artists / link_pack_tracks
//! ```

use rusqlite::Connection;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::artists::resolve_artists;
use crate::associations::{link_pack_tracks, link_track_artists};
use crate::error::{Error, Result};
use crate::models::{
    ArtistCredit, ArtistsField, ImportReport, PackId, RawTrack, TrackId, TrackPayload,
};
use crate::normalize::{
    accept_popularity, accept_release_year, clean_text, normalize_external_id,
    split_legacy_artists,
};
use crate::store::Store;

// ============================================================================
// Validation
// ============================================================================

fn clean_credits(field: Option<ArtistsField>) -> Vec<ArtistCredit> {
    match field {
        None => Vec::new(),
        Some(ArtistsField::Legacy(names)) => split_legacy_artists(&names),
        Some(ArtistsField::Credits(credits)) => credits
            .into_iter()
            .filter_map(|credit| {
                let spotify_id = credit.spotify_id.as_deref().and_then(normalize_external_id);
                let name = clean_text(Some(&credit.name)).unwrap_or_default();
                if spotify_id.is_none() && name.is_empty() {
                    return None;
                }
                Some(ArtistCredit { spotify_id, name })
            })
            .collect(),
    }
}

/// Turn a raw record into a payload. Missing id or title is `MalformedInput`;
/// out-of-range year or popularity is dropped to unknown.
pub fn validate(raw: RawTrack) -> Result<TrackPayload> {
    let spotify_id = raw
        .spotify_id
        .as_deref()
        .and_then(normalize_external_id)
        .ok_or_else(|| Error::MalformedInput("missing spotify_id".to_string()))?;
    let title = clean_text(raw.title.as_deref())
        .ok_or_else(|| Error::MalformedInput(format!("track {} has no title", spotify_id)))?;

    Ok(TrackPayload {
        spotify_id,
        title,
        artists: clean_credits(raw.artists),
        album_name: clean_text(raw.album_name.as_deref()),
        album_image_url: clean_text(raw.album_image_url.as_deref()),
        release_year: raw.release_year.and_then(accept_release_year),
        popularity: raw.popularity.and_then(accept_popularity),
        isrc: clean_text(raw.isrc.as_deref()),
    })
}

/// Validate a batch, skipping malformed records with a warning.
/// Returns the payloads and the number skipped.
pub fn validate_batch(raw: Vec<RawTrack>) -> (Vec<TrackPayload>, usize) {
    let mut payloads = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for (i, record) in raw.into_iter().enumerate() {
        match validate(record) {
            Ok(payload) => payloads.push(payload),
            Err(e) => {
                warn!(index = i, error = %e, "Skipping malformed track");
                skipped += 1;
            }
        }
    }
    (payloads, skipped)
}

/// Re-validate payloads built outside `validate` (catalog responses,
/// playlists) so they are cleaned the same way as raw records.
pub fn validate_payloads(tracks: &[TrackPayload]) -> (Vec<TrackPayload>, usize) {
    validate_batch(tracks.iter().cloned().map(RawTrack::from).collect())
}

// ============================================================================
// Upsert pipeline
// ============================================================================

/// Upsert tracks, resolve artists and link credits. Runs on whatever
/// connection or transaction it is handed. Payloads are re-validated first;
/// malformed ones are skipped and counted. The returned map is keyed by the
/// normalized Spotify id.
pub fn upsert_batch(
    conn: &Connection,
    tracks: &[TrackPayload],
) -> Result<(FxHashMap<String, TrackId>, ImportReport)> {
    let (tracks, skipped) = validate_payloads(tracks);
    let track_ids = crate::tracks::upsert_tracks(conn, &tracks)?;
    let lookup = resolve_artists(conn, &tracks)?;

    let mut report = ImportReport {
        tracks_upserted: track_ids.len(),
        artists_resolved: lookup.distinct_artists(),
        skipped_malformed: skipped,
        ..Default::default()
    };

    for track in &tracks {
        let Some(&track_id) = track_ids.get(&track.spotify_id) else {
            continue;
        };
        let artist_ids: Vec<_> = track
            .artists
            .iter()
            .filter_map(|credit| lookup.get(credit))
            .collect();
        report.artist_links_created += link_track_artists(conn, track_id, &artist_ids)?;
    }

    debug!(?report, "Upserted batch");
    Ok((track_ids, report))
}

/// Add `tracks` to an existing pack on an open connection or transaction.
pub fn add_tracks_in(conn: &Connection, pack_id: PackId, tracks: &[TrackPayload]) -> Result<ImportReport> {
    let (track_ids, mut report) = upsert_batch(conn, tracks)?;

    let ordered: Vec<TrackId> = tracks
        .iter()
        .filter_map(|t| normalize_external_id(&t.spotify_id))
        .filter_map(|id| track_ids.get(&id).copied())
        .collect();
    report.pack_links_created = link_pack_tracks(conn, pack_id, &ordered)?;

    Ok(report)
}

/// Upsert `tracks`, their artists and credits, and link them to `pack_id` in
/// batch order. All writes happen in one transaction; any error rolls back.
pub fn add_tracks_to_pack(store: &mut Store, pack_id: PackId, tracks: &[TrackPayload]) -> Result<ImportReport> {
    store.in_transaction(|tx| add_tracks_in(tx, pack_id, tracks))
}

/// Validate raw records, then `add_tracks_to_pack` the valid ones.
pub fn import_raw_tracks(store: &mut Store, pack_id: PackId, raw: Vec<RawTrack>) -> Result<ImportReport> {
    let (payloads, skipped) = validate_batch(raw);
    let mut report = add_tracks_to_pack(store, pack_id, &payloads)?;
    report.skipped_malformed += skipped;
    Ok(report)
}
