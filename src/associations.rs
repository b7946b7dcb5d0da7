//! Ordered track/artist and pack/track links.
//!
//! Positions are 1-based and assigned once: re-inserting an existing pair is
//! a no-op, so a re-run never renumbers anything.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{ArtistId, PackId, TrackId};

/// Link a track to its artists in credit order. Returns newly created links.
pub fn link_track_artists(conn: &Connection, track_id: TrackId, artists: &[ArtistId]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO track_artists (track_id, artist_id, position) VALUES (?1, ?2, ?3)
         ON CONFLICT(track_id, artist_id) DO NOTHING",
    )?;
    let mut created = 0;
    for (i, artist_id) in artists.iter().enumerate() {
        created += stmt.execute(params![track_id.0, artist_id.0, (i + 1) as i64])?;
    }
    Ok(created)
}

/// Link tracks to a pack in batch order. A track repeated in the batch keeps
/// its first position. Returns newly created links.
pub fn link_pack_tracks(conn: &Connection, pack_id: PackId, tracks: &[TrackId]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO pack_tracks (pack_id, track_id, position) VALUES (?1, ?2, ?3)
         ON CONFLICT(pack_id, track_id) DO NOTHING",
    )?;
    let mut created = 0;
    for (i, track_id) in tracks.iter().enumerate() {
        created += stmt.execute(params![pack_id.0, track_id.0, (i + 1) as i64])?;
    }
    Ok(created)
}
