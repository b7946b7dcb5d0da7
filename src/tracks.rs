//! Track upsert keyed by Spotify track id.

use rusqlite::{params, Connection};
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::merge::{set_clause, Incoming, MergeRule};
use crate::models::{TrackId, TrackPayload};
use crate::store::NOW_SQL;

/// Per-column merge rules for `tracks`. Title always follows the latest source.
pub const TRACK_FIELDS: &[(&str, MergeRule)] = &[
    ("title", MergeRule::Overwrite),
    ("album_name", MergeRule::FillMissing),
    ("album_image_url", MergeRule::FillMissing),
    ("release_year", MergeRule::FillMissing),
    ("spotify_popularity", MergeRule::FillMissing),
    ("isrc", MergeRule::FillMissing),
];

fn upsert_sql() -> String {
    format!(
        "INSERT INTO tracks
            (spotify_id, title, album_name, album_image_url, release_year, spotify_popularity, isrc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(spotify_id) DO UPDATE SET {}, updated_at = {}
         RETURNING id",
        set_clause("tracks", TRACK_FIELDS, Incoming::Excluded),
        NOW_SQL
    )
}

/// Insert unseen tracks and merge known ones. Returns the internal id of
/// every payload keyed by its Spotify id.
pub fn upsert_tracks(
    conn: &Connection,
    tracks: &[TrackPayload],
) -> Result<FxHashMap<String, TrackId>> {
    let sql = upsert_sql();
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut ids: FxHashMap<String, TrackId> = FxHashMap::default();

    for track in tracks {
        let id: i64 = stmt.query_row(
            params![
                track.spotify_id,
                track.title,
                track.album_name,
                track.album_image_url,
                track.release_year,
                track.popularity,
                track.isrc,
            ],
            |row| row.get(0),
        )?;
        ids.insert(track.spotify_id.clone(), TrackId(id));
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn payload(id: &str, title: &str) -> TrackPayload {
        TrackPayload {
            spotify_id: id.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_sql_uses_merge_rules() {
        let sql = upsert_sql();
        assert!(sql.contains("title = COALESCE(excluded.title, tracks.title)"));
        assert!(sql.contains("release_year = COALESCE(tracks.release_year, excluded.release_year)"));
    }

    #[test]
    fn test_merge_never_clobbers() {
        let mut store = Store::open_in_memory().unwrap();
        let first = TrackPayload {
            release_year: Some(1999),
            ..payload("t1", "Song")
        };
        store.in_transaction(|tx| upsert_tracks(tx, &[first])).unwrap();

        let second = TrackPayload {
            release_year: None,
            album_image_url: Some("X".to_string()),
            ..payload("t1", "Song")
        };
        store.in_transaction(|tx| upsert_tracks(tx, &[second])).unwrap();

        let stored = store.track_by_spotify_id("t1").unwrap().unwrap();
        assert_eq!(stored.release_year, Some(1999));
        assert_eq!(stored.album_image_url.as_deref(), Some("X"));
    }

    #[test]
    fn test_fill_missing_keeps_first_value() {
        let mut store = Store::open_in_memory().unwrap();
        let first = TrackPayload {
            album_name: Some("Original".to_string()),
            ..payload("t1", "Song")
        };
        let second = TrackPayload {
            album_name: Some("Compilation".to_string()),
            popularity: Some(42),
            ..payload("t1", "Song (Remastered)")
        };
        store
            .in_transaction(|tx| upsert_tracks(tx, &[first, second]))
            .unwrap();

        let stored = store.track_by_spotify_id("t1").unwrap().unwrap();
        assert_eq!(stored.album_name.as_deref(), Some("Original"));
        assert_eq!(stored.popularity, Some(42));
        // Title follows the latest source
        assert_eq!(stored.title, "Song (Remastered)");
    }

    #[test]
    fn test_upsert_returns_stable_ids() {
        let mut store = Store::open_in_memory().unwrap();
        let batch = vec![payload("a", "A"), payload("b", "B")];
        let first = store.in_transaction(|tx| upsert_tracks(tx, &batch)).unwrap();
        let second = store.in_transaction(|tx| upsert_tracks(tx, &batch)).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(store.counts().unwrap().tracks, 2);
    }
}
