//! Artist resolution for one batch.
//!
//! Credits arrive with a Spotify artist id, with only a display name, or as
//! both forms of the same artist spread across tracks. Resolution happens in
//! two steps:
//!
//! 1. An in-memory pass collapses every credit in the batch into distinct
//!    artists. Identical ids are one artist; a name-only credit joins the first
//!    id-bearing artist with the same name key, else an earlier name-only one.
//! 2. Each distinct artist is matched against the store and inserted or merged.
//!
//! The result is an explicit `ArtistLookup` from `ArtistKey` to `ArtistId`
//! that the association stage reads credit by credit.

use rusqlite::{named_params, params, Connection, OptionalExtension};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::Result;
use crate::merge::{assignment, fill_missing, Incoming, MergeRule};
use crate::models::{ArtistCredit, ArtistId, TrackPayload};
use crate::normalize::{clean_text, name_key, normalize_external_id};
use crate::store::NOW_SQL;

/// Lookup key of a credit: its Spotify id when present, else its name key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtistKey {
    Spotify(String),
    Name(String),
}

impl ArtistKey {
    /// None for a credit with neither an id nor a usable name.
    pub fn for_credit(credit: &ArtistCredit) -> Option<Self> {
        if let Some(id) = credit.spotify_id.as_deref().and_then(normalize_external_id) {
            return Some(ArtistKey::Spotify(id));
        }
        credit_name(&credit.name).map(|(_, key)| ArtistKey::Name(key))
    }
}

/// Cleaned display name and its name key. Both the in-memory pass and the
/// lookup derive keys here, so a credit always finds the artist it created.
fn credit_name(raw: &str) -> Option<(String, String)> {
    let name = clean_text(Some(raw))?;
    let key = name_key(&name);
    Some((name, key))
}

/// Resolved artists of one batch.
#[derive(Debug, Default)]
pub struct ArtistLookup {
    ids: FxHashMap<ArtistKey, ArtistId>,
}

impl ArtistLookup {
    pub fn get(&self, credit: &ArtistCredit) -> Option<ArtistId> {
        ArtistKey::for_credit(credit).and_then(|key| self.ids.get(&key).copied())
    }

    /// Number of distinct stored artists the batch resolved to.
    pub fn distinct_artists(&self) -> usize {
        self.ids.values().collect::<FxHashSet<_>>().len()
    }
}

/// One distinct artist found by the in-memory pass.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DistinctArtist {
    spotify_id: Option<String>,
    name: Option<String>,
    name_key: Option<String>,
    keys: Vec<ArtistKey>,
}

// ============================================================================
// In-memory dedup
// ============================================================================

fn collect_distinct(tracks: &[TrackPayload]) -> Vec<DistinctArtist> {
    let mut artists: Vec<DistinctArtist> = Vec::new();
    let mut by_id: FxHashMap<String, usize> = FxHashMap::default();
    let mut by_name: FxHashMap<String, usize> = FxHashMap::default();

    let credits = || tracks.iter().flat_map(|t| t.artists.iter());

    // Id-bearing credits first so a name-only credit can join them regardless
    // of where it sits in the batch.
    for credit in credits() {
        let Some(id) = credit.spotify_id.as_deref().and_then(normalize_external_id) else {
            continue;
        };
        let (name, key) = credit_name(&credit.name).unzip();

        if let Some(&idx) = by_id.get(&id) {
            let artist = &mut artists[idx];
            if artist.name.is_none() {
                fill_missing(&mut artist.name, name);
                fill_missing(&mut artist.name_key, key.clone());
                if let Some(key) = key {
                    by_name.entry(key).or_insert(idx);
                }
            }
            continue;
        }

        let idx = artists.len();
        by_id.insert(id.clone(), idx);
        if let Some(key) = &key {
            by_name.entry(key.clone()).or_insert(idx);
        }
        artists.push(DistinctArtist {
            spotify_id: Some(id.clone()),
            name,
            name_key: key,
            keys: vec![ArtistKey::Spotify(id)],
        });
    }

    for credit in credits() {
        if credit.spotify_id.as_deref().and_then(normalize_external_id).is_some() {
            continue;
        }
        let Some((name, key)) = credit_name(&credit.name) else {
            continue;
        };
        let name_key_entry = ArtistKey::Name(key.clone());

        match by_name.get(&key) {
            Some(&idx) => {
                let artist = &mut artists[idx];
                if !artist.keys.contains(&name_key_entry) {
                    artist.keys.push(name_key_entry);
                }
            }
            None => {
                by_name.insert(key.clone(), artists.len());
                artists.push(DistinctArtist {
                    spotify_id: None,
                    name: Some(name),
                    name_key: Some(key),
                    keys: vec![name_key_entry],
                });
            }
        }
    }

    artists
}

// ============================================================================
// Store resolution
// ============================================================================

fn fill_name_sql() -> String {
    format!(
        "UPDATE artists SET {}, {}, updated_at = {} WHERE id = :id",
        assignment("artists", "name", MergeRule::FillMissing, Incoming::Named),
        assignment("artists", "name_key", MergeRule::FillMissing, Incoming::Named),
        NOW_SQL
    )
}

fn insert_artist(conn: &Connection, artist: &DistinctArtist) -> Result<ArtistId> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO artists (spotify_artist_id, name, name_key) VALUES (?1, ?2, ?3) RETURNING id",
    )?;
    let id: i64 = stmt.query_row(
        params![artist.spotify_id, artist.name, artist.name_key],
        |row| row.get(0),
    )?;
    Ok(ArtistId(id))
}

fn resolve_with_id(conn: &Connection, spotify_id: &str, artist: &DistinctArtist) -> Result<ArtistId> {
    let existing: Option<i64> = conn
        .prepare_cached("SELECT id FROM artists WHERE spotify_artist_id = ?1")?
        .query_row([spotify_id], |row| row.get(0))
        .optional()?;

    if let Some(id) = existing {
        conn.prepare_cached(&fill_name_sql())?.execute(named_params! {
            ":id": id,
            ":name": artist.name,
            ":name_key": artist.name_key,
        })?;
        return Ok(ArtistId(id));
    }

    // Adopt a name-only row recorded before the id was known
    if let Some(key) = &artist.name_key {
        let adopted: Option<i64> = conn
            .prepare_cached(
                "SELECT id FROM artists
                 WHERE spotify_artist_id IS NULL AND name_key = ?1
                 ORDER BY id LIMIT 1",
            )?
            .query_row([key], |row| row.get(0))
            .optional()?;

        if let Some(id) = adopted {
            debug!(artist_id = id, spotify_id, "Adopting name-only artist");
            conn.prepare_cached(&format!(
                "UPDATE artists SET spotify_artist_id = :spotify_id, {}, updated_at = {} WHERE id = :id",
                assignment("artists", "name", MergeRule::FillMissing, Incoming::Named),
                NOW_SQL
            ))?
            .execute(named_params! {
                ":id": id,
                ":spotify_id": spotify_id,
                ":name": artist.name,
            })?;
            return Ok(ArtistId(id));
        }
    }

    insert_artist(conn, artist)
}

fn resolve_by_name(conn: &Connection, key: &str, artist: &DistinctArtist) -> Result<ArtistId> {
    let existing: Option<i64> = conn
        .prepare_cached(
            "SELECT id FROM artists WHERE name_key = ?1
             ORDER BY (spotify_artist_id IS NULL), id LIMIT 1",
        )?
        .query_row([key], |row| row.get(0))
        .optional()?;

    match existing {
        Some(id) => Ok(ArtistId(id)),
        None => insert_artist(conn, artist),
    }
}

/// Resolve every artist credited in `tracks` to a stored artist, inserting
/// or merging rows as needed.
pub fn resolve_artists(conn: &Connection, tracks: &[TrackPayload]) -> Result<ArtistLookup> {
    let mut lookup = ArtistLookup::default();

    // Id-bearing artists come first in `collect_distinct`'s output, so a
    // name-only row adopted here is not also matched by a name-only entry.
    for artist in collect_distinct(tracks) {
        let id = match (&artist.spotify_id, &artist.name_key) {
            (Some(spotify_id), _) => resolve_with_id(conn, spotify_id, &artist)?,
            (None, Some(key)) => resolve_by_name(conn, key, &artist)?,
            (None, None) => continue,
        };
        for key in &artist.keys {
            lookup.ids.insert(key.clone(), id);
        }
    }

    Ok(lookup)
}
