//! SQLite persistence for packs, tracks, artists and their links.
//!
//! ## Schema
//!
//! ```sql
//! packs(id, name, description, tags JSON, created_at)
//! tracks(id, spotify_id UNIQUE, title, album_name, album_image_url,
//!        release_year, spotify_popularity, isrc, created_at, updated_at)
//! artists(id, spotify_artist_id UNIQUE, name, name_key, genres JSON,
//!         spotify_followers, spotify_popularity, image_url, created_at, updated_at)
//! track_artists(track_id, artist_id, position)  PRIMARY KEY (track_id, artist_id)
//! pack_tracks(pack_id, track_id, position)      PRIMARY KEY (pack_id, track_id)
//! ```
//!
//! Writes happen inside `Store::in_transaction`; the upsert stages take the
//! transaction as a plain `&Connection`.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;

use crate::error::Result;
use crate::merge::parse_list;
use crate::models::{
    ArtistId, NewPack, Pack, PackId, PackSummary, PackTrackEntry, StoredArtist, StoredTrack,
    TrackId,
};

/// SQLite expression for "now" used by every timestamp column.
pub const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS packs (
        id          INTEGER PRIMARY KEY,
        name        TEXT NOT NULL,
        description TEXT,
        tags        TEXT NOT NULL DEFAULT '[]',
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS tracks (
        id                 INTEGER PRIMARY KEY,
        spotify_id         TEXT NOT NULL UNIQUE,
        title              TEXT NOT NULL,
        album_name         TEXT,
        album_image_url    TEXT,
        release_year       INTEGER,
        spotify_popularity INTEGER CHECK (spotify_popularity BETWEEN 0 AND 100),
        isrc               TEXT,
        created_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS artists (
        id                 INTEGER PRIMARY KEY,
        spotify_artist_id  TEXT UNIQUE,
        name               TEXT,
        name_key           TEXT,
        genres             TEXT,
        spotify_followers  INTEGER,
        spotify_popularity INTEGER,
        image_url          TEXT,
        created_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
    CREATE INDEX IF NOT EXISTS idx_artists_name_key ON artists(name_key);

    CREATE TABLE IF NOT EXISTS track_artists (
        track_id  INTEGER NOT NULL REFERENCES tracks(id),
        artist_id INTEGER NOT NULL REFERENCES artists(id),
        position  INTEGER NOT NULL CHECK (position >= 1),
        PRIMARY KEY (track_id, artist_id)
    );

    CREATE TABLE IF NOT EXISTS pack_tracks (
        pack_id  INTEGER NOT NULL REFERENCES packs(id),
        track_id INTEGER NOT NULL REFERENCES tracks(id),
        position INTEGER NOT NULL CHECK (position >= 1),
        PRIMARY KEY (pack_id, track_id)
    );
";

/// Row counts, used by the tools' summaries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreCounts {
    pub packs: usize,
    pub tracks: usize,
    pub artists: usize,
    pub track_artists: usize,
    pub pack_tracks: usize,
}

/// A track selected for metadata backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillCandidate {
    pub id: TrackId,
    pub spotify_id: String,
    pub title: String,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one transaction: commit when it returns Ok, roll back
    /// every write when it returns Err.
    pub fn in_transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.transaction()?;
        // Dropping `tx` without commit rolls back.
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ------------------------------------------------------------------------
    // Packs
    // ------------------------------------------------------------------------

    pub fn list_packs(&self) -> Result<Vec<PackSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.description, p.tags, p.created_at, COUNT(pt.track_id)
             FROM packs p
             LEFT JOIN pack_tracks pt ON pt.pack_id = p.id
             GROUP BY p.id
             ORDER BY p.created_at DESC, p.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let tags: String = row.get(3)?;
            let count: i64 = row.get(5)?;
            Ok((
                Pack {
                    id: PackId(row.get(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                    tags: Vec::new(),
                    created_at: row.get(4)?,
                },
                tags,
                count,
            ))
        })?;

        let mut packs = Vec::new();
        for row in rows {
            let (mut pack, tags, count) = row?;
            pack.tags = serde_json::from_str(&tags)?;
            packs.push(PackSummary {
                pack,
                track_count: count as usize,
            });
        }
        Ok(packs)
    }

    /// Tracks of a pack in stored position order, with credited artist names.
    pub fn pack_tracks(&self, pack_id: PackId) -> Result<Vec<PackTrackEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT pt.position, t.id, t.spotify_id, t.title, t.release_year, t.album_name
             FROM pack_tracks pt
             JOIN tracks t ON t.id = pt.track_id
             WHERE pt.pack_id = ?1
             ORDER BY pt.position, t.id",
        )?;
        let mut entries = stmt
            .query_map([pack_id.0], |row| {
                Ok(PackTrackEntry {
                    position: row.get(0)?,
                    track_id: TrackId(row.get(1)?),
                    spotify_id: row.get(2)?,
                    title: row.get(3)?,
                    artists: Vec::new(),
                    release_year: row.get(4)?,
                    album_name: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for entry in &mut entries {
            entry.artists = self.track_artist_names(entry.track_id)?;
        }
        Ok(entries)
    }

    fn track_artist_names(&self, track_id: TrackId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT COALESCE(a.name, '') FROM track_artists ta
             JOIN artists a ON a.id = ta.artist_id
             WHERE ta.track_id = ?1
             ORDER BY ta.position",
        )?;
        let names = stmt
            .query_map([track_id.0], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// (track, position) links of a pack, ordered by position.
    pub fn pack_links(&self, pack_id: PackId) -> Result<Vec<(TrackId, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id, position FROM pack_tracks WHERE pack_id = ?1 ORDER BY position, track_id",
        )?;
        let links = stmt
            .query_map([pack_id.0], |row| Ok((TrackId(row.get(0)?), row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }

    // ------------------------------------------------------------------------
    // Tracks
    // ------------------------------------------------------------------------

    pub fn track_by_spotify_id(&self, spotify_id: &str) -> Result<Option<StoredTrack>> {
        let track = self
            .conn
            .query_row(
                "SELECT id, spotify_id, title, album_name, album_image_url, release_year,
                        spotify_popularity, isrc, created_at, updated_at
                 FROM tracks WHERE spotify_id = ?1",
                [spotify_id],
                |row| {
                    Ok(StoredTrack {
                        id: TrackId(row.get(0)?),
                        spotify_id: row.get(1)?,
                        title: row.get(2)?,
                        album_name: row.get(3)?,
                        album_image_url: row.get(4)?,
                        release_year: row.get(5)?,
                        popularity: row.get(6)?,
                        isrc: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(track)
    }

    /// (artist, position) credits of a track, ordered by position.
    pub fn track_artist_links(&self, track_id: TrackId) -> Result<Vec<(ArtistId, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT artist_id, position FROM track_artists WHERE track_id = ?1 ORDER BY position",
        )?;
        let links = stmt
            .query_map([track_id.0], |row| Ok((ArtistId(row.get(0)?), row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }

    /// Tracks whose artwork is still missing, newest first.
    /// With `force_all`, every track is returned.
    pub fn tracks_needing_backfill(
        &self,
        limit: Option<usize>,
        force_all: bool,
    ) -> Result<Vec<BackfillCandidate>> {
        let filter = if force_all {
            ""
        } else {
            "WHERE album_image_url IS NULL"
        };
        let sql = format!(
            "SELECT id, spotify_id, title FROM tracks {} ORDER BY created_at DESC, id DESC LIMIT ?1",
            filter
        );
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map([limit], |row| {
                Ok(BackfillCandidate {
                    id: TrackId(row.get(0)?),
                    spotify_id: row.get(1)?,
                    title: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    // ------------------------------------------------------------------------
    // Artists
    // ------------------------------------------------------------------------

    pub fn artist(&self, id: ArtistId) -> Result<Option<StoredArtist>> {
        let artist = self
            .conn
            .query_row(
                "SELECT id, spotify_artist_id, name, genres, spotify_followers,
                        spotify_popularity, image_url
                 FROM artists WHERE id = ?1",
                [id.0],
                parse_artist_row,
            )
            .optional()?;
        Ok(artist)
    }

    /// All artists ordered by name, as the enrichment fetch phase walks them.
    pub fn all_artists(&self) -> Result<Vec<StoredArtist>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, spotify_artist_id, name, genres, spotify_followers,
                    spotify_popularity, image_url
             FROM artists ORDER BY name, id",
        )?;
        let artists = stmt
            .query_map([], parse_artist_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };
        Ok(StoreCounts {
            packs: count("packs")?,
            tracks: count("tracks")?,
            artists: count("artists")?,
            track_artists: count("track_artists")?,
            pack_tracks: count("pack_tracks")?,
        })
    }
}

/// Insert a pack row. Takes a plain connection so it can run inside the same
/// transaction as the tracks it will hold.
pub fn create_pack(conn: &Connection, pack: &NewPack) -> Result<PackId> {
    let tags = serde_json::to_string(&pack.tags)?;
    let id: i64 = conn.query_row(
        "INSERT INTO packs (name, description, tags) VALUES (?1, ?2, ?3) RETURNING id",
        params![pack.name, pack.description, tags],
        |row| row.get(0),
    )?;
    Ok(PackId(id))
}

fn parse_artist_row(row: &rusqlite::Row) -> rusqlite::Result<StoredArtist> {
    Ok(StoredArtist {
        id: ArtistId(row.get(0)?),
        spotify_artist_id: row.get(1)?,
        name: row.get(2)?,
        genres: parse_list(row.get(3)?),
        followers: row.get(4)?,
        popularity: row.get(5)?,
        image_url: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_list_packs() {
        let mut store = Store::open_in_memory().unwrap();
        let id = store
            .in_transaction(|tx| {
                create_pack(
                    tx,
                    &NewPack {
                        name: "Rolling Stone Top 100".to_string(),
                        description: Some("Custom song pack".to_string()),
                        tags: vec!["Classic Rock".to_string(), "70s".to_string()],
                    },
                )
            })
            .unwrap();

        let packs = store.list_packs().unwrap();
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].pack.id, id);
        assert_eq!(packs[0].pack.tags, vec!["Classic Rock", "70s"]);
        assert_eq!(packs[0].track_count, 0);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let mut store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.in_transaction(|tx| {
            create_pack(tx, &NewPack {
                name: "Doomed".to_string(),
                ..Default::default()
            })?;
            // Violates the NOT NULL constraint on title
            tx.execute("INSERT INTO tracks (spotify_id, title) VALUES ('x', NULL)", [])?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(store.counts().unwrap(), StoreCounts::default());
    }

    #[test]
    fn test_schema_is_reapplied_safely() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packs.sqlite3");
        {
            let mut store = Store::open(&path).unwrap();
            store
                .in_transaction(|tx| {
                    create_pack(tx, &NewPack {
                        name: "Persisted".to_string(),
                        ..Default::default()
                    })
                })
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.counts().unwrap().packs, 1);
    }

    #[test]
    fn test_tracks_needing_backfill_filters_missing_artwork() {
        let store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO tracks (spotify_id, title, album_image_url) VALUES ('a', 'A', 'img');
                 INSERT INTO tracks (spotify_id, title) VALUES ('b', 'B');
                 INSERT INTO tracks (spotify_id, title) VALUES ('c', 'C');",
            )
            .unwrap();

        let missing = store.tracks_needing_backfill(None, false).unwrap();
        let ids: Vec<_> = missing.iter().map(|t| t.spotify_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        assert_eq!(store.tracks_needing_backfill(None, true).unwrap().len(), 3);
        assert_eq!(store.tracks_needing_backfill(Some(1), true).unwrap().len(), 1);
    }
}
