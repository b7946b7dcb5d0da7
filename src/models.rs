//! Core data models for pack building.
//!
//! This module contains the identifiers, payloads and stored records that
//! flow between the parsers, the catalog client and the upsert pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Internal Identifiers
// ============================================================================

/// Rowid of a `packs` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackId(pub i64);

/// Rowid of a `tracks` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub i64);

/// Rowid of an `artists` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtistId(pub i64);

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ArtistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Incoming Payloads
// ============================================================================

/// One credited artist on a track, in billing order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCredit {
    pub spotify_id: Option<String>,
    pub name: String,
}

impl ArtistCredit {
    pub fn new(spotify_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            spotify_id: Some(spotify_id.into()),
            name: name.into(),
        }
    }

    pub fn name_only(name: impl Into<String>) -> Self {
        Self {
            spotify_id: None,
            name: name.into(),
        }
    }
}

/// Artist information as it arrives from a source: either structured credits
/// or the legacy single "A, B, C" string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtistsField {
    Credits(Vec<ArtistCredit>),
    Legacy(String),
}

/// Unvalidated track dict from a scrape, a file or a catalog response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrack {
    pub spotify_id: Option<String>,
    pub title: Option<String>,
    pub artists: Option<ArtistsField>,
    pub album_name: Option<String>,
    pub album_image_url: Option<String>,
    pub release_year: Option<i32>,
    pub popularity: Option<i32>,
    pub isrc: Option<String>,
}

/// Validated track payload, ready for the upsert pipeline.
/// `spotify_id` and `title` are guaranteed non-empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackPayload {
    pub spotify_id: String,
    pub title: String,
    pub artists: Vec<ArtistCredit>, // billing order, lead artist first
    pub album_name: Option<String>,
    pub album_image_url: Option<String>,
    pub release_year: Option<i32>, // 1900..=2100
    pub popularity: Option<i32>,   // 0..=100
    pub isrc: Option<String>,
}

impl TrackPayload {
    /// Artist names joined the way the scripts print them.
    pub fn artist_display(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Lets catalog payloads go back through validation.
impl From<TrackPayload> for RawTrack {
    fn from(track: TrackPayload) -> Self {
        RawTrack {
            spotify_id: Some(track.spotify_id),
            title: Some(track.title),
            artists: Some(ArtistsField::Credits(track.artists)),
            album_name: track.album_name,
            album_image_url: track.album_image_url,
            release_year: track.release_year,
            popularity: track.popularity,
            isrc: track.isrc,
        }
    }
}

/// A (title, artist) pair parsed from a description or a list file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedTrack {
    pub title: String,
    pub artist: String,
    pub raw: String,
    pub line: Option<usize>, // 1-based, list files only
}

/// A Spotify playlist with its tracks in playlist order.
#[derive(Clone, Debug, Default)]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<TrackPayload>,
}

/// Candidate from a catalog artist search, in rank order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCandidate {
    pub spotify_id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub followers: i64,
    pub popularity: i32,
    pub image_url: Option<String>,
}

// ============================================================================
// Stored Records
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct NewPack {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Pack {
    pub id: PackId,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct PackSummary {
    pub pack: Pack,
    pub track_count: usize,
}

/// A track as listed inside a pack, ordered by `position`.
#[derive(Clone, Debug)]
pub struct PackTrackEntry {
    pub position: i64,
    pub track_id: TrackId,
    pub spotify_id: String,
    pub title: String,
    pub artists: Vec<String>, // billing order
    pub release_year: Option<i32>,
    pub album_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredTrack {
    pub id: TrackId,
    pub spotify_id: String,
    pub title: String,
    pub album_name: Option<String>,
    pub album_image_url: Option<String>,
    pub release_year: Option<i32>,
    pub popularity: Option<i32>,
    pub isrc: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredArtist {
    pub id: ArtistId,
    pub spotify_artist_id: Option<String>,
    pub name: Option<String>,
    pub genres: Option<Vec<String>>,
    pub followers: Option<i64>,
    pub popularity: Option<i32>,
    pub image_url: Option<String>,
}

// ============================================================================
// Batch Results
// ============================================================================

/// Counts for one upsert batch.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub tracks_upserted: usize,
    pub artists_resolved: usize,
    pub artist_links_created: usize,
    pub pack_links_created: usize,
    pub skipped_malformed: usize,
}

// ============================================================================
// Artist Enrichment
// ============================================================================

/// How a catalog candidate was chosen for an artist name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
}

/// One row of an artist enrichment review file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRow {
    pub artist_id: i64,
    pub db_name: String,
    pub spotify_artist_id: String,
    pub matched_name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub spotify_followers: Option<i64>,
    pub image_url: Option<String>,
    pub popularity: Option<i32>,
    pub match_type: MatchType,
    #[serde(default)]
    pub similarity: f64,
}
