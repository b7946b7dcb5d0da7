//! Shared normalization functions for identifiers and display names.
//! Used by the upsert pipeline, the catalog client and the matchers.
//!
//! CRITICAL: `name_key` decides which name-only artists are the same artist.
//! Changing it changes which stored rows merge on the next run.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::ArtistCredit;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Spotify URI form: "spotify:track:4uLU6hMCjMI75M1A2tKUQC"
static SPOTIFY_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^spotify:(?:track|artist|album|playlist):([A-Za-z0-9]+)$").unwrap()
});

/// Open-web form: "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=..."
static SPOTIFY_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"open\.spotify\.com/(?:intl-[a-z]+/)?(?:track|artist|album|playlist)/([A-Za-z0-9]+)")
        .unwrap()
});

/// Playlist URI or open-web URL; other kinds (track, album) do not match.
static SPOTIFY_PLAYLIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^spotify:playlist:|open\.spotify\.com/(?:intl-[a-z]+/)?playlist/)([A-Za-z0-9]+)")
        .unwrap()
});

static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Collapses runs of whitespace inside a display value.
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Bounds used when accepting a release year from catalog dates.
pub const MIN_RELEASE_YEAR: i32 = 1900;
pub const MAX_RELEASE_YEAR: i32 = 2100;

/// Upper bound of the catalog popularity score.
pub const MAX_POPULARITY: i32 = 100;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Canonicalize an external (Spotify) identifier.
/// Accepts bare ids, `spotify:<kind>:<id>` URIs and open.spotify.com URLs.
/// Returns None for empty input.
pub fn normalize_external_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(caps) = SPOTIFY_URI.captures(trimmed) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = SPOTIFY_URL.captures(trimmed) {
        return Some(caps[1].to_string());
    }
    Some(trimmed.to_string())
}

/// Extract a playlist id from a playlist URL, URI or bare id. Links to
/// tracks, albums or artists return None.
pub fn extract_playlist_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if let Some(caps) = SPOTIFY_PLAYLIST.captures(trimmed) {
        return Some(caps[1].to_string());
    }
    BARE_ID.is_match(trimmed).then(|| trimmed.to_string())
}

// ============================================================================
// DISPLAY VALUES
// ============================================================================

/// Trim a display value, collapse inner whitespace, and map empty to None.
pub fn clean_text(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    Some(MULTI_SPACE.replace_all(value, " ").into_owned())
}

/// Comparison key for artist names: NFC-composed, trimmed, lowercased.
/// Two names are "the same artist" for name-only dedup iff their keys are equal.
pub fn name_key(name: &str) -> String {
    name.nfc().collect::<String>().trim().to_lowercase()
}

/// Split the legacy "Artist A, Artist B" form into name-only credits.
/// Names containing commas ("Earth, Wind & Fire") split too; the legacy form
/// cannot express them.
pub fn split_legacy_artists(artists: &str) -> Vec<ArtistCredit> {
    artists
        .split(',')
        .filter_map(|name| clean_text(Some(name)))
        .map(ArtistCredit::name_only)
        .collect()
}

/// Parse a release year out of a catalog date ("2019-05-03", "2019-05", "2019").
/// Years outside 1900..=2100 are treated as unknown.
pub fn parse_release_year(release_date: &str) -> Option<i32> {
    let year: i32 = release_date.trim().split('-').next()?.parse().ok()?;
    accept_release_year(year)
}

pub fn accept_release_year(year: i32) -> Option<i32> {
    (MIN_RELEASE_YEAR..=MAX_RELEASE_YEAR)
        .contains(&year)
        .then_some(year)
}

pub fn accept_popularity(popularity: i32) -> Option<i32> {
    (0..=MAX_POPULARITY).contains(&popularity).then_some(popularity)
}

// ============================================================================
// TESTS
// ============================================================================
