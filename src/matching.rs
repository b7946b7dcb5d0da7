//! Artist name matching against catalog search results.
//!
//! Selection rules:
//! - Among candidates whose name key equals the query's, the highest follower
//!   count wins (earliest search rank on ties). Classified `Exact`.
//! - Otherwise the most-followed candidate overall wins. Classified `Fuzzy`.
//! - No candidates, no match.
//!
//! Jaro-Winkler similarity is reported alongside for human review only; it
//! never changes the pick.

use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use tracing::info;

use crate::models::{ArtistCandidate, EnrichmentRow, MatchType};
use crate::normalize::name_key;

/// A chosen candidate with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistMatch<'a> {
    pub candidate: &'a ArtistCandidate,
    pub match_type: MatchType,
    pub similarity: f64,
}

/// Jaro-Winkler similarity of two names' comparison keys (0.0 to 1.0).
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&name_key(a), &name_key(b))
}

/// First candidate with the strictly highest follower count.
fn most_followed<'a, I>(candidates: I) -> Option<&'a ArtistCandidate>
where
    I: IntoIterator<Item = &'a ArtistCandidate>,
{
    candidates.into_iter().fold(None, |best, c| match best {
        Some(b) if b.followers >= c.followers => Some(b),
        _ => Some(c),
    })
}

/// Pick the best candidate for `name` from ranked search results.
pub fn best_artist_match<'a>(name: &str, candidates: &'a [ArtistCandidate]) -> Option<ArtistMatch<'a>> {
    let key = name_key(name);
    let exact = most_followed(candidates.iter().filter(|c| name_key(&c.name) == key));

    let (candidate, match_type) = match exact {
        Some(c) => (c, MatchType::Exact),
        None => (most_followed(candidates)?, MatchType::Fuzzy),
    };

    Some(ArtistMatch {
        candidate,
        match_type,
        similarity: name_similarity(name, &candidate.name),
    })
}

/// Priority of a review row when several rows claim one catalog artist.
fn row_rank(row: &EnrichmentRow) -> (bool, i64) {
    (
        row.match_type == MatchType::Exact,
        row.spotify_followers.unwrap_or(0),
    )
}

/// Keep one review row per catalog artist id: exact matches over fuzzy ones,
/// then the highest follower count, first row on ties. Output keeps the order
/// in which each id first appeared. Returns the kept rows and how many were
/// removed.
pub fn dedupe_enrichments(rows: Vec<EnrichmentRow>) -> (Vec<EnrichmentRow>, usize) {
    let total = rows.len();
    let mut order: Vec<String> = Vec::new();
    let mut best: FxHashMap<String, EnrichmentRow> = FxHashMap::default();

    for row in rows {
        let mut slot = match best.entry(row.spotify_artist_id.clone()) {
            Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert(row);
                continue;
            }
            Entry::Occupied(slot) => slot,
        };
        let kept = slot.get_mut();

        let removed = if row_rank(&row) > row_rank(kept) {
            std::mem::replace(kept, row)
        } else {
            row
        };
        info!(
            spotify_artist_id = %kept.spotify_artist_id,
            kept = %kept.db_name,
            removed = %removed.db_name,
            "Duplicate enrichment"
        );
    }

    let kept: Vec<EnrichmentRow> = order
        .into_iter()
        .filter_map(|id| best.remove(&id))
        .collect();
    let removed = total - kept.len();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, name: &str, followers: i64) -> ArtistCandidate {
        ArtistCandidate {
            spotify_id: id.to_string(),
            name: name.to_string(),
            genres: vec![],
            followers,
            popularity: 50,
            image_url: None,
        }
    }

    fn row(artist_id: i64, db_name: &str, spotify_id: &str, match_type: MatchType, followers: i64) -> EnrichmentRow {
        EnrichmentRow {
            artist_id,
            db_name: db_name.to_string(),
            spotify_artist_id: spotify_id.to_string(),
            matched_name: db_name.to_string(),
            genres: vec![],
            spotify_followers: Some(followers),
            image_url: None,
            popularity: None,
            match_type,
            similarity: 1.0,
        }
    }

    #[test]
    fn test_exact_match_prefers_most_followed() {
        let candidates = vec![candidate("w1", "The Who", 500), candidate("w2", "the who", 900)];
        let m = best_artist_match("The Who", &candidates).unwrap();
        assert_eq!(m.candidate.spotify_id, "w2");
        assert_eq!(m.match_type, MatchType::Exact);
    }

    #[test]
    fn test_exact_match_beats_more_followed_fuzzy() {
        let candidates = vec![
            candidate("x", "Prince Royce", 9_000_000),
            candidate("p", "Prince", 5_000_000),
        ];
        let m = best_artist_match("prince", &candidates).unwrap();
        assert_eq!(m.candidate.spotify_id, "p");
        assert_eq!(m.match_type, MatchType::Exact);
        assert!((m.similarity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fuzzy_fallback_most_followed() {
        let candidates = vec![
            candidate("a", "Guns N' Roses", 30_000_000),
            candidate("b", "Guns N Roses Tribute", 1_000),
        ];
        let m = best_artist_match("Guns N Roses", &candidates).unwrap();
        assert_eq!(m.candidate.spotify_id, "a");
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert!(m.similarity > 0.9 && m.similarity < 1.0);
    }

    #[test]
    fn test_tie_keeps_earliest_rank() {
        let candidates = vec![candidate("first", "Heart", 100), candidate("second", "HEART", 100)];
        let m = best_artist_match("Heart", &candidates).unwrap();
        assert_eq!(m.candidate.spotify_id, "first");
    }

    #[test]
    fn test_no_candidates() {
        assert!(best_artist_match("Anyone", &[]).is_none());
    }

    #[test]
    fn test_dedupe_prefers_exact_then_followers() {
        let rows = vec![
            row(1, "Beatles Tribute", "S1", MatchType::Fuzzy, 100),
            row(2, "The Beatles", "S1", MatchType::Exact, 10),
            row(3, "Adele", "S2", MatchType::Fuzzy, 5),
            row(4, "ADELE fan", "S2", MatchType::Fuzzy, 50),
            row(5, "Solo", "S3", MatchType::Exact, 1),
        ];
        let (kept, removed) = dedupe_enrichments(rows);
        assert_eq!(removed, 2);
        let ids: Vec<_> = kept.iter().map(|r| r.artist_id).collect();
        assert_eq!(ids, vec![2, 4, 5]);
    }
}
