//! Metadata enrichment workflows.
//!
//! Track backfill re-fetches catalog metadata for stored tracks and merges it
//! through the regular upsert pipeline. Artist enrichment runs in three
//! phases with a human review step in between:
//!
//! 1. fetch: search the catalog for artists without an id, write a review file
//! 2. dedupe: keep one row per catalog artist id
//! 3. apply: validate the reviewed file and merge it into the store

use rusqlite::{named_params, Connection, OptionalExtension};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ingest::upsert_batch;
use crate::matching::best_artist_match;
use crate::merge::{list_value, set_clause, Incoming, MergeRule};
use crate::models::{EnrichmentRow, MatchType, TrackPayload};
use crate::pacing::Pacer;
use crate::progress::{create_progress_bar, log_progress};
use crate::spotify::{Catalog, MAX_IDS_PER_REQUEST};
use crate::store::{Store, NOW_SQL};

/// Columns the apply phase may fill on an artist row.
const ARTIST_ENRICHMENT_FIELDS: &[(&str, MergeRule)] = &[
    ("spotify_artist_id", MergeRule::FillMissing),
    ("genres", MergeRule::FillMissing),
    ("spotify_followers", MergeRule::FillMissing),
    ("spotify_popularity", MergeRule::FillMissing),
    ("image_url", MergeRule::FillMissing),
];

// ============================================================================
// Track backfill
// ============================================================================

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub limit: Option<usize>,
    pub force_all: bool,
    pub batch_size: usize,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            limit: None,
            force_all: false,
            batch_size: MAX_IDS_PER_REQUEST,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
    pub batches: usize,
}

/// Re-fetch catalog metadata for tracks missing artwork (or every track with
/// `force_all`) and merge it in. Each batch commits on its own; a failed
/// catalog request skips its batch.
pub fn backfill_tracks<C: Catalog + ?Sized>(
    store: &mut Store,
    catalog: &mut C,
    options: &BackfillOptions,
    pacer: &Pacer,
) -> Result<BackfillSummary> {
    if options.batch_size == 0 {
        return Err(Error::Config("batch size must be at least 1".to_string()));
    }
    if options.batch_size > MAX_IDS_PER_REQUEST {
        return Err(Error::BatchTooLarge {
            size: options.batch_size,
            limit: MAX_IDS_PER_REQUEST,
        });
    }

    let candidates = store.tracks_needing_backfill(options.limit, options.force_all)?;
    let mut summary = BackfillSummary {
        processed: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        return Ok(summary);
    }

    let total_batches = candidates.len().div_ceil(options.batch_size);
    let pb = create_progress_bar(candidates.len(), "Backfilling tracks");
    let mut done = 0;

    for (n, batch) in candidates.chunks(options.batch_size).enumerate() {
        summary.batches += 1;
        let ids: Vec<String> = batch.iter().map(|t| t.spotify_id.clone()).collect();

        let fetched = match catalog.tracks_by_id(&ids) {
            Ok(fetched) => fetched,
            Err(e) if e.is_batch_fatal() => return Err(e),
            Err(e) => {
                warn!(batch = n + 1, error = %e, "Failed to fetch metadata");
                summary.failed += batch.len();
                done += batch.len();
                pb.inc(batch.len() as u64);
                pacer.pause(n + 1, total_batches);
                continue;
            }
        };

        // Relinked tracks come back under a different id; merge into the row
        // that was asked for.
        let payloads: Vec<TrackPayload> = ids
            .iter()
            .zip(fetched)
            .filter_map(|(id, track)| {
                track.map(|mut t| {
                    t.spotify_id = id.clone();
                    t
                })
            })
            .collect();
        summary.failed += batch.len() - payloads.len();

        if !payloads.is_empty() {
            let (_, report) = store.in_transaction(|tx| upsert_batch(tx, &payloads))?;
            summary.updated += report.tracks_upserted;
            summary.failed += report.skipped_malformed;
            debug!(batch = n + 1, ?report, "Backfilled batch");
        }

        done += batch.len();
        pb.inc(batch.len() as u64);
        log_progress("backfill", done, candidates.len(), 500);
        pacer.pause(n + 1, total_batches);
    }

    pb.finish_and_clear();
    info!(?summary, "Backfill finished");
    Ok(summary)
}

// ============================================================================
// Artist enrichment: fetch
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchSummary {
    pub rows: Vec<EnrichmentRow>,
    pub already_enriched: usize,
    pub not_matched: usize,
    pub failed: usize,
}

impl FetchSummary {
    pub fn count(&self, match_type: MatchType) -> usize {
        self.rows.iter().filter(|r| r.match_type == match_type).count()
    }
}

/// Search the catalog for every named artist that has no catalog id yet.
pub fn fetch_artist_enrichment<C: Catalog + ?Sized>(
    store: &Store,
    catalog: &mut C,
    pacer: &Pacer,
) -> Result<FetchSummary> {
    let artists = store.all_artists()?;
    let mut summary = FetchSummary::default();

    let pending: Vec<_> = artists
        .into_iter()
        .filter(|a| {
            if a.spotify_artist_id.is_some() {
                summary.already_enriched += 1;
                return false;
            }
            a.name.is_some()
        })
        .collect();

    info!(
        already_enriched = summary.already_enriched,
        pending = pending.len(),
        "Artists to enrich"
    );
    let pb = create_progress_bar(pending.len(), "Searching artists");

    for (i, artist) in pending.iter().enumerate() {
        let Some(name) = artist.name.as_deref() else {
            continue;
        };

        match catalog.search_artists(name) {
            Err(e) if e.is_batch_fatal() => return Err(e),
            Err(e) => {
                warn!(artist = name, error = %e, "Artist search failed");
                summary.failed += 1;
            }
            Ok(candidates) => match best_artist_match(name, &candidates) {
                None => {
                    debug!(artist = name, "No match found");
                    summary.not_matched += 1;
                }
                Some(m) => {
                    if m.match_type == MatchType::Fuzzy {
                        info!(db_name = name, matched = %m.candidate.name, "Fuzzy match");
                    }
                    summary.rows.push(EnrichmentRow {
                        artist_id: artist.id.0,
                        db_name: name.to_string(),
                        spotify_artist_id: m.candidate.spotify_id.clone(),
                        matched_name: m.candidate.name.clone(),
                        genres: m.candidate.genres.clone(),
                        spotify_followers: Some(m.candidate.followers),
                        image_url: m.candidate.image_url.clone(),
                        popularity: Some(m.candidate.popularity),
                        match_type: m.match_type,
                        similarity: m.similarity,
                    });
                }
            },
        }

        pb.inc(1);
        log_progress("artists", i + 1, pending.len(), 50);
        pacer.pause(i + 1, pending.len());
    }

    pb.finish_and_clear();
    Ok(summary)
}

// ============================================================================
// Review files
// ============================================================================

/// `<dir>/artist_enrichment_<timestamp>.json`
pub fn default_review_path(dir: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("artist_enrichment_{}.json", timestamp))
}

pub fn write_review_file(path: &Path, rows: &[EnrichmentRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, rows)?;
    Ok(())
}

pub fn read_review_file(path: &Path) -> Result<Vec<EnrichmentRow>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

// ============================================================================
// Artist enrichment: apply
// ============================================================================

/// Reject files that are empty, have rows without ids, or claim one catalog
/// artist twice.
pub fn validate_enrichments(rows: &[EnrichmentRow]) -> Result<()> {
    if rows.is_empty() {
        return Err(Error::MalformedInput("no enrichments found".to_string()));
    }
    let mut seen = rustc_hash::FxHashSet::default();
    for (i, row) in rows.iter().enumerate() {
        if row.artist_id <= 0 {
            return Err(Error::MalformedInput(format!("row {} missing artist_id", i + 1)));
        }
        if row.spotify_artist_id.trim().is_empty() {
            return Err(Error::MalformedInput(format!(
                "row {} missing spotify_artist_id",
                i + 1
            )));
        }
        if !seen.insert(row.spotify_artist_id.as_str()) {
            return Err(Error::MalformedInput(format!(
                "duplicate spotify_artist_id {}",
                row.spotify_artist_id
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub updated: usize,
    pub skipped_conflicts: usize,
    pub missing_artists: usize,
}

fn apply_row(conn: &Connection, row: &EnrichmentRow, summary: &mut ApplySummary) -> Result<()> {
    let owner: Option<i64> = conn
        .prepare_cached("SELECT id FROM artists WHERE spotify_artist_id = ?1")?
        .query_row([&row.spotify_artist_id], |r| r.get(0))
        .optional()?;
    if let Some(owner) = owner.filter(|&owner| owner != row.artist_id) {
        warn!(
            artist_id = row.artist_id,
            owner,
            spotify_artist_id = %row.spotify_artist_id,
            "Catalog id already belongs to another artist"
        );
        summary.skipped_conflicts += 1;
        return Ok(());
    }

    let sql = format!(
        "UPDATE artists SET {}, updated_at = {} WHERE id = :id",
        set_clause("artists", ARTIST_ENRICHMENT_FIELDS, Incoming::Named),
        NOW_SQL
    );
    let changed = conn.prepare_cached(&sql)?.execute(named_params! {
        ":id": row.artist_id,
        ":spotify_artist_id": row.spotify_artist_id,
        ":genres": list_value(&row.genres),
        ":spotify_followers": row.spotify_followers,
        ":spotify_popularity": row.popularity,
        ":image_url": row.image_url.as_deref().filter(|s| !s.trim().is_empty()),
    })?;

    if changed == 0 {
        warn!(artist_id = row.artist_id, "Artist not found");
        summary.missing_artists += 1;
    } else {
        summary.updated += 1;
    }
    Ok(())
}

/// Validate, then merge every row in one transaction. Existing values are
/// never replaced; a catalog id owned by another artist skips the row.
pub fn apply_artist_enrichment(store: &mut Store, rows: &[EnrichmentRow]) -> Result<ApplySummary> {
    validate_enrichments(rows)?;
    store.in_transaction(|tx| {
        let mut summary = ApplySummary::default();
        for row in rows {
            apply_row(tx, row, &mut summary)?;
        }
        Ok(summary)
    })
}
