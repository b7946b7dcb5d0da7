//! trackpack - shared modules for the pack builder binaries.
//!
//! The core is the batch import (`ingest`): tracks are upserted by Spotify id,
//! artists are resolved by id or name, and ordered links are written, all in
//! one transaction. Around it sit the sources (`tracklist`, `youtube`,
//! `spotify`) and the workflows (`packs`, `enrichment`).

pub mod artists;
pub mod associations;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod ingest;
pub mod matching;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod pacing;
pub mod packs;
pub mod progress;
pub mod safety;
pub mod spotify;
pub mod store;
pub mod tracklist;
pub mod tracks;
pub mod youtube;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
