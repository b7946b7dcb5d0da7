//! Environment configuration shared by the binaries.
//!
//! Variables:
//! - `DATABASE_PATH` (required): SQLite database file
//! - `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`: client credentials, needed
//!   only by tools that talk to the catalog
//! - `SPOTIFY_API_BASE`, `SPOTIFY_AUTH_BASE`: endpoint overrides

use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_AUTH_BASE: &str = "https://accounts.spotify.com";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub auth_base: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    spotify: Option<SpotifyConfig>,
}

/// Load `.env.local` and `.env` into the process environment. Variables
/// already set are kept, so the shell beats `.env.local` beats `.env`.
/// Returns the files that were loaded; call before `init_logging` so a
/// `RUST_LOG` from either file applies.
pub fn load_env_files() -> Vec<PathBuf> {
    [dotenvy::from_filename(".env.local"), dotenvy::dotenv()]
        .into_iter()
        .filter_map(|loaded| loaded.ok())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = non_empty(lookup("DATABASE_PATH"))
            .map(PathBuf::from)
            .ok_or_else(|| Error::Config("DATABASE_PATH must be set".to_string()))?;

        let spotify = match (
            non_empty(lookup("SPOTIFY_CLIENT_ID")),
            non_empty(lookup("SPOTIFY_CLIENT_SECRET")),
        ) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyConfig {
                client_id,
                client_secret,
                api_base: non_empty(lookup("SPOTIFY_API_BASE"))
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                auth_base: non_empty(lookup("SPOTIFY_AUTH_BASE"))
                    .unwrap_or_else(|| DEFAULT_AUTH_BASE.to_string()),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together".to_string(),
                ))
            }
        };

        Ok(Self {
            database_path,
            spotify,
        })
    }

    /// Catalog credentials, for tools that cannot run without them.
    pub fn spotify(&self) -> Result<&SpotifyConfig> {
        self.spotify.as_ref().ok_or_else(|| {
            Error::Config(
                "Spotify credentials not found. Set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET"
                    .to_string(),
            )
        })
    }
}
