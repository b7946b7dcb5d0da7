//! Spotify Web API client and the `Catalog` seam the workflows depend on.
//!
//! Authentication uses the client-credentials flow. The access token is
//! cached until shortly before it expires. No request is ever retried.

use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::SpotifyConfig;
use crate::error::{Error, Result};
use crate::models::{ArtistCandidate, ArtistCredit, Playlist, TrackPayload};
use crate::normalize::{accept_popularity, extract_playlist_id, parse_release_year};

/// Most ids the catalog accepts in one metadata request.
pub const MAX_IDS_PER_REQUEST: usize = 50;

/// Candidates requested per artist search.
pub const ARTIST_SEARCH_LIMIT: usize = 10;

/// Refresh the token this long before the catalog says it expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Everything the pack and enrichment workflows need from a music catalog.
pub trait Catalog {
    /// Best match for a title/artist pair, if any.
    fn search_track(&mut self, title: &str, artist: &str) -> Result<Option<TrackPayload>>;

    /// Full metadata for up to `MAX_IDS_PER_REQUEST` track ids. One entry per
    /// requested id, in request order; None for ids the catalog does not know.
    fn tracks_by_id(&mut self, ids: &[String]) -> Result<Vec<Option<TrackPayload>>>;

    /// Artist search results in rank order.
    fn search_artists(&mut self, name: &str) -> Result<Vec<ArtistCandidate>>;

    /// Playlist name and every track, following pagination.
    /// Accepts a playlist URL, URI or bare id.
    fn playlist(&mut self, playlist_ref: &str) -> Result<Playlist>;
}

/// Reject metadata requests the catalog would refuse.
pub fn check_batch_size(ids: &[String]) -> Result<()> {
    if ids.len() > MAX_IDS_PER_REQUEST {
        return Err(Error::BatchTooLarge {
            size: ids.len(),
            limit: MAX_IDS_PER_REQUEST,
        });
    }
    Ok(())
}

// ============================================================================
// API payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiArtistRef {
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    name: Option<String>,
    #[serde(default)]
    images: Vec<ApiImage>,
    release_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalIds {
    isrc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtistRef>,
    album: Option<ApiAlbum>,
    popularity: Option<i32>,
    #[serde(default)]
    external_ids: ExternalIds,
}

#[derive(Debug, Deserialize)]
struct ApiFollowers {
    total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    id: String,
    name: String,
    #[serde(default)]
    genres: Vec<String>,
    followers: Option<ApiFollowers>,
    popularity: Option<i32>,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct TrackSearch {
    tracks: Paging<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ArtistSearch {
    artists: Paging<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct TracksResponse {
    tracks: Vec<Option<ApiTrack>>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylist {
    name: String,
    tracks: Paging<PlaylistItem>,
}

impl ApiTrack {
    /// Local files and unavailable tracks carry no id and are dropped.
    fn into_payload(self) -> Option<TrackPayload> {
        let spotify_id = self.id?;
        let (album_name, album_image_url, release_year) = match self.album {
            Some(album) => {
                // Second image is the ~300px rendition; fall back to the largest
                let image = album.images.get(1).or_else(|| album.images.first());
                (
                    album.name,
                    image.map(|i| i.url.clone()),
                    album.release_date.as_deref().and_then(parse_release_year),
                )
            }
            None => (None, None, None),
        };

        Some(TrackPayload {
            spotify_id,
            title: self.name,
            artists: self
                .artists
                .into_iter()
                .map(|a| ArtistCredit {
                    spotify_id: a.id,
                    name: a.name,
                })
                .collect(),
            album_name,
            album_image_url,
            release_year,
            popularity: self.popularity.and_then(accept_popularity),
            isrc: self.external_ids.isrc,
        })
    }
}

impl From<ApiArtist> for ArtistCandidate {
    fn from(artist: ApiArtist) -> Self {
        ArtistCandidate {
            spotify_id: artist.id,
            name: artist.name,
            genres: artist.genres,
            followers: artist.followers.and_then(|f| f.total).unwrap_or(0),
            popularity: artist.popularity.unwrap_or(0),
            image_url: artist.images.into_iter().next().map(|i| i.url),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    agent: ureq::Agent,
    config: SpotifyConfig,
    token: Option<CachedToken>,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            agent,
            config,
            token: None,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn access_token(&mut self) -> Result<String> {
        if let Some(token) = &self.token {
            if Instant::now() + TOKEN_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/api/token", self.config.auth_base.trim_end_matches('/'));
        let basic = general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.config.client_id, self.config.client_secret
        ));
        let response: TokenResponse = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Basic {}", basic))
            .send_form(&[("grant_type", "client_credentials")])
            .map_err(|e| Error::http(&url, e))?
            .into_json()
            .map_err(|e| Error::bad_response(&url, e))?;

        debug!(expires_in = response.expires_in, "Obtained catalog access token");
        let value = response.access_token;
        self.token = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        Ok(value)
    }

    fn get_json<T: DeserializeOwned>(&mut self, url: &str) -> Result<T> {
        let token = self.access_token()?;
        let body = self
            .agent
            .get(url)
            .set("Authorization", &format!("Bearer {}", token))
            .call()
            .map_err(|e| Error::http(url, e))?
            .into_json()
            .map_err(|e| Error::bad_response(url, e))?;
        Ok(body)
    }
}

impl Catalog for SpotifyClient {
    fn search_track(&mut self, title: &str, artist: &str) -> Result<Option<TrackPayload>> {
        let query = format!("track:{} artist:{}", title, artist);
        let url = self.api_url(&format!(
            "/search?type=track&limit=1&q={}",
            urlencoding::encode(&query)
        ));
        let search: TrackSearch = self.get_json(&url)?;
        let found = search.tracks.items.into_iter().next().and_then(ApiTrack::into_payload);
        if found.is_none() {
            debug!(title, artist, "No catalog results");
        }
        Ok(found)
    }

    fn tracks_by_id(&mut self, ids: &[String]) -> Result<Vec<Option<TrackPayload>>> {
        check_batch_size(ids)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.api_url(&format!("/tracks?ids={}", urlencoding::encode(&ids.join(","))));
        let response: TracksResponse = self.get_json(&url)?;
        if response.tracks.len() != ids.len() {
            return Err(Error::Catalog(format!(
                "requested {} tracks, received {}",
                ids.len(),
                response.tracks.len()
            )));
        }
        Ok(response
            .tracks
            .into_iter()
            .map(|t| t.and_then(ApiTrack::into_payload))
            .collect())
    }

    fn search_artists(&mut self, name: &str) -> Result<Vec<ArtistCandidate>> {
        let url = self.api_url(&format!(
            "/search?type=artist&limit={}&q={}",
            ARTIST_SEARCH_LIMIT,
            urlencoding::encode(name)
        ));
        let search: ArtistSearch = self.get_json(&url)?;
        Ok(search.artists.items.into_iter().map(ArtistCandidate::from).collect())
    }

    fn playlist(&mut self, playlist_ref: &str) -> Result<Playlist> {
        let id = extract_playlist_id(playlist_ref)
            .ok_or_else(|| Error::Catalog(format!("not a playlist reference: {:?}", playlist_ref)))?;
        let url = self.api_url(&format!("/playlists/{}", urlencoding::encode(&id)));
        let playlist: ApiPlaylist = self.get_json(&url)?;
        info!(name = %playlist.name, "Found playlist");

        let mut tracks = Vec::new();
        let mut skipped = 0;
        let mut page = playlist.tracks;
        loop {
            for item in page.items {
                match item.track.and_then(ApiTrack::into_payload) {
                    Some(track) => tracks.push(track),
                    None => skipped += 1,
                }
            }
            match page.next {
                Some(next) => page = self.get_json(&next)?,
                None => break,
            }
        }
        if skipped > 0 {
            warn!(skipped, "Playlist items without a catalog track");
        }

        Ok(Playlist {
            name: playlist.name,
            tracks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client() -> SpotifyClient {
        SpotifyClient::new(SpotifyConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            auth_base: "http://127.0.0.1:9".to_string(),
        })
    }

    #[test]
    fn test_batch_of_51_rejected_before_network() {
        let mut client = unreachable_client();
        let ids: Vec<String> = (0..51).map(|i| format!("id{}", i)).collect();
        // An Http error here would mean a request was attempted
        match client.tracks_by_id(&ids) {
            Err(Error::BatchTooLarge { size, limit }) => {
                assert_eq!(size, 51);
                assert_eq!(limit, MAX_IDS_PER_REQUEST);
            }
            other => panic!("expected BatchTooLarge, got {:?}", other.map(|v| v.len())),
        }
        assert!(client.token.is_none());
    }

    #[test]
    fn test_batch_of_50_allowed() {
        let ids: Vec<String> = (0..50).map(|i| format!("id{}", i)).collect();
        assert!(check_batch_size(&ids).is_ok());
    }

    #[test]
    fn test_track_payload_from_api() {
        let track: ApiTrack = serde_json::from_value(serde_json::json!({
            "id": "t1",
            "name": "Uptown Funk",
            "artists": [{"id": "a1", "name": "Mark Ronson"}, {"id": "a2", "name": "Bruno Mars"}],
            "album": {
                "name": "Uptown Special",
                "release_date": "2015-01-12",
                "images": [{"url": "640"}, {"url": "300"}, {"url": "64"}]
            },
            "popularity": 83,
            "external_ids": {"isrc": "GBARL1401524"}
        }))
        .unwrap();
        let payload = track.into_payload().unwrap();
        assert_eq!(payload.album_image_url.as_deref(), Some("300"));
        assert_eq!(payload.release_year, Some(2015));
        assert_eq!(payload.artists[1], ArtistCredit::new("a2", "Bruno Mars"));
        assert_eq!(payload.isrc.as_deref(), Some("GBARL1401524"));
    }

    #[test]
    fn test_track_payload_edge_cases() {
        let track: ApiTrack = serde_json::from_value(serde_json::json!({
            "id": "t2",
            "name": "Old Song",
            "album": {"name": "Old", "release_date": "0000", "images": [{"url": "only"}]}
        }))
        .unwrap();
        let payload = track.into_payload().unwrap();
        assert_eq!(payload.album_image_url.as_deref(), Some("only"));
        assert_eq!(payload.release_year, None);
        assert!(payload.artists.is_empty());

        let local: ApiTrack =
            serde_json::from_value(serde_json::json!({"id": null, "name": "Local file"})).unwrap();
        assert!(local.into_payload().is_none());
    }

    #[test]
    fn test_artist_candidate_from_api() {
        let artist: ApiArtist = serde_json::from_value(serde_json::json!({
            "id": "w1",
            "name": "The Who",
            "genres": ["rock"],
            "followers": {"href": null, "total": 900},
            "popularity": 70,
            "images": [{"url": "big"}, {"url": "small"}]
        }))
        .unwrap();
        let candidate = ArtistCandidate::from(artist);
        assert_eq!(candidate.followers, 900);
        assert_eq!(candidate.image_url.as_deref(), Some("big"));
    }

    #[test]
    fn test_unreadable_response_skips_item() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // Read the whole request, form body included, before answering
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            let header_end = loop {
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "connection closed before headers");
                request.extend_from_slice(&buf[..n]);
            };
            let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
            let content_length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            while request.len() < header_end + content_length {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let body = "<html>rate limited</html>";
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
        });

        let mut client = SpotifyClient::new(SpotifyConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            api_base: base.clone(),
            auth_base: base,
        });
        let err = client.search_track("Song", "Artist").unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, Error::BadResponse { .. }), "got {:?}", err);
        assert!(!err.is_batch_fatal());
    }
}
