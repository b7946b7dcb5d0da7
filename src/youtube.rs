//! YouTube page scraping.
//!
//! Pages are fetched once and handed to pure extraction helpers, so the
//! parsing is testable without network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

static SHORT_DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"shortDescription":"(.*?)","isCrawlable"#).unwrap());

static TITLE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static INITIAL_DATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)var ytInitialData = (\{.*?\});\s*</script>").unwrap());

/// What one video page yields.
#[derive(Debug, Clone, Default)]
pub struct VideoPage {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

pub fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Video description from the embedded player JSON.
pub fn extract_description(html: &str) -> Option<String> {
    let raw = SHORT_DESCRIPTION.captures(html)?.get(1)?.as_str();
    // The capture is the body of a JSON string literal
    let decoded = serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| {
        raw.replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\'", "'")
            .replace("\\\"", "\"")
    });
    Some(decoded)
}

/// Page `<title>` without the " - YouTube" suffix.
pub fn extract_video_title(html: &str) -> Option<String> {
    let raw = TITLE_TAG.captures(html)?.get(1)?.as_str();
    let title = html_escape::decode_html_entities(raw)
        .replace(" - YouTube", "")
        .trim()
        .to_string();
    (!title.is_empty()).then_some(title)
}

/// Video URLs listed on a channel's videos tab, in page order.
pub fn extract_channel_videos(html: &str, limit: Option<usize>) -> Vec<String> {
    let Some(caps) = INITIAL_DATA.captures(html) else {
        warn!("Could not find ytInitialData in page");
        return Vec::new();
    };
    let data: Value = match serde_json::from_str(&caps[1]) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "Could not parse ytInitialData");
            return Vec::new();
        }
    };

    let selected_tab = data
        .pointer("/contents/twoColumnBrowseResultsRenderer/tabs")
        .and_then(Value::as_array)
        .and_then(|tabs| {
            tabs.iter()
                .filter_map(|tab| tab.get("tabRenderer"))
                .find(|tab| tab.get("selected").and_then(Value::as_bool) == Some(true))
        });
    let Some(tab) = selected_tab else {
        warn!("Could not find videos tab");
        return Vec::new();
    };

    let items = tab
        .pointer("/content/richGridRenderer/contents")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    items
        .iter()
        .filter_map(|item| {
            item.pointer("/richItemRenderer/content/videoRenderer/videoId")
                .and_then(Value::as_str)
        })
        .map(video_url)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Fetches YouTube pages over HTTP.
pub struct VideoSource {
    agent: ureq::Agent,
}

impl Default for VideoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(10))
            .build();
        Self { agent }
    }

    pub fn fetch_page(&self, url: &str) -> Result<String> {
        debug!(url, "Fetching page");
        let response = self
            .agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .set("Accept-Language", "en-US,en;q=0.9")
            .call()
            .map_err(|e| Error::http(url, e))?;
        response
            .into_string()
            .map_err(|e| Error::bad_response(url, e))
    }

    pub fn video(&self, url: &str) -> Result<VideoPage> {
        let html = self.fetch_page(url)?;
        Ok(VideoPage {
            url: url.to_string(),
            title: extract_video_title(&html),
            description: extract_description(&html),
        })
    }

    pub fn channel_videos(&self, channel_url: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let html = self.fetch_page(channel_url)?;
        Ok(extract_channel_videos(&html, limit))
    }
}
