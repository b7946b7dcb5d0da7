//! Parsing "Title - Artist" lines out of video descriptions and list files.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::models::ParsedTrack;

/// "Track List:", "Tracklist", "This Episode's Track List:" up to the first
/// blank line or the end of the description.
static TRACK_LIST_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(?:This Episode's )?Track ?List:?\s*\n(.*?)(?:\n\n|$)").unwrap()
});

/// "We had the best time having Mac DeMarco on the music game show."
static EPISODE_GUEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)having ([A-Z][^.!?\n]+?)(?:on the|tell us|discuss)").unwrap()
});

/// Lines inside a track list that are never tracks.
const SKIP_PREFIXES: &[&str] = &["Watch more", "http", "#"];

/// Split on the first " - " (spaced, so hyphenated titles survive).
fn split_title_artist(line: &str) -> Option<(String, String)> {
    let (title, artist) = line.split_once(" - ")?;
    let (title, artist) = (title.trim(), artist.trim());
    if title.is_empty() || artist.is_empty() {
        return None;
    }
    Some((title.to_string(), artist.to_string()))
}

/// Parse the track list section of a video description.
/// Returns an empty list when no section header is found.
pub fn parse_track_list(description: &str) -> Vec<ParsedTrack> {
    let Some(caps) = TRACK_LIST_SECTION.captures(description) else {
        warn!("Could not find 'Track List:' section in description");
        return Vec::new();
    };

    let mut tracks = Vec::new();
    for line in caps[1].trim().lines() {
        let line = line.trim();
        if line.is_empty() || SKIP_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        if !line.contains(" - ") {
            warn!(line, "Could not parse track list line");
            continue;
        }
        if let Some((title, artist)) = split_title_artist(line) {
            tracks.push(ParsedTrack {
                title,
                artist,
                raw: line.to_string(),
                line: None,
            });
        }
    }
    tracks
}

/// Parse a list file: one "Song Title - Artist Name" per line, `#` comments
/// and blank lines ignored. Bad lines are reported with their line number.
pub fn parse_song_list(text: &str) -> Vec<ParsedTrack> {
    let mut songs = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line_num = i + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !line.contains(" - ") {
            warn!(line = line_num, text = line, "Line doesn't match 'Title - Artist' format");
            continue;
        }
        match split_title_artist(line) {
            Some((title, artist)) => songs.push(ParsedTrack {
                title,
                artist,
                raw: line.to_string(),
                line: Some(line_num),
            }),
            None => warn!(line = line_num, "Line has empty title or artist"),
        }
    }
    songs
}

/// Guest name from the episode blurb, if the description names one.
pub fn extract_episode_guest(description: &str) -> Option<String> {
    let caps = EPISODE_GUEST.captures(description)?;
    let guest = caps[1].trim();
    (!guest.is_empty()).then(|| guest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_list_skips_bad_line() {
        let description = "Track List:\nSong A - Artist A\nbadline\nSong B - Artist B\n\n";
        let tracks = parse_track_list(description);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "Song A");
        assert_eq!(tracks[0].artist, "Artist A");
        assert_eq!(tracks[1].title, "Song B");
        assert_eq!(tracks[1].raw, "Song B - Artist B");
    }

    #[test]
    fn test_parse_track_list_stops_at_blank_line() {
        let description = "We had fun.\n\nThis Episode's Track List:\n\
            Pyramids - Frank Ocean\n\
            Watch more episodes here\n\
            https://example.com\n\
            #TrackStar\n\
            Self Control - Frank Ocean\n\
            \n\
            Not A - Track";
        let tracks = parse_track_list(description);
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Pyramids", "Self Control"]);
    }

    #[test]
    fn test_parse_track_list_header_variants() {
        let tracks = parse_track_list("TRACKLIST\nSong, Pt. 1 - Someone");
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Song, Pt. 1");

        // Only the first " - " splits
        let tracks = parse_track_list("Track List:\nA-ha - Take On Me - Live - a-ha");
        assert_eq!(tracks[0].title, "A-ha");
        assert_eq!(tracks[0].artist, "Take On Me - Live - a-ha");
    }

    #[test]
    fn test_parse_track_list_missing_section() {
        assert!(parse_track_list("Just a video about music").is_empty());
    }

    #[test]
    fn test_parse_track_list_drops_empty_halves() {
        let tracks = parse_track_list("Track List:\n - Artist Only\nTitle Only - \nOk - Fine");
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Ok");
    }

    #[test]
    fn test_parse_song_list_line_numbers() {
        let text = "# Rolling Stone picks\n\nLike a Rolling Stone - Bob Dylan\nno separator\n\
                    Respect - Aretha Franklin\n";
        let songs = parse_song_list(text);
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].line, Some(3));
        assert_eq!(songs[1].artist, "Aretha Franklin");
        assert_eq!(songs[1].line, Some(5));
    }

    #[test]
    fn test_extract_episode_guest() {
        let description = "We had the best time having Mac DeMarco on the music game show.";
        assert_eq!(extract_episode_guest(description).as_deref(), Some("Mac DeMarco"));

        // A period inside the name ends the candidate
        let description = "We had the best time having Anderson .Paak on the music game show.";
        assert_eq!(extract_episode_guest(description), None);

        let description = "Thanks for having Phoebe Bridgers tell us about her favorites";
        assert_eq!(extract_episode_guest(description).as_deref(), Some("Phoebe Bridgers"));

        assert_eq!(extract_episode_guest("No guest here."), None);
    }
}
