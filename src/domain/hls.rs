//! HLS playlists: per-rendition media playlists and the master playlist.

use crate::domain::ladder::Rendition;
use crate::error::PlaylistError;
use std::fmt::Write as _;
use std::path::Path;

/// Synthetic bandwidth step between consecutive renditions.
pub const BANDWIDTH_STEP: u64 = 250_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub duration: f64,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub version: u8,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<MediaSegment>,
    pub end_list: bool,
    pub playlist_type: Option<String>,
}

impl MediaPlaylist {
    pub fn new(target_duration: u64) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            segments: Vec::new(),
            end_list: true,
            playlist_type: None,
        }
    }

    pub fn add_segment(&mut self, duration: f64, uri: String) {
        self.segments.push(MediaSegment { duration, uri });
    }

    /// Segment URIs in playlist order.
    pub fn segment_uris(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.uri.as_str())
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Parse a media playlist as written by the encoder.
    pub fn parse(text: &str) -> Result<Self, PlaylistError> {
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

        match lines.next() {
            Some((_, "#EXTM3U")) => {}
            _ => return Err(PlaylistError::MissingHeader),
        }

        let mut playlist = MediaPlaylist::new(0);
        playlist.end_list = false;
        let mut pending: Option<(usize, f64)> = None;

        for (line, text) in lines {
            if text.is_empty() {
                continue;
            }

            let invalid = || PlaylistError::InvalidLine {
                line,
                text: text.to_string(),
            };

            if let Some(value) = text.strip_prefix("#EXTINF:") {
                let duration = value.split(',').next().unwrap_or_default();
                let duration = duration.trim().parse::<f64>().map_err(|_| invalid())?;
                pending = Some((line, duration));
            } else if let Some(value) = text.strip_prefix("#EXT-X-VERSION:") {
                playlist.version = value.parse().map_err(|_| invalid())?;
            } else if let Some(value) = text.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = value.parse().map_err(|_| invalid())?;
            } else if let Some(value) = text.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                playlist.media_sequence = value.parse().map_err(|_| invalid())?;
            } else if let Some(value) = text.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
                playlist.playlist_type = Some(value.to_string());
            } else if text == "#EXT-X-ENDLIST" {
                playlist.end_list = true;
            } else if text.starts_with('#') {
                // Unknown tags are allowed by the format.
            } else {
                let (_, duration) = pending.take().ok_or_else(invalid)?;
                playlist.add_segment(duration, text.to_string());
            }
        }

        if let Some((line, _)) = pending {
            return Err(PlaylistError::DanglingSegment { line });
        }

        Ok(playlist)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("#EXTM3U\n");
        let _ = writeln!(out, "#EXT-X-VERSION:{}", self.version);
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration);
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence);

        if let Some(pt) = &self.playlist_type {
            let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:{}", pt);
        }

        for segment in &self.segments {
            let _ = writeln!(out, "#EXTINF:{:.6},", segment.duration);
            out.push_str(&segment.uri);
            out.push('\n');
        }

        if self.end_list {
            out.push_str("#EXT-X-ENDLIST\n");
        }

        out
    }
}

/// One `#EXT-X-STREAM-INF` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantStream {
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    pub uri: String,
}

/// Master playlist referencing every rendition's remote manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterPlaylist {
    pub variants: Vec<VariantStream>,
}

impl MasterPlaylist {
    /// Variants are ranked by ascending height; bandwidth grows with rank.
    pub fn from_renditions<'a>(renditions: impl IntoIterator<Item = (&'a Rendition, &'a str)>) -> Self {
        let mut entries: Vec<(&Rendition, &str)> = renditions.into_iter().collect();
        entries.sort_by_key(|(rendition, _)| rendition.height);

        let variants = entries
            .into_iter()
            .enumerate()
            .map(|(rank, (rendition, uri))| VariantStream {
                bandwidth: (rank as u64 + 1) * BANDWIDTH_STEP,
                width: rendition.width,
                height: rendition.height,
                uri: uri.to_string(),
            })
            .collect();

        Self { variants }
    }

    pub fn render(&self) -> String {
        let mut lines = vec!["#EXTM3U".to_string()];
        for variant in &self.variants {
            lines.push(format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}",
                variant.bandwidth, variant.width, variant.height
            ));
            lines.push(variant.uri.clone());
        }
        lines.join("\n")
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        tokio::fs::write(path, self.render()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const ENCODER_OUTPUT: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-PLAYLIST-TYPE:VOD
#EXTINF:4.004000,
000.ts
#EXTINF:4.004000,
001.ts
#EXTINF:1.501500,
002.ts
#EXT-X-ENDLIST
";

    fn rendition(width: u32, height: u32) -> Rendition {
        Rendition {
            directory: PathBuf::from(format!("/w/{}p", height)),
            width,
            height,
        }
    }

    #[test]
    fn test_parse_encoder_playlist() {
        let playlist = MediaPlaylist::parse(ENCODER_OUTPUT).unwrap();

        assert_eq!(playlist.target_duration, 4);
        assert_eq!(playlist.playlist_type.as_deref(), Some("VOD"));
        assert!(playlist.end_list);
        assert_eq!(
            playlist.segment_uris().collect::<Vec<_>>(),
            vec!["000.ts", "001.ts", "002.ts"]
        );
        assert!((playlist.total_duration() - 9.5095).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_missing_header() {
        assert!(matches!(
            MediaPlaylist::parse("000.ts\n"),
            Err(PlaylistError::MissingHeader)
        ));
    }

    #[test]
    fn test_parse_rejects_dangling_extinf() {
        let text = "#EXTM3U\n#EXTINF:4.0,\n";
        assert!(matches!(
            MediaPlaylist::parse(text),
            Err(PlaylistError::DanglingSegment { line: 2 })
        ));
    }

    #[test]
    fn test_parse_rejects_uri_without_extinf() {
        let text = "#EXTM3U\n000.ts\n";
        assert!(matches!(
            MediaPlaylist::parse(text),
            Err(PlaylistError::InvalidLine { line: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let text = "#EXTM3U\n#EXT-X-INDEPENDENT-SEGMENTS\n#EXT-X-DISCONTINUITY\n#EXTINF:2.0,\n000.ts\n";
        let playlist = MediaPlaylist::parse(text).unwrap();

        assert_eq!(playlist.segment_uris().collect::<Vec<_>>(), vec!["000.ts"]);
        assert!(!playlist.end_list);
    }

    #[test]
    fn test_render_matches_encoder_layout() {
        let mut playlist = MediaPlaylist::new(10);
        playlist.playlist_type = Some("VOD".to_string());
        playlist.add_segment(9.5, "000.ts".to_string());

        let content = playlist.render();
        assert!(content.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(content.contains("#EXT-X-TARGETDURATION:10"));
        assert!(content.contains("#EXTINF:9.500000,"));
        assert!(content.ends_with("000.ts\n#EXT-X-ENDLIST\n"));
        assert_eq!(MediaPlaylist::parse(&content).unwrap(), playlist);
    }

    #[test]
    fn test_master_sorted_with_increasing_bandwidth() {
        let r720 = rendition(1280, 720);
        let r360 = rendition(640, 360);
        let r480 = rendition(854, 480);
        let master = MasterPlaylist::from_renditions(vec![
            (&r720, "https://cdn/j/720p/index.m3u8"),
            (&r360, "https://cdn/j/360p/index.m3u8"),
            (&r480, "https://cdn/j/480p/index.m3u8"),
        ]);

        let heights: Vec<u32> = master.variants.iter().map(|v| v.height).collect();
        assert_eq!(heights, vec![360, 480, 720]);
        assert!(master
            .variants
            .windows(2)
            .all(|w| w[0].bandwidth < w[1].bandwidth));
        assert_eq!(master.variants[0].bandwidth, BANDWIDTH_STEP);
    }

    #[test]
    fn test_master_render() {
        let r360 = rendition(640, 360);
        let r480 = rendition(854, 480);
        let master = MasterPlaylist::from_renditions(vec![(&r360, "a.m3u8"), (&r480, "b.m3u8")]);

        assert_eq!(
            master.render(),
            "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=250000,RESOLUTION=640x360\n\
             a.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=854x480\n\
             b.m3u8"
        );
    }
}
