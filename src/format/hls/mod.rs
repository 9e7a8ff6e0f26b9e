//! HLS (`.m3u8`) playlist lexer, parser, and writer.
//!
//! The playlist grammar is line-oriented: each non-empty, non-comment line is either a tag
//! (`#EXT…`, optionally followed by `:attrs`) or a URI. [`lexer`] turns playlist text into a
//! stream of typed items; [`parser`] groups those items into lines and interprets them against
//! the HLS tag grammar, threading segment-scoped tag state (`EXTINF`, `EXT-X-BYTERANGE`,
//! `EXT-X-DISCONTINUITY`, `EXT-X-KEY`, `EXT-X-MAP`, `EXT-X-PROGRAM-DATE-TIME`,
//! `EXT-X-DATERANGE`) through to the next URI line, which flushes it into a [`types::Segment`].
//! Master-playlist tags (`EXT-X-STREAM-INF`, `EXT-X-MEDIA`, `EXT-X-SESSION-DATA`,
//! `EXT-X-SESSION-KEY`) build [`types::Variant`]/[`types::Rendition`]/[`types::SessionData`]
//! records directly from their own attributes.
//!
//! ```rust
//! use broadcore::format::hls::{parse, write};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let text = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:9.967,\nsegment_0.ts\n#EXT-X-ENDLIST\n";
//! let playlist = parse(text)?;
//! assert_eq!(playlist.segments[0].duration_micros, 9_967_000);
//! assert_eq!(write(&playlist)?, text);
//! # Ok(())
//! # }
//! ```

pub mod lexer;
pub mod parser;
pub mod types;
pub mod writer;

pub use parser::parse;
pub use types::{
    ByteRange, DateRange, Key, KeyMethod, Map, MediaType, Playlist, PlaylistType, Rendition, Segment,
    SessionData, SessionKey, Variant,
};
pub use writer::write;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extinf_microsecond_precision_seed_fixture() {
        let playlist = parse("#EXTM3U\n#EXTINF:9.967,\nsegment_0.ts\n").unwrap();
        assert_eq!(playlist.segments[0].duration_micros, 9_967_000);
    }

    #[test]
    fn test_master_playlist_round_trips() {
        let mut playlist = Playlist::new();
        playlist.version = Some(6);
        playlist.variants.push(Variant {
            uri: "high.m3u8".to_string(),
            bandwidth: 5_000_000,
            average_bandwidth: None,
            codecs: Some("avc1.640028,mp4a.40.2".to_string()),
            resolution: Some((1920, 1080)),
            frame_rate: None,
            audio: Some("aud".to_string()),
            video: None,
            subtitles: None,
            closed_captions: None,
        });
        playlist.renditions.push(Rendition {
            media_type: MediaType::Audio,
            uri: Some("audio.m3u8".to_string()),
            group_id: "aud".to_string(),
            language: Some("en".to_string()),
            name: "English".to_string(),
            default: true,
            autoselect: true,
            forced: false,
            instream_id: None,
        });

        let text = write(&playlist).unwrap();
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.variants.len(), 1);
        assert_eq!(reparsed.variants[0].bandwidth, 5_000_000);
        assert_eq!(reparsed.renditions.len(), 1);
        assert_eq!(reparsed.renditions[0].name, "English");
        assert!(reparsed.is_master());
    }
}
