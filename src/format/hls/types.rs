//! Typed playlist model shared by the parser and writer.

use crate::format::scte35::SpliceInfoSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Event,
    Vod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub length: u64,
    /// `None` means "immediately following the previous range", per the spec's `length[@offset]`
    /// shorthand.
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMethod {
    None,
    Aes128,
    SampleAes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub method: KeyMethod,
    pub uri: Option<String>,
    pub iv: Option<[u8; 16]>,
    pub key_format: Option<String>,
    pub key_format_versions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    pub uri: String,
    pub byte_range: Option<ByteRange>,
}

/// `EXT-X-DATERANGE`. SCTE-35 cues are stored already-decoded; the writer re-encodes them.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub id: String,
    pub class: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub duration: Option<f64>,
    pub planned_duration: Option<f64>,
    pub end_on_next: bool,
    pub cue_in: Option<SpliceInfoSection>,
    pub cue_out: Option<SpliceInfoSection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub duration_micros: u64,
    pub title: Option<String>,
    pub uri: String,
    pub byte_range: Option<ByteRange>,
    pub discontinuity: bool,
    pub key: Option<Key>,
    pub map: Option<Map>,
    pub program_date_time: Option<String>,
    pub date_range: Option<DateRange>,
}

impl Segment {
    pub fn new(duration_micros: u64, uri: impl Into<String>) -> Self {
        Segment {
            duration_micros,
            title: None,
            uri: uri.into(),
            byte_range: None,
            discontinuity: false,
            key: None,
            map: None,
            program_date_time: None,
            date_range: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Video,
    Subtitles,
    ClosedCaptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub media_type: MediaType,
    pub uri: Option<String>,
    pub group_id: String,
    pub language: Option<String>,
    pub name: String,
    pub default: bool,
    pub autoselect: bool,
    pub forced: bool,
    /// Required exactly when `media_type == ClosedCaptions`.
    pub instream_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub uri: String,
    pub bandwidth: u32,
    pub average_bandwidth: Option<u32>,
    pub codecs: Option<String>,
    pub resolution: Option<(u32, u32)>,
    pub frame_rate: Option<u32>,
    pub audio: Option<String>,
    pub video: Option<String>,
    pub subtitles: Option<String>,
    pub closed_captions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub id: String,
    pub value: Option<String>,
    pub uri: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub key: Key,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub version: Option<u32>,
    pub target_duration: Option<u32>,
    pub media_sequence: Option<u64>,
    pub discontinuity_sequence: Option<u64>,
    pub playlist_type: Option<PlaylistType>,
    pub independent_segments: bool,
    pub end_list: bool,
    pub segments: Vec<Segment>,
    pub variants: Vec<Variant>,
    pub renditions: Vec<Rendition>,
    pub session_data: Vec<SessionData>,
    pub session_keys: Vec<SessionKey>,
}

impl Playlist {
    pub fn new() -> Self {
        Playlist {
            version: None,
            target_duration: None,
            media_sequence: None,
            discontinuity_sequence: None,
            playlist_type: None,
            independent_segments: false,
            end_list: false,
            segments: Vec::new(),
            variants: Vec::new(),
            renditions: Vec::new(),
            session_data: Vec::new(),
            session_keys: Vec::new(),
        }
    }

    /// A master playlist carries variants and no media segments.
    pub fn is_master(&self) -> bool {
        !self.variants.is_empty() || !self.renditions.is_empty() || !self.session_data.is_empty()
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}

impl Key {
    pub fn key_method_str(&self) -> &'static str {
        match self.method {
            KeyMethod::None => "NONE",
            KeyMethod::Aes128 => "AES-128",
            KeyMethod::SampleAes => "SAMPLE-AES",
        }
    }
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "AUDIO",
            MediaType::Video => "VIDEO",
            MediaType::Subtitles => "SUBTITLES",
            MediaType::ClosedCaptions => "CLOSED-CAPTIONS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "AUDIO" => Some(MediaType::Audio),
            "VIDEO" => Some(MediaType::Video),
            "SUBTITLES" => Some(MediaType::Subtitles),
            "CLOSED-CAPTIONS" => Some(MediaType::ClosedCaptions),
            _ => None,
        }
    }
}
