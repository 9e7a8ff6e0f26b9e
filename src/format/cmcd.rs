//! Common Media Client Data (CTA-5004) key/value codec.
//!
//! A CMCD payload is a comma-separated list of `key` or `key=value` tokens, grouped by CTA-5004
//! into four message classes — Request, Object, Status, Session — transported either as a single
//! URL query value or split across the `CMCD-Request`/`CMCD-Object`/`CMCD-Status`/`CMCD-Session`
//! HTTP headers. This module treats all four as one comma-joined token stream, mirroring the
//! teacher's `key=value`/`key:value` attribute splitting in its SDP parser.

use crate::error::{Result, VdkError};

/// An unrecognized key's value, typed by the heuristic CTA-5004 specifies for custom keys:
/// integer if the whole token parses as one, boolean if the token carries no `=value` at all,
/// quoted string otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomValue {
    Integer(i64),
    Boolean(bool),
    String(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// `bl`: client buffer length, milliseconds, rounded to the nearest 100 ms on encode.
    pub buffering_length_ms: Option<u64>,
    /// `dl`: deadline until buffer underrun, milliseconds, rounded to the nearest 100 ms on encode.
    pub deadline_ms: Option<u64>,
    /// `mtp`: measured throughput, kbps.
    pub measured_throughput_kbps: Option<u64>,
    /// `nor`: relative path of the next object the client expects to request.
    pub next_object_request: Option<String>,
    /// `nrr`: byte range of the next request.
    pub next_range_request: Option<String>,
    /// `su`: the object is being requested urgently, ahead of normal schedule.
    pub startup: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    /// `br`: encoded bitrate of the requested object, kbps.
    pub bitrate_kbps: Option<u64>,
    /// `d`: playback duration of the requested object, milliseconds.
    pub duration_ms: Option<u64>,
    /// `ot`: object type token (`v`, `a`, `av`, `i`, `c`, `tt`, `k`, `o`, ...).
    pub object_type: Option<String>,
    /// `tb`: highest bitrate rendition available in the manifest, kbps.
    pub top_bitrate_kbps: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusInfo {
    /// `bs`: the buffer was empty when this request was made.
    pub buffer_starved: bool,
    /// `rtp`: requested maximum throughput, kbps.
    pub requested_max_throughput_kbps: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    /// `cid`: content identifier, unique per asset.
    pub content_id: Option<String>,
    /// `pr`: playback rate relative to normal speed.
    pub playback_rate: Option<f64>,
    /// `sf`: streaming format token (`d` DASH, `h` HLS, `s` Smooth, `o` other).
    pub streaming_format: Option<String>,
    /// `sid`: session identifier, unique per playback session.
    pub session_id: Option<String>,
    /// `st`: stream type token (`v` VOD, `l` live).
    pub stream_type: Option<String>,
    /// `v`: CMCD version, omitted on the wire when `1`.
    pub version: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CmcdInfo {
    pub request: RequestInfo,
    pub object: ObjectInfo,
    pub status: StatusInfo,
    pub session: SessionInfo,
    pub custom: Vec<(String, CustomValue)>,
}

fn round_to_100ms(ms: u64) -> u64 {
    ((ms + 50) / 100) * 100
}

fn parse_known_int(key: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| VdkError::Parser(format!("CMCD key '{}' expects an integer, got '{}'", key, value)))
}

fn unquote(value: &str) -> String {
    value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value).to_string()
}

/// Decodes a comma-separated CMCD token list. Tolerates duplicate or stray commas (empty tokens
/// between them are simply skipped).
pub fn decode(input: &str) -> Result<CmcdInfo> {
    let mut info = CmcdInfo::default();

    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let (key, raw_value) = match token.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (token, None),
        };

        match (key, raw_value) {
            ("bl", Some(v)) => info.request.buffering_length_ms = Some(parse_known_int(key, v)?),
            ("dl", Some(v)) => info.request.deadline_ms = Some(parse_known_int(key, v)?),
            ("mtp", Some(v)) => info.request.measured_throughput_kbps = Some(parse_known_int(key, v)?),
            ("nor", Some(v)) => info.request.next_object_request = Some(unquote(v)),
            ("nrr", Some(v)) => info.request.next_range_request = Some(unquote(v)),
            ("su", None) => info.request.startup = true,
            ("br", Some(v)) => info.object.bitrate_kbps = Some(parse_known_int(key, v)?),
            ("d", Some(v)) => info.object.duration_ms = Some(parse_known_int(key, v)?),
            ("ot", Some(v)) => info.object.object_type = Some(unquote(v)),
            ("tb", Some(v)) => info.object.top_bitrate_kbps = Some(parse_known_int(key, v)?),
            ("bs", None) => info.status.buffer_starved = true,
            ("rtp", Some(v)) => info.status.requested_max_throughput_kbps = Some(parse_known_int(key, v)?),
            ("cid", Some(v)) => info.session.content_id = Some(unquote(v)),
            ("pr", Some(v)) => {
                info.session.playback_rate =
                    Some(v.parse().map_err(|_| VdkError::Parser(format!("CMCD key 'pr' expects a float, got '{}'", v)))?)
            }
            ("sf", Some(v)) => info.session.streaming_format = Some(unquote(v)),
            ("sid", Some(v)) => info.session.session_id = Some(unquote(v)),
            ("st", Some(v)) => info.session.stream_type = Some(unquote(v)),
            ("v", Some(v)) => info.session.version = Some(parse_known_int(key, v)? as u32),
            (other, Some(v)) => {
                let custom = if v.starts_with('"') && v.ends_with('"') && v.len() >= 2 {
                    CustomValue::String(unquote(v))
                } else if let Ok(n) = v.parse::<i64>() {
                    CustomValue::Integer(n)
                } else {
                    CustomValue::String(v.to_string())
                };
                info.custom.push((other.to_string(), custom));
            }
            (other, None) => info.custom.push((other.to_string(), CustomValue::Boolean(true))),
        }
    }

    Ok(info)
}

fn push_int(out: &mut Vec<String>, key: &str, value: Option<u64>) {
    if let Some(v) = value {
        out.push(format!("{}={}", key, v));
    }
}

fn push_string(out: &mut Vec<String>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        out.push(format!("{}=\"{}\"", key, v));
    }
}

fn push_token(out: &mut Vec<String>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        out.push(format!("{}={}", key, v));
    }
}

/// Serializes a [`CmcdInfo`] back to its comma-separated wire form. Known-key order is fixed
/// (Request, Object, Status, Session, custom) for determinism; the specific order within a
/// class or among custom keys carries no meaning on the wire.
pub fn encode(info: &CmcdInfo) -> String {
    let mut tokens = Vec::new();

    push_int(&mut tokens, "bl", info.request.buffering_length_ms.map(round_to_100ms));
    push_int(&mut tokens, "dl", info.request.deadline_ms.map(round_to_100ms));
    push_int(&mut tokens, "mtp", info.request.measured_throughput_kbps);
    push_string(&mut tokens, "nor", &info.request.next_object_request);
    push_string(&mut tokens, "nrr", &info.request.next_range_request);
    if info.request.startup {
        tokens.push("su".to_string());
    }

    push_int(&mut tokens, "br", info.object.bitrate_kbps);
    push_int(&mut tokens, "d", info.object.duration_ms);
    push_token(&mut tokens, "ot", &info.object.object_type);
    push_int(&mut tokens, "tb", info.object.top_bitrate_kbps);

    if info.status.buffer_starved {
        tokens.push("bs".to_string());
    }
    push_int(&mut tokens, "rtp", info.status.requested_max_throughput_kbps);

    push_string(&mut tokens, "cid", &info.session.content_id);
    if let Some(pr) = info.session.playback_rate {
        tokens.push(format!("pr={}", pr));
    }
    push_token(&mut tokens, "sf", &info.session.streaming_format);
    push_string(&mut tokens, "sid", &info.session.session_id);
    push_token(&mut tokens, "st", &info.session.stream_type);
    push_int(&mut tokens, "v", info.session.version.map(|v| v as u64));

    for (key, value) in &info.custom {
        match value {
            CustomValue::Integer(n) => tokens.push(format!("{}={}", key, n)),
            CustomValue::Boolean(true) => tokens.push(key.clone()),
            CustomValue::Boolean(false) => {}
            CustomValue::String(s) => tokens.push(format!("{}=\"{}\"", key, s)),
        }
    }

    tokens.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_seed_fixture() {
        let info = CmcdInfo {
            object: ObjectInfo { bitrate_kbps: Some(3200), duration_ms: Some(4004), ..Default::default() },
            status: StatusInfo { buffer_starved: true, ..Default::default() },
            request: RequestInfo { measured_throughput_kbps: Some(25400), ..Default::default() },
            ..Default::default()
        };
        let text = encode(&info);
        for expected in ["br=3200", "bs", "d=4004", "mtp=25400"] {
            assert!(text.split(',').any(|t| t == expected), "missing token '{}' in '{}'", expected, text);
        }
        assert_eq!(decode(&text).unwrap(), info);
    }

    #[test]
    fn test_decode_tolerates_duplicate_commas() {
        let info = decode("br=3200,,bs,,,mtp=25400").unwrap();
        assert_eq!(info.object.bitrate_kbps, Some(3200));
        assert!(info.status.buffer_starved);
        assert_eq!(info.request.measured_throughput_kbps, Some(25400));
    }

    #[test]
    fn test_buffer_length_rounds_to_nearest_100ms_on_encode() {
        let info = CmcdInfo {
            request: RequestInfo { buffering_length_ms: Some(4370), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(encode(&info), "bl=4400");
    }

    #[test]
    fn test_unknown_key_heuristic_typing() {
        let info = decode("com.example-myKey=50,com.example-flag,com.example-name=\"hello\"").unwrap();
        assert_eq!(info.custom.len(), 3);
        assert_eq!(info.custom[0], ("com.example-myKey".to_string(), CustomValue::Integer(50)));
        assert_eq!(info.custom[1], ("com.example-flag".to_string(), CustomValue::Boolean(true)));
        assert_eq!(info.custom[2], ("com.example-name".to_string(), CustomValue::String("hello".to_string())));
    }

    #[test]
    fn test_session_fields_round_trip() {
        let info = CmcdInfo {
            session: SessionInfo {
                content_id: Some("asset-123".to_string()),
                playback_rate: Some(1.0),
                streaming_format: Some("h".to_string()),
                session_id: Some("sess-abc".to_string()),
                stream_type: Some("l".to_string()),
                version: Some(1),
            },
            ..Default::default()
        };
        let text = encode(&info);
        assert_eq!(decode(&text).unwrap(), info);
    }

    #[test]
    fn test_rejects_malformed_known_integer() {
        assert!(decode("br=not-a-number").is_err());
    }
}
