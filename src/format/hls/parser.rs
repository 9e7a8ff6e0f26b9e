//! Playlist parser: groups the lexer's item stream into lines, then interprets each line
//! against the rules in [`super`]'s module documentation.

use crate::error::{Result, VdkError};
use crate::format::scte35::SpliceInfoSection;
use crate::utils::hex;

use super::lexer::{lex, Item, ItemKind};
use super::types::*;

#[derive(Debug, Clone)]
enum AttrValue {
    Number(f64),
    Quoted(String),
    Raw(String),
}

impl AttrValue {
    fn as_str(&self) -> &str {
        match self {
            AttrValue::Quoted(s) | AttrValue::Raw(s) => s.as_str(),
            AttrValue::Number(_) => "",
        }
    }

    fn as_u64(&self) -> Result<u64> {
        match self {
            AttrValue::Number(n) => Ok(*n as u64),
            AttrValue::Raw(s) | AttrValue::Quoted(s) => {
                s.parse().map_err(|_| VdkError::Parser(format!("expected integer, got '{}'", s)))
            }
        }
    }

    fn as_f64(&self) -> Result<f64> {
        match self {
            AttrValue::Number(n) => Ok(*n),
            AttrValue::Raw(s) | AttrValue::Quoted(s) => {
                s.parse().map_err(|_| VdkError::Parser(format!("expected number, got '{}'", s)))
            }
        }
    }
}

fn find<'a>(attrs: &'a [(String, AttrValue)], name: &str) -> Option<&'a AttrValue> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

fn group_lines(items: &[Item]) -> Vec<&[Item]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, item) in items.iter().enumerate() {
        if item.kind == ItemKind::Newline || item.kind == ItemKind::Eof {
            if i > start {
                lines.push(&items[start..i]);
            }
            start = i + 1;
        }
    }
    lines
}

/// Parses the `NAME=VALUE[,NAME=VALUE...]` items following an attribute-list tag.
fn attr_pairs(items: &[Item]) -> Result<Vec<(String, AttrValue)>> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < items.len() {
        if items[i].kind == ItemKind::Error {
            return Err(VdkError::Parser(items[i].value.clone()));
        }
        if items[i].kind != ItemKind::AttrName {
            return Err(VdkError::Parser(format!("expected attribute name at item {}", i)));
        }
        let name = items[i].value.clone();
        i += 1;
        if items.get(i).map(|it| it.kind) != Some(ItemKind::Equals) {
            return Err(VdkError::Parser(format!("expected '=' after attribute '{}'", name)));
        }
        i += 1;
        let value = match items.get(i) {
            Some(it) if it.kind == ItemKind::Number => AttrValue::Number(
                it.value.parse().map_err(|_| VdkError::Parser(format!("bad number '{}'", it.value)))?,
            ),
            Some(it) if it.kind == ItemKind::QuotedString => AttrValue::Quoted(it.value.clone()),
            Some(it) if it.kind == ItemKind::RawString => AttrValue::Raw(it.value.clone()),
            _ => return Err(VdkError::Parser(format!("expected value for attribute '{}'", name))),
        };
        i += 1;
        pairs.push((name, value));
        if items.get(i).map(|it| it.kind) == Some(ItemKind::Comma) {
            i += 1;
        }
    }
    Ok(pairs)
}

/// Parses `#EXTINF` duration to microsecond precision: integer seconds when the fractional part
/// is all zeros, otherwise `f32 seconds * 10^6`.
fn parse_extinf_duration(s: &str) -> Result<u64> {
    if let Some((whole, frac)) = s.split_once('.') {
        if frac.chars().all(|c| c == '0') {
            return whole
                .parse::<u64>()
                .map(|secs| secs * 1_000_000)
                .map_err(|_| VdkError::Parser(format!("bad EXTINF duration '{}'", s)));
        }
        let seconds: f32 = s.parse().map_err(|_| VdkError::Parser(format!("bad EXTINF duration '{}'", s)))?;
        Ok((seconds as f64 * 1_000_000.0).round() as u64)
    } else {
        whole_seconds_to_micros(s)
    }
}

fn whole_seconds_to_micros(s: &str) -> Result<u64> {
    s.parse::<u64>()
        .map(|secs| secs * 1_000_000)
        .map_err(|_| VdkError::Parser(format!("bad EXTINF duration '{}'", s)))
}

fn parse_byte_range(s: &str) -> Result<ByteRange> {
    match s.split_once('@') {
        Some((len, off)) => Ok(ByteRange {
            length: len.parse().map_err(|_| VdkError::Parser(format!("bad byte range '{}'", s)))?,
            offset: Some(off.parse().map_err(|_| VdkError::Parser(format!("bad byte range '{}'", s)))?),
        }),
        None => Ok(ByteRange {
            length: s.parse().map_err(|_| VdkError::Parser(format!("bad byte range '{}'", s)))?,
            offset: None,
        }),
    }
}

fn parse_resolution(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| VdkError::Parser(format!("bad resolution '{}'", s)))?;
    Ok((
        w.parse().map_err(|_| VdkError::Parser(format!("bad resolution '{}'", s)))?,
        h.parse().map_err(|_| VdkError::Parser(format!("bad resolution '{}'", s)))?,
    ))
}

fn decode_cue(attr: Option<&AttrValue>) -> Result<Option<SpliceInfoSection>> {
    let Some(attr) = attr else { return Ok(None) };
    let raw = attr.as_str();
    let bytes = hex::decode(raw)?;
    Ok(Some(SpliceInfoSection::decode(&bytes)?))
}

fn parse_key(attrs: &[(String, AttrValue)]) -> Result<Key> {
    let method = match find(attrs, "METHOD").map(|v| v.as_str()) {
        Some("NONE") | None => KeyMethod::None,
        Some("AES-128") => KeyMethod::Aes128,
        Some("SAMPLE-AES") => KeyMethod::SampleAes,
        Some(other) => return Err(VdkError::Parser(format!("unknown key method '{}'", other))),
    };
    let iv = match find(attrs, "IV") {
        Some(v) => {
            let bytes = hex::decode(v.as_str())?;
            if bytes.len() != 16 {
                return Err(VdkError::Parser("EXT-X-KEY IV must be 16 bytes".into()));
            }
            let mut iv = [0u8; 16];
            iv.copy_from_slice(&bytes);
            Some(iv)
        }
        None => None,
    };
    Ok(Key {
        method,
        uri: find(attrs, "URI").map(|v| v.as_str().to_string()),
        iv,
        key_format: find(attrs, "KEYFORMAT").map(|v| v.as_str().to_string()),
        key_format_versions: find(attrs, "KEYFORMATVERSIONS").map(|v| v.as_str().to_string()),
    })
}

/// Parses a full m3u8 playlist document.
pub fn parse(input: &str) -> Result<Playlist> {
    let items = lex(input);
    let lines = group_lines(&items);
    let mut lines_iter = lines.into_iter();

    let first = lines_iter
        .next()
        .ok_or_else(|| VdkError::Parser("playlist is empty".into()))?;
    match first.first() {
        Some(it) if it.kind == ItemKind::Tag && it.value == "EXTM3U" => {}
        _ => return Err(VdkError::Parser("playlist must start with #EXTM3U".into())),
    }

    let mut playlist = Playlist::new();

    let mut pending_duration: Option<u64> = None;
    let mut pending_title: Option<String> = None;
    let mut pending_byte_range: Option<ByteRange> = None;
    let mut pending_discontinuity = false;
    let mut pending_key: Option<Key> = None;
    let mut pending_map: Option<Map> = None;
    let mut pending_pdt: Option<String> = None;
    let mut pending_date_range: Option<DateRange> = None;
    let mut pending_variant: Option<Variant> = None;

    for line in lines_iter {
        let head = &line[0];
        if head.kind == ItemKind::Error {
            return Err(VdkError::Parser(head.value.clone()));
        }
        if head.kind == ItemKind::Url {
            if let Some(mut variant) = pending_variant.take() {
                variant.uri = head.value.clone();
                playlist.variants.push(variant);
                continue;
            }
            let segment = Segment {
                duration_micros: pending_duration.take().ok_or_else(|| {
                    VdkError::Parser("media segment URI with no preceding #EXTINF".into())
                })?,
                title: pending_title.take(),
                uri: head.value.clone(),
                byte_range: pending_byte_range.take(),
                discontinuity: std::mem::take(&mut pending_discontinuity),
                key: pending_key.take(),
                map: pending_map.take(),
                program_date_time: pending_pdt.take(),
                date_range: pending_date_range.take(),
            };
            playlist.segments.push(segment);
            continue;
        }

        let name = head.value.as_str();
        let rest = &line[1..];
        match name {
            "EXT-X-VERSION" => playlist.version = Some(parse_u32(rest)?),
            "EXT-X-TARGETDURATION" => playlist.target_duration = Some(parse_u32(rest)?),
            "EXT-X-MEDIA-SEQUENCE" => playlist.media_sequence = Some(parse_u64(rest)?),
            "EXT-X-DISCONTINUITY-SEQUENCE" => playlist.discontinuity_sequence = Some(parse_u64(rest)?),
            "EXT-X-PLAYLIST-TYPE" => {
                playlist.playlist_type = Some(match single_raw(rest)?.as_str() {
                    "EVENT" => PlaylistType::Event,
                    "VOD" => PlaylistType::Vod,
                    other => return Err(VdkError::Parser(format!("unknown playlist type '{}'", other))),
                });
            }
            "EXT-X-INDEPENDENT-SEGMENTS" => playlist.independent_segments = true,
            "EXT-X-ENDLIST" => playlist.end_list = true,
            "EXT-X-DISCONTINUITY" => pending_discontinuity = true,
            "EXTINF" => {
                let duration_item = rest
                    .first()
                    .ok_or_else(|| VdkError::Parser("EXTINF missing duration".into()))?;
                pending_duration = Some(parse_extinf_duration(&duration_item.value)?);
                pending_title = rest.iter().find(|i| i.kind == ItemKind::RawString).and_then(|i| {
                    if i.value.is_empty() {
                        None
                    } else {
                        Some(i.value.clone())
                    }
                });
            }
            "EXT-X-BYTERANGE" => pending_byte_range = Some(parse_byte_range(&single_raw(rest)?)?),
            "EXT-X-PROGRAM-DATE-TIME" => pending_pdt = Some(single_raw(rest)?),
            "EXT-X-KEY" => pending_key = Some(parse_key(&attr_pairs(rest)?)?),
            "EXT-X-MAP" => {
                let attrs = attr_pairs(rest)?;
                let uri = find(&attrs, "URI")
                    .ok_or_else(|| VdkError::Parser("EXT-X-MAP missing URI".into()))?
                    .as_str()
                    .to_string();
                let byte_range = match find(&attrs, "BYTERANGE") {
                    Some(v) => Some(parse_byte_range(v.as_str())?),
                    None => None,
                };
                pending_map = Some(Map { uri, byte_range });
            }
            "EXT-X-DATERANGE" => {
                let attrs = attr_pairs(rest)?;
                let id = find(&attrs, "ID")
                    .ok_or_else(|| VdkError::Parser("EXT-X-DATERANGE missing ID".into()))?
                    .as_str()
                    .to_string();
                let start_date = find(&attrs, "START-DATE")
                    .ok_or_else(|| VdkError::Parser("EXT-X-DATERANGE missing START-DATE".into()))?
                    .as_str()
                    .to_string();
                pending_date_range = Some(DateRange {
                    id,
                    class: find(&attrs, "CLASS").map(|v| v.as_str().to_string()),
                    start_date,
                    end_date: find(&attrs, "END-DATE").map(|v| v.as_str().to_string()),
                    duration: match find(&attrs, "DURATION") {
                        Some(v) => Some(v.as_f64()?),
                        None => None,
                    },
                    planned_duration: match find(&attrs, "PLANNED-DURATION") {
                        Some(v) => Some(v.as_f64()?),
                        None => None,
                    },
                    end_on_next: find(&attrs, "END-ON-NEXT").map(|v| v.as_str() == "YES").unwrap_or(false),
                    cue_in: decode_cue(find(&attrs, "SCTE35-IN"))?,
                    cue_out: decode_cue(find(&attrs, "SCTE35-OUT"))?,
                });
            }
            "EXT-X-STREAM-INF" => {
                let attrs = attr_pairs(rest)?;
                let bandwidth = find(&attrs, "BANDWIDTH")
                    .ok_or_else(|| VdkError::Parser("EXT-X-STREAM-INF missing BANDWIDTH".into()))?
                    .as_u64()? as u32;
                pending_variant = Some(Variant {
                    uri: String::new(),
                    bandwidth,
                    average_bandwidth: match find(&attrs, "AVERAGE-BANDWIDTH") {
                        Some(v) => Some(v.as_u64()? as u32),
                        None => None,
                    },
                    codecs: find(&attrs, "CODECS").map(|v| v.as_str().to_string()),
                    resolution: match find(&attrs, "RESOLUTION") {
                        Some(v) => Some(parse_resolution(v.as_str())?),
                        None => None,
                    },
                    frame_rate: match find(&attrs, "FRAME-RATE") {
                        Some(v) => Some(v.as_f64()?.round() as u32),
                        None => None,
                    },
                    audio: find(&attrs, "AUDIO").map(|v| v.as_str().to_string()),
                    video: find(&attrs, "VIDEO").map(|v| v.as_str().to_string()),
                    subtitles: find(&attrs, "SUBTITLES").map(|v| v.as_str().to_string()),
                    closed_captions: find(&attrs, "CLOSED-CAPTIONS").map(|v| v.as_str().to_string()),
                });
            }
            "EXT-X-MEDIA" => {
                let attrs = attr_pairs(rest)?;
                let media_type_str = find(&attrs, "TYPE")
                    .ok_or_else(|| VdkError::Parser("EXT-X-MEDIA missing TYPE".into()))?
                    .as_str();
                let media_type = MediaType::from_str(media_type_str)
                    .ok_or_else(|| VdkError::Parser(format!("unknown media TYPE '{}'", media_type_str)))?;
                let instream_id = find(&attrs, "INSTREAM-ID").map(|v| v.as_str().to_string());
                if media_type == MediaType::ClosedCaptions && instream_id.is_none() {
                    return Err(VdkError::InvariantViolation(
                        "EXT-X-MEDIA with TYPE=CLOSED-CAPTIONS requires INSTREAM-ID".into(),
                    ));
                }
                playlist.renditions.push(Rendition {
                    media_type,
                    uri: find(&attrs, "URI").map(|v| v.as_str().to_string()),
                    group_id: find(&attrs, "GROUP-ID")
                        .ok_or_else(|| VdkError::Parser("EXT-X-MEDIA missing GROUP-ID".into()))?
                        .as_str()
                        .to_string(),
                    language: find(&attrs, "LANGUAGE").map(|v| v.as_str().to_string()),
                    name: find(&attrs, "NAME")
                        .ok_or_else(|| VdkError::Parser("EXT-X-MEDIA missing NAME".into()))?
                        .as_str()
                        .to_string(),
                    default: find(&attrs, "DEFAULT").map(|v| v.as_str() == "YES").unwrap_or(false),
                    autoselect: find(&attrs, "AUTOSELECT").map(|v| v.as_str() == "YES").unwrap_or(false),
                    forced: find(&attrs, "FORCED").map(|v| v.as_str() == "YES").unwrap_or(false),
                    instream_id,
                });
            }
            "EXT-X-SESSION-DATA" => {
                let attrs = attr_pairs(rest)?;
                let id = find(&attrs, "DATA-ID")
                    .ok_or_else(|| VdkError::Parser("EXT-X-SESSION-DATA missing DATA-ID".into()))?
                    .as_str()
                    .to_string();
                let value = find(&attrs, "VALUE").map(|v| v.as_str().to_string());
                let uri = find(&attrs, "URI").map(|v| v.as_str().to_string());
                if value.is_some() == uri.is_some() {
                    return Err(VdkError::InvariantViolation(
                        "EXT-X-SESSION-DATA requires exactly one of VALUE or URI".into(),
                    ));
                }
                playlist.session_data.push(SessionData {
                    id,
                    value,
                    uri,
                    language: find(&attrs, "LANGUAGE").map(|v| v.as_str().to_string()),
                });
            }
            "EXT-X-SESSION-KEY" => {
                playlist.session_keys.push(SessionKey { key: parse_key(&attr_pairs(rest)?)? });
            }
            _ => {
                log::debug!("ignoring unrecognized playlist tag '{}'", name);
            }
        }
    }

    Ok(playlist)
}

fn single_raw(items: &[Item]) -> Result<String> {
    items
        .first()
        .map(|i| i.value.clone())
        .ok_or_else(|| VdkError::Parser("expected a value".into()))
}

fn parse_u32(items: &[Item]) -> Result<u32> {
    single_raw(items)?.parse().map_err(|_| VdkError::Parser("expected an integer".into()))
}

fn parse_u64(items: &[Item]) -> Result<u64> {
    single_raw(items)?.parse().map_err(|_| VdkError::Parser("expected an integer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_playlist_without_extm3u() {
        assert!(parse("#EXT-X-VERSION:3\n").is_err());
    }

    #[test]
    fn test_parses_media_playlist_with_segments() {
        let text = "\
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:9.967,
segment_0.ts
#EXTINF:10.000,
segment_1.ts
#EXT-X-ENDLIST
";
        let playlist = parse(text).unwrap();
        assert_eq!(playlist.version, Some(3));
        assert_eq!(playlist.target_duration, Some(10));
        assert!(playlist.end_list);
        assert_eq!(playlist.segments.len(), 2);
        assert_eq!(playlist.segments[0].duration_micros, 9_967_000);
        assert_eq!(playlist.segments[0].uri, "segment_0.ts");
        assert_eq!(playlist.segments[1].duration_micros, 10_000_000);
    }

    #[test]
    fn test_parses_master_playlist_variants() {
        let text = "\
#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1280x720,CODECS=\"avc1.4d401f,mp4a.40.2\"
high.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,CODECS=\"avc1.42001e,mp4a.40.2\"
low.m3u8
";
        let playlist = parse(text).unwrap();
        assert!(playlist.is_master());
        assert_eq!(playlist.variants.len(), 2);
        assert_eq!(playlist.variants[0].bandwidth, 2_000_000);
        assert_eq!(playlist.variants[0].resolution, Some((1280, 720)));
        assert_eq!(playlist.variants[0].uri, "high.m3u8");
        assert_eq!(playlist.variants[1].uri, "low.m3u8");
    }

    #[test]
    fn test_closed_captions_rendition_requires_instream_id() {
        let text = "\
#EXTM3U
#EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",NAME=English
";
        assert!(parse(text).is_err());
    }

    #[test]
    fn test_parses_closed_captions_rendition() {
        let text = "\
#EXTM3U
#EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",NAME=English,INSTREAM-ID=\"CC1\"
";
        let playlist = parse(text).unwrap();
        assert_eq!(playlist.renditions.len(), 1);
        assert_eq!(playlist.renditions[0].instream_id, Some("CC1".to_string()));
    }

    #[test]
    fn test_parses_key_and_map() {
        let text = "\
#EXTM3U
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x00000000000000000000000000000001
#EXT-X-MAP:URI=\"init.mp4\",BYTERANGE=560@0
#EXTINF:4.000,
seg.m4s
";
        let playlist = parse(text).unwrap();
        let segment = &playlist.segments[0];
        assert_eq!(segment.key.as_ref().unwrap().method, KeyMethod::Aes128);
        assert_eq!(segment.map.as_ref().unwrap().uri, "init.mp4");
        assert_eq!(segment.map.as_ref().unwrap().byte_range, Some(ByteRange { length: 560, offset: Some(0) }));
    }

    #[test]
    fn test_parses_daterange_with_scte35_cue() {
        let b64 = "/DAvAAAAAAAA///wFAVIAACPf+/+c2nALv4AUsz1AAAAAAAKAAhDVUVJAAABNWLbowo=";
        let section = SpliceInfoSection::decode_base64(b64).unwrap();
        let hex_cue = format!("0x{}", hex::encode(&section.encode().unwrap()));
        let text = format!(
            "#EXTM3U\n#EXT-X-DATERANGE:ID=\"break1\",START-DATE=\"2020-01-01T00:00:00Z\",SCTE35-OUT={}\n#EXTINF:2.000,\nseg.ts\n",
            hex_cue
        );
        let playlist = parse(&text).unwrap();
        let date_range = playlist.segments[0].date_range.as_ref().unwrap();
        assert_eq!(date_range.id, "break1");
        assert_eq!(date_range.cue_out.as_ref().unwrap(), &section);
    }
}
