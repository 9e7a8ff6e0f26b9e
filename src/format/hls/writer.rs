//! Playlist writer. Builds one contiguous `String`; any cross-field invariant violation aborts
//! before anything is returned, so a caller never observes a partially written playlist.

use crate::error::{Result, VdkError};
use crate::utils::hex;

use super::types::*;

fn write_attr_list(out: &mut String, attrs: &[(&str, String)]) {
    for (i, (name, value)) in attrs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(name);
        out.push('=');
        out.push_str(value);
    }
}

fn write_key(out: &mut String, tag: &str, key: &Key) -> Result<()> {
    let mut attrs = vec![("METHOD".to_string(), key.key_method_str().to_string())];
    if key.method != KeyMethod::None {
        let uri = key.uri.as_ref().ok_or_else(|| {
            VdkError::InvariantViolation(format!("{} requires a URI when METHOD is not NONE", tag))
        })?;
        attrs.push(("URI".to_string(), format!("\"{}\"", uri)));
    }
    if let Some(iv) = &key.iv {
        attrs.push(("IV".to_string(), format!("0x{}", hex::encode(iv))));
    }
    if let Some(fmt) = &key.key_format {
        attrs.push(("KEYFORMAT".to_string(), format!("\"{}\"", fmt)));
    }
    if let Some(versions) = &key.key_format_versions {
        attrs.push(("KEYFORMATVERSIONS".to_string(), format!("\"{}\"", versions)));
    }
    let pairs: Vec<(&str, String)> = attrs.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    out.push_str(&format!("#{}:", tag));
    write_attr_list(out, &pairs);
    out.push('\n');
    Ok(())
}

fn format_duration(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as u64)
    } else {
        format!("{}", seconds)
    }
}

/// Serializes a [`Playlist`] to its `.m3u8` text form.
pub fn write(playlist: &Playlist) -> Result<String> {
    let mut out = String::new();
    out.push_str("#EXTM3U\n");

    if let Some(version) = playlist.version {
        if version != 0 {
            out.push_str(&format!("#EXT-X-VERSION:{}\n", version));
        }
    }
    if playlist.independent_segments {
        out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
    }
    if let Some(target_duration) = playlist.target_duration {
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", target_duration));
    }
    if let Some(media_sequence) = playlist.media_sequence {
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", media_sequence));
    }
    if let Some(discontinuity_sequence) = playlist.discontinuity_sequence {
        out.push_str(&format!("#EXT-X-DISCONTINUITY-SEQUENCE:{}\n", discontinuity_sequence));
    }
    if let Some(playlist_type) = playlist.playlist_type {
        let s = match playlist_type {
            PlaylistType::Event => "EVENT",
            PlaylistType::Vod => "VOD",
        };
        out.push_str(&format!("#EXT-X-PLAYLIST-TYPE:{}\n", s));
    }

    for session_data in &playlist.session_data {
        if session_data.id.is_empty() {
            return Err(VdkError::InvariantViolation("EXT-X-SESSION-DATA requires a non-empty DATA-ID".into()));
        }
        if session_data.value.is_some() == session_data.uri.is_some() {
            return Err(VdkError::InvariantViolation(
                "EXT-X-SESSION-DATA requires exactly one of VALUE or URI".into(),
            ));
        }
        let mut attrs = vec![("DATA-ID".to_string(), format!("\"{}\"", session_data.id))];
        if let Some(value) = &session_data.value {
            attrs.push(("VALUE".to_string(), format!("\"{}\"", value)));
        }
        if let Some(uri) = &session_data.uri {
            attrs.push(("URI".to_string(), format!("\"{}\"", uri)));
        }
        if let Some(language) = &session_data.language {
            attrs.push(("LANGUAGE".to_string(), format!("\"{}\"", language)));
        }
        let pairs: Vec<(&str, String)> = attrs.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        out.push_str("#EXT-X-SESSION-DATA:");
        write_attr_list(&mut out, &pairs);
        out.push('\n');
    }

    for session_key in &playlist.session_keys {
        write_key(&mut out, "EXT-X-SESSION-KEY", &session_key.key)?;
    }

    for rendition in &playlist.renditions {
        if rendition.name.is_empty() {
            return Err(VdkError::InvariantViolation("EXT-X-MEDIA requires a non-empty NAME".into()));
        }
        if rendition.group_id.is_empty() {
            return Err(VdkError::InvariantViolation("EXT-X-MEDIA requires a non-empty GROUP-ID".into()));
        }
        let has_instream_id = rendition.instream_id.is_some();
        if (rendition.media_type == MediaType::ClosedCaptions) != has_instream_id {
            return Err(VdkError::InvariantViolation(
                "INSTREAM-ID must be present exactly when TYPE=CLOSED-CAPTIONS".into(),
            ));
        }
        let mut attrs = vec![
            ("TYPE".to_string(), rendition.media_type.as_str().to_string()),
            ("GROUP-ID".to_string(), format!("\"{}\"", rendition.group_id)),
            ("NAME".to_string(), format!("\"{}\"", rendition.name)),
        ];
        if let Some(uri) = &rendition.uri {
            attrs.push(("URI".to_string(), format!("\"{}\"", uri)));
        }
        if let Some(language) = &rendition.language {
            attrs.push(("LANGUAGE".to_string(), format!("\"{}\"", language)));
        }
        if rendition.default {
            attrs.push(("DEFAULT".to_string(), "YES".to_string()));
        }
        if rendition.autoselect {
            attrs.push(("AUTOSELECT".to_string(), "YES".to_string()));
        }
        if rendition.forced {
            attrs.push(("FORCED".to_string(), "YES".to_string()));
        }
        if let Some(instream_id) = &rendition.instream_id {
            attrs.push(("INSTREAM-ID".to_string(), format!("\"{}\"", instream_id)));
        }
        let pairs: Vec<(&str, String)> = attrs.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        out.push_str("#EXT-X-MEDIA:");
        write_attr_list(&mut out, &pairs);
        out.push('\n');
    }

    for variant in &playlist.variants {
        if variant.bandwidth == 0 {
            return Err(VdkError::InvariantViolation("EXT-X-STREAM-INF requires a positive BANDWIDTH".into()));
        }
        if variant.uri.is_empty() {
            return Err(VdkError::InvariantViolation("EXT-X-STREAM-INF requires a non-empty URI".into()));
        }
        let mut attrs = vec![("BANDWIDTH".to_string(), variant.bandwidth.to_string())];
        if let Some(avg) = variant.average_bandwidth {
            attrs.push(("AVERAGE-BANDWIDTH".to_string(), avg.to_string()));
        }
        if let Some(codecs) = &variant.codecs {
            attrs.push(("CODECS".to_string(), format!("\"{}\"", codecs)));
        }
        if let Some((w, h)) = variant.resolution {
            attrs.push(("RESOLUTION".to_string(), format!("{}x{}", w, h)));
        }
        if let Some(frame_rate) = variant.frame_rate {
            attrs.push(("FRAME-RATE".to_string(), frame_rate.to_string()));
        }
        if let Some(audio) = &variant.audio {
            attrs.push(("AUDIO".to_string(), format!("\"{}\"", audio)));
        }
        if let Some(video) = &variant.video {
            attrs.push(("VIDEO".to_string(), format!("\"{}\"", video)));
        }
        if let Some(subtitles) = &variant.subtitles {
            attrs.push(("SUBTITLES".to_string(), format!("\"{}\"", subtitles)));
        }
        if let Some(cc) = &variant.closed_captions {
            attrs.push(("CLOSED-CAPTIONS".to_string(), format!("\"{}\"", cc)));
        }
        let pairs: Vec<(&str, String)> = attrs.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        out.push_str("#EXT-X-STREAM-INF:");
        write_attr_list(&mut out, &pairs);
        out.push('\n');
        out.push_str(&variant.uri);
        out.push('\n');
    }

    let mut last_range_end: Option<u64> = None;
    let mut current_key: Option<&Key> = None;
    let mut current_map: Option<&Map> = None;

    for segment in &playlist.segments {
        if segment.duration_micros == 0 {
            return Err(VdkError::InvariantViolation("each media segment requires a positive EXTINF duration".into()));
        }
        if segment.uri.is_empty() {
            return Err(VdkError::InvariantViolation("each media segment requires a non-empty URI".into()));
        }

        if segment.key.as_ref() != current_key {
            if let Some(key) = &segment.key {
                write_key(&mut out, "EXT-X-KEY", key)?;
            }
            current_key = segment.key.as_ref();
        }
        if segment.map.as_ref() != current_map {
            if let Some(map) = &segment.map {
                out.push_str("#EXT-X-MAP:");
                let mut attrs = vec![("URI".to_string(), format!("\"{}\"", map.uri))];
                if let Some(br) = &map.byte_range {
                    attrs.push(("BYTERANGE".to_string(), format_byte_range(br)));
                }
                let pairs: Vec<(&str, String)> = attrs.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
                write_attr_list(&mut out, &pairs);
                out.push('\n');
            }
            current_map = segment.map.as_ref();
        }
        if segment.discontinuity {
            out.push_str("#EXT-X-DISCONTINUITY\n");
        }
        if let Some(pdt) = &segment.program_date_time {
            out.push_str(&format!("#EXT-X-PROGRAM-DATE-TIME:{}\n", pdt));
        }
        if let Some(date_range) = &segment.date_range {
            write_date_range(&mut out, date_range)?;
        }
        if let Some(byte_range) = &segment.byte_range {
            if let Some(offset) = byte_range.offset {
                if let Some(last_end) = last_range_end {
                    if offset < last_end {
                        return Err(VdkError::InvariantViolation(
                            "EXT-X-BYTERANGE offset must be strictly less than the next segment's offset".into(),
                        ));
                    }
                }
                last_range_end = Some(offset + byte_range.length);
            }
            out.push_str(&format!("#EXT-X-BYTERANGE:{}\n", format_byte_range(byte_range)));
        }

        let seconds = segment.duration_micros as f64 / 1_000_000.0;
        out.push_str(&format!("#EXTINF:{},{}\n", format_duration(seconds), segment.title.as_deref().unwrap_or("")));
        out.push_str(&segment.uri);
        out.push('\n');
    }

    if playlist.end_list {
        out.push_str("#EXT-X-ENDLIST\n");
    }

    Ok(out)
}

fn format_byte_range(range: &ByteRange) -> String {
    match range.offset {
        Some(offset) => format!("{}@{}", range.length, offset),
        None => format!("{}", range.length),
    }
}

fn write_date_range(out: &mut String, date_range: &DateRange) -> Result<()> {
    if date_range.id.is_empty() {
        return Err(VdkError::InvariantViolation("EXT-X-DATERANGE requires a non-empty ID".into()));
    }
    let mut attrs = vec![
        ("ID".to_string(), format!("\"{}\"", date_range.id)),
        ("START-DATE".to_string(), format!("\"{}\"", date_range.start_date)),
    ];
    if let Some(class) = &date_range.class {
        attrs.push(("CLASS".to_string(), format!("\"{}\"", class)));
    }
    if let Some(end_date) = &date_range.end_date {
        attrs.push(("END-DATE".to_string(), format!("\"{}\"", end_date)));
    }
    if let Some(duration) = date_range.duration {
        attrs.push(("DURATION".to_string(), format_duration(duration)));
    }
    if let Some(planned) = date_range.planned_duration {
        attrs.push(("PLANNED-DURATION".to_string(), format_duration(planned)));
    }
    if date_range.end_on_next {
        attrs.push(("END-ON-NEXT".to_string(), "YES".to_string()));
    }
    if let Some(cue_in) = &date_range.cue_in {
        attrs.push(("SCTE35-IN".to_string(), format!("0x{}", hex::encode(&cue_in.encode()?))));
    }
    if let Some(cue_out) = &date_range.cue_out {
        attrs.push(("SCTE35-OUT".to_string(), format!("0x{}", hex::encode(&cue_out.encode()?))));
    }
    let pairs: Vec<(&str, String)> = attrs.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    out.push_str("#EXT-X-DATERANGE:");
    write_attr_list(out, &pairs);
    out.push('\n');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    #[test]
    fn test_writes_minimal_media_playlist() {
        let mut playlist = Playlist::new();
        playlist.version = Some(3);
        playlist.target_duration = Some(10);
        playlist.end_list = true;
        playlist.segments.push(Segment::new(9_967_000, "segment_0.ts"));

        let text = write(&playlist).unwrap();
        assert!(text.starts_with("#EXTM3U\n"));
        assert!(text.contains("#EXT-X-VERSION:3\n"));
        assert!(text.contains("#EXTINF:9.967,\n"));
        assert!(text.contains("segment_0.ts\n"));
        assert!(text.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_rejects_variant_with_zero_bandwidth() {
        let mut playlist = Playlist::new();
        playlist.variants.push(Variant {
            uri: "v.m3u8".to_string(),
            bandwidth: 0,
            average_bandwidth: None,
            codecs: None,
            resolution: None,
            frame_rate: None,
            audio: None,
            video: None,
            subtitles: None,
            closed_captions: None,
        });
        assert!(write(&playlist).is_err());
    }

    #[test]
    fn test_rejects_segment_with_empty_uri() {
        let mut playlist = Playlist::new();
        playlist.segments.push(Segment::new(1_000_000, ""));
        assert!(write(&playlist).is_err());
    }

    #[test]
    fn test_round_trips_through_parse() {
        let mut playlist = Playlist::new();
        playlist.version = Some(3);
        playlist.target_duration = Some(10);
        playlist.media_sequence = Some(5);
        playlist.end_list = true;
        let mut segment = Segment::new(10_000_000, "seg.ts");
        segment.title = Some("hello".to_string());
        playlist.segments.push(segment);

        let text = write(&playlist).unwrap();
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.segments.len(), 1);
        assert_eq!(reparsed.segments[0].duration_micros, 10_000_000);
        assert_eq!(reparsed.segments[0].title, Some("hello".to_string()));
        assert_eq!(reparsed.media_sequence, Some(5));
    }

    #[test]
    fn test_date_range_round_trips_scte35_cue() {
        use crate::format::scte35::SpliceInfoSection;

        let b64 = "/DAvAAAAAAAA///wFAVIAACPf+/+c2nALv4AUsz1AAAAAAAKAAhDVUVJAAABNWLbowo=";
        let section = SpliceInfoSection::decode_base64(b64).unwrap();

        let mut playlist = Playlist::new();
        let mut segment = Segment::new(2_000_000, "seg.ts");
        segment.date_range = Some(DateRange {
            id: "break1".to_string(),
            class: None,
            start_date: "2020-01-01T00:00:00Z".to_string(),
            end_date: None,
            duration: None,
            planned_duration: None,
            end_on_next: false,
            cue_in: None,
            cue_out: Some(section.clone()),
        });
        playlist.segments.push(segment);

        let text = write(&playlist).unwrap();
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.segments[0].date_range.as_ref().unwrap().cue_out.as_ref().unwrap(), &section);
    }
}
