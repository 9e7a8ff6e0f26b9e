//! Session Description Protocol (RFC 8866) codec.
//!
//! Generalizes the teacher's loose `HashMap<String, String>`-attribute, best-effort `m=`/`a=`
//! line scanner into a strict, field-ordered typed record: lines must appear in the RFC 8866
//! order `v o s [i u e p c b] t [r] [z] [a*] m*`, enforced by a per-line "allowed next" state
//! set rather than a free-form match.

use crate::error::{Result, VdkError};

/// `o=<username> <sess-id> <sess-version> <nettype> <addrtype> <unicast-address>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub net_type: String,
    pub addr_type: String,
    pub unicast_address: String,
}

/// `c=<nettype> <addrtype> <connection-address>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub net_type: String,
    pub addr_type: String,
    pub address: String,
}

/// `b=<bwtype>:<bandwidth>`. Stored internally in bits per second; the wire value is kilobits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bandwidth {
    pub bw_type: String,
    pub bits_per_second: u64,
}

/// One `r=` repeat rule attached to a [`TimeDescription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatTime {
    pub interval_secs: u64,
    pub duration_secs: u64,
    pub offsets_secs: Vec<i64>,
}

/// A `t=` line plus any `r=` repeat rules that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeDescription {
    /// NTP/1900-epoch seconds; `0` means unbounded.
    pub start: u64,
    /// NTP/1900-epoch seconds; `0` means unbounded.
    pub end: u64,
    pub repeats: Vec<RepeatTime>,
}

/// Email address, normalized from either RFC 5322 (`Name <addr>`) or SDP (`addr (Name)`) form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    pub address: String,
    pub display_name: Option<String>,
}

/// Phone number, stored stripped of spaces and hyphens so equality ignores formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber(pub String);

impl PhoneNumber {
    pub fn new(raw: &str) -> Self {
        PhoneNumber(raw.chars().filter(|c| *c != ' ' && *c != '-').collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Flag(String),
    Value(String, String),
}

/// `m=<media> <port>[/<number of ports>] <proto> <fmt> ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media_type: String,
    pub port: u16,
    pub port_count: Option<u16>,
    pub protocol: String,
    pub formats: Vec<String>,
    pub info: Option<String>,
    pub connection: Option<ConnectionInfo>,
    pub bandwidths: Vec<Bandwidth>,
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    pub fn new(media_type: impl Into<String>, port: u16, protocol: impl Into<String>, formats: Vec<String>) -> Self {
        MediaDescription {
            media_type: media_type.into(),
            port,
            port_count: None,
            protocol: protocol.into(),
            formats,
            info: None,
            connection: None,
            bandwidths: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: u32,
    pub origin: Origin,
    pub session_name: String,
    pub info: Option<String>,
    pub uri: Option<String>,
    pub emails: Vec<EmailAddress>,
    pub phones: Vec<PhoneNumber>,
    pub connection: Option<ConnectionInfo>,
    pub bandwidths: Vec<Bandwidth>,
    pub times: Vec<TimeDescription>,
    /// `z=` adjustment/offset pairs, NTP seconds and signed-seconds offset.
    pub time_zone_adjustments: Vec<(u64, i64)>,
    pub attributes: Vec<Attribute>,
    pub media: Vec<MediaDescription>,
}

const VALID_MEDIA_PROTOCOLS: &[&str] = &["udp", "RTP/AVP", "RTP/SAVP", "RTP/SAVPF"];

fn parse_duration_secs(s: &str) -> Result<u64> {
    if s.is_empty() || s.contains('.') || s.starts_with('-') {
        return Err(VdkError::Parser(format!("invalid duration '{}'", s)));
    }
    let (digits, multiplier) = match s.chars().last() {
        Some('d') => (&s[..s.len() - 1], 86_400),
        Some('h') => (&s[..s.len() - 1], 3_600),
        Some('m') => (&s[..s.len() - 1], 60),
        Some('s') => (&s[..s.len() - 1], 1),
        Some(c) if c.is_ascii_digit() => (s, 1),
        _ => return Err(VdkError::Parser(format!("invalid duration '{}'", s))),
    };
    let value: u64 = digits.parse().map_err(|_| VdkError::Parser(format!("invalid duration '{}'", s)))?;
    Ok(value * multiplier)
}

fn parse_signed_duration_secs(s: &str) -> Result<i64> {
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, s),
    };
    Ok(sign * parse_duration_secs(rest)? as i64)
}

fn parse_email(value: &str) -> Result<EmailAddress> {
    let value = value.trim();
    if let Some(start) = value.find('<') {
        let end = value[start..]
            .find('>')
            .ok_or_else(|| VdkError::Parser(format!("malformed email '{}'", value)))?
            + start;
        let address = value[start + 1..end].to_string();
        let name = value[..start].trim();
        let display_name = if name.is_empty() { None } else { Some(name.to_string()) };
        return Ok(EmailAddress { address, display_name });
    }
    if let Some(start) = value.find('(') {
        let end = value[start..]
            .find(')')
            .ok_or_else(|| VdkError::Parser(format!("malformed email '{}'", value)))?
            + start;
        let address = value[..start].trim().to_string();
        let name = value[start + 1..end].trim();
        let display_name = if name.is_empty() { None } else { Some(name.to_string()) };
        return Ok(EmailAddress { address, display_name });
    }
    Ok(EmailAddress { address: value.to_string(), display_name: None })
}

fn parse_connection(value: &str) -> Result<ConnectionInfo> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(VdkError::Parser(format!("malformed connection line '{}'", value)));
    }
    Ok(ConnectionInfo {
        net_type: parts[0].to_string(),
        addr_type: parts[1].to_string(),
        address: parts[2].to_string(),
    })
}

fn parse_bandwidth(value: &str) -> Result<Bandwidth> {
    let (bw_type, kbps) = value
        .split_once(':')
        .ok_or_else(|| VdkError::Parser(format!("malformed bandwidth line '{}'", value)))?;
    let kbps: u64 = kbps.parse().map_err(|_| VdkError::Parser(format!("malformed bandwidth value '{}'", kbps)))?;
    Ok(Bandwidth { bw_type: bw_type.to_string(), bits_per_second: kbps * 1000 })
}

fn parse_attribute(value: &str) -> Attribute {
    match value.split_once(':') {
        Some((name, val)) => Attribute::Value(name.to_string(), val.to_string()),
        None => Attribute::Flag(value.to_string()),
    }
}

/// Parses a full SDP session description, rejecting lines that violate RFC 8866 field order.
pub fn parse(input: &str) -> Result<SessionDescription> {
    #[derive(PartialEq, Eq, Clone, Copy)]
    enum Stage {
        Version,
        Origin,
        SessionName,
        Optional,
        Time,
        Media,
    }

    let mut stage = Stage::Version;
    let mut version = None;
    let mut origin = None;
    let mut session_name = None;
    let mut info = None;
    let mut uri = None;
    let mut emails = Vec::new();
    let mut phones = Vec::new();
    let mut connection = None;
    let mut bandwidths = Vec::new();
    let mut times: Vec<TimeDescription> = Vec::new();
    let mut time_zone_adjustments = Vec::new();
    let mut attributes = Vec::new();
    let mut media: Vec<MediaDescription> = Vec::new();

    for raw_line in input.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (tag, value) = match line.split_once('=') {
            Some((t, v)) if t.len() == 1 => (t.chars().next().unwrap(), v),
            _ => return Err(VdkError::Protocol(format!("malformed SDP line '{}'", line))),
        };

        match (stage, tag) {
            (Stage::Version, 'v') => {
                version = Some(value.parse::<u32>().map_err(|_| VdkError::Parser("bad v= value".into()))?);
                stage = Stage::Origin;
            }
            (Stage::Origin, 'o') => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() != 6 {
                    return Err(VdkError::Protocol("malformed o= line".into()));
                }
                origin = Some(Origin {
                    username: parts[0].to_string(),
                    session_id: parts[1].parse().map_err(|_| VdkError::Parser("bad o= sess-id".into()))?,
                    session_version: parts[2].parse().map_err(|_| VdkError::Parser("bad o= sess-version".into()))?,
                    net_type: parts[3].to_string(),
                    addr_type: parts[4].to_string(),
                    unicast_address: parts[5].to_string(),
                });
                stage = Stage::SessionName;
            }
            (Stage::SessionName, 's') => {
                session_name = Some(value.to_string());
                stage = Stage::Optional;
            }
            (Stage::Optional, 'i') => info = Some(value.to_string()),
            (Stage::Optional, 'u') => uri = Some(value.to_string()),
            (Stage::Optional, 'e') => emails.push(parse_email(value)?),
            (Stage::Optional, 'p') => phones.push(PhoneNumber::new(value)),
            (Stage::Optional, 'c') => connection = Some(parse_connection(value)?),
            (Stage::Optional, 'b') => bandwidths.push(parse_bandwidth(value)?),
            (Stage::Optional, 't') | (Stage::Time, 't') => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() != 2 {
                    return Err(VdkError::Protocol("malformed t= line".into()));
                }
                times.push(TimeDescription {
                    start: parts[0].parse().map_err(|_| VdkError::Parser("bad t= start".into()))?,
                    end: parts[1].parse().map_err(|_| VdkError::Parser("bad t= end".into()))?,
                    repeats: Vec::new(),
                });
                stage = Stage::Time;
            }
            (Stage::Time, 'r') => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() < 2 {
                    return Err(VdkError::Protocol("malformed r= line".into()));
                }
                let repeat = RepeatTime {
                    interval_secs: parse_duration_secs(parts[0])?,
                    duration_secs: parse_duration_secs(parts[1])?,
                    offsets_secs: parts[2..]
                        .iter()
                        .map(|p| parse_signed_duration_secs(p))
                        .collect::<Result<Vec<_>>>()?,
                };
                times
                    .last_mut()
                    .ok_or_else(|| VdkError::Protocol("r= line with no preceding t= line".into()))?
                    .repeats
                    .push(repeat);
            }
            (Stage::Time, 'z') => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() % 2 != 0 {
                    return Err(VdkError::Protocol("malformed z= line".into()));
                }
                for pair in parts.chunks(2) {
                    time_zone_adjustments.push((
                        pair[0].parse().map_err(|_| VdkError::Parser("bad z= adjustment time".into()))?,
                        parse_signed_duration_secs(pair[1])?,
                    ));
                }
            }
            (Stage::Time, 'a') => attributes.push(parse_attribute(value)),
            (Stage::Time, 'm') | (Stage::Media, 'm') => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                if parts.len() < 4 {
                    return Err(VdkError::Protocol("malformed m= line".into()));
                }
                if !VALID_MEDIA_PROTOCOLS.contains(&parts[2]) {
                    return Err(VdkError::Protocol(format!("unknown media protocol '{}'", parts[2])));
                }
                let (port, port_count) = match parts[1].split_once('/') {
                    Some((p, c)) => (
                        p.parse().map_err(|_| VdkError::Parser("bad m= port".into()))?,
                        Some(c.parse().map_err(|_| VdkError::Parser("bad m= port count".into()))?),
                    ),
                    None => (parts[1].parse().map_err(|_| VdkError::Parser("bad m= port".into()))?, None),
                };
                media.push(MediaDescription {
                    media_type: parts[0].to_string(),
                    port,
                    port_count,
                    protocol: parts[2].to_string(),
                    formats: parts[3..].iter().map(|s| s.to_string()).collect(),
                    info: None,
                    connection: None,
                    bandwidths: Vec::new(),
                    attributes: Vec::new(),
                });
                stage = Stage::Media;
            }
            (Stage::Media, 'i') => {
                media.last_mut().unwrap().info = Some(value.to_string());
            }
            (Stage::Media, 'c') => {
                media.last_mut().unwrap().connection = Some(parse_connection(value)?);
            }
            (Stage::Media, 'b') => {
                media.last_mut().unwrap().bandwidths.push(parse_bandwidth(value)?);
            }
            (Stage::Media, 'a') => {
                media.last_mut().unwrap().attributes.push(parse_attribute(value));
            }
            (_, other) => {
                return Err(VdkError::Protocol(format!(
                    "'{}=' is not valid at this point in an SDP session description",
                    other
                )));
            }
        }
    }

    if stage != Stage::Time && stage != Stage::Media {
        return Err(VdkError::Protocol("SDP session description is incomplete".into()));
    }
    if times.is_empty() {
        return Err(VdkError::Protocol("SDP session description requires at least one t= line".into()));
    }

    Ok(SessionDescription {
        version: version.ok_or_else(|| VdkError::Protocol("missing v= line".into()))?,
        origin: origin.ok_or_else(|| VdkError::Protocol("missing o= line".into()))?,
        session_name: session_name.ok_or_else(|| VdkError::Protocol("missing s= line".into()))?,
        info,
        uri,
        emails,
        phones,
        connection,
        bandwidths,
        times,
        time_zone_adjustments,
        attributes,
        media,
    })
}

fn write_attribute(out: &mut String, attr: &Attribute) {
    match attr {
        Attribute::Flag(name) => out.push_str(&format!("a={}\r\n", name)),
        Attribute::Value(name, value) => out.push_str(&format!("a={}:{}\r\n", name, value)),
    }
}

fn write_bandwidth(out: &mut String, bw: &Bandwidth) {
    out.push_str(&format!("b={}:{}\r\n", bw.bw_type, bw.bits_per_second / 1000));
}

fn write_connection(out: &mut String, conn: &ConnectionInfo) {
    out.push_str(&format!("c={} {} {}\r\n", conn.net_type, conn.addr_type, conn.address));
}

/// Serializes a [`SessionDescription`] to its wire text form. Emails are always written in
/// RFC 5322 form (`Name <addr>` or bare `addr`), never the SDP `addr (Name)` form, and never
/// quoted.
pub fn write(sdp: &SessionDescription) -> String {
    let mut out = String::new();
    out.push_str(&format!("v={}\r\n", sdp.version));
    let o = &sdp.origin;
    out.push_str(&format!(
        "o={} {} {} {} {} {}\r\n",
        if o.username.is_empty() { "-" } else { &o.username },
        o.session_id,
        o.session_version,
        o.net_type,
        o.addr_type,
        o.unicast_address
    ));
    out.push_str(&format!("s={}\r\n", sdp.session_name));
    if let Some(info) = &sdp.info {
        out.push_str(&format!("i={}\r\n", info));
    }
    if let Some(uri) = &sdp.uri {
        out.push_str(&format!("u={}\r\n", uri));
    }
    for email in &sdp.emails {
        match &email.display_name {
            Some(name) => out.push_str(&format!("e={} <{}>\r\n", name, email.address)),
            None => out.push_str(&format!("e={}\r\n", email.address)),
        }
    }
    for phone in &sdp.phones {
        out.push_str(&format!("p={}\r\n", phone.0));
    }
    if let Some(conn) = &sdp.connection {
        write_connection(&mut out, conn);
    }
    for bw in &sdp.bandwidths {
        write_bandwidth(&mut out, bw);
    }
    for time in &sdp.times {
        out.push_str(&format!("t={} {}\r\n", time.start, time.end));
        for repeat in &time.repeats {
            let offsets: Vec<String> = repeat.offsets_secs.iter().map(|o| o.to_string()).collect();
            out.push_str(&format!(
                "r={} {} {}\r\n",
                repeat.interval_secs,
                repeat.duration_secs,
                offsets.join(" ")
            ));
        }
    }
    if !sdp.time_zone_adjustments.is_empty() {
        let pairs: Vec<String> = sdp
            .time_zone_adjustments
            .iter()
            .map(|(t, o)| format!("{} {}", t, o))
            .collect();
        out.push_str(&format!("z={}\r\n", pairs.join(" ")));
    }
    for attr in &sdp.attributes {
        write_attribute(&mut out, attr);
    }
    for m in &sdp.media {
        match m.port_count {
            Some(count) => out.push_str(&format!("m={} {}/{} {} {}\r\n", m.media_type, m.port, count, m.protocol, m.formats.join(" "))),
            None => out.push_str(&format!("m={} {} {} {}\r\n", m.media_type, m.port, m.protocol, m.formats.join(" "))),
        }
        if let Some(info) = &m.info {
            out.push_str(&format!("i={}\r\n", info));
        }
        if let Some(conn) = &m.connection {
            write_connection(&mut out, conn);
        }
        for bw in &m.bandwidths {
            write_bandwidth(&mut out, bw);
        }
        for attr in &m.attributes {
            write_attribute(&mut out, attr);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED_SDP: &str = "\
v=0\r
o=- 2890844526 2890842807 IN IP4 127.0.0.1\r
s=Example Session\r
c=IN IP4 127.0.0.1\r
t=0 0\r
a=recvonly\r
m=video 5004 RTP/AVP 96\r
a=rtpmap:96 H264/90000\r
m=audio 5006 RTP/AVP 97\r
a=rtpmap:97 MPEG4-GENERIC/44100/2\r
";

    #[test]
    fn test_parses_seed_session() {
        let sdp = parse(SEED_SDP).unwrap();
        assert_eq!(sdp.version, 0);
        assert_eq!(sdp.origin.session_id, 2890844526);
        assert_eq!(sdp.session_name, "Example Session");
        assert_eq!(sdp.connection.as_ref().unwrap().address, "127.0.0.1");
        assert_eq!(sdp.times[0], TimeDescription { start: 0, end: 0, repeats: vec![] });
        assert_eq!(sdp.media.len(), 2);
        assert_eq!(sdp.media[0].port, 5004);
        assert_eq!(sdp.media[0].formats, vec!["96"]);
    }

    #[test]
    fn test_round_trips_through_write() {
        let sdp = parse(SEED_SDP).unwrap();
        let text = write(&sdp);
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed, sdp);
    }

    #[test]
    fn test_rejects_out_of_order_lines() {
        let bad = "v=0\r\ns=Name\r\no=- 1 1 IN IP4 127.0.0.1\r\nt=0 0\r\n";
        assert!(parse(bad).is_err());
    }

    #[test]
    fn test_rejects_unknown_media_protocol() {
        let bad = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=Name\r\nt=0 0\r\nm=video 5004 RTP/XYZ 96\r\n";
        assert!(parse(bad).is_err());
    }

    #[test]
    fn test_email_normalizes_both_forms() {
        assert_eq!(
            parse_email("Jane Doe <jane@example.com>").unwrap(),
            EmailAddress { address: "jane@example.com".to_string(), display_name: Some("Jane Doe".to_string()) }
        );
        assert_eq!(
            parse_email("jane@example.com (Jane Doe)").unwrap(),
            EmailAddress { address: "jane@example.com".to_string(), display_name: Some("Jane Doe".to_string()) }
        );
    }

    #[test]
    fn test_phone_number_equality_ignores_formatting() {
        assert_eq!(PhoneNumber::new("+1 617-555-6011"), PhoneNumber::new("+16175556011"));
    }

    #[test]
    fn test_bandwidth_round_trips_as_kbps_on_wire() {
        let bw = parse_bandwidth("AS:128").unwrap();
        assert_eq!(bw.bits_per_second, 128_000);
        let mut out = String::new();
        write_bandwidth(&mut out, &bw);
        assert_eq!(out, "b=AS:128\r\n");
    }

    #[test]
    fn test_repeat_time_parses_duration_suffixes() {
        let text = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=Name\r\nt=0 0\r\nr=7d 1h 0 25h\r\nm=audio 5004 udp 0\r\n";
        let sdp = parse(text).unwrap();
        let repeat = &sdp.times[0].repeats[0];
        assert_eq!(repeat.interval_secs, 7 * 86_400);
        assert_eq!(repeat.duration_secs, 3_600);
        assert_eq!(repeat.offsets_secs, vec![0, 25 * 3_600]);
    }

    #[test]
    fn test_repeat_time_rejects_decimal_values() {
        let text = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=Name\r\nt=0 0\r\nr=1.5d 1h 0\r\nm=audio 5004 udp 0\r\n";
        assert!(parse(text).is_err());
    }
}
