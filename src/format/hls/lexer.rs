//! Item lexer for the m3u8 playlist grammar.
//!
//! Modeled as a sequence of state functions driven by single-rune lookahead, in the style of
//! Go's `text/template/parse` lexer: each state consumes some input, emits zero or more
//! [`Item`]s, and returns the next state. A handful of tags carry a single positional value
//! (`#EXT-X-VERSION:7`, `#EXT-X-PROGRAM-DATE-TIME:<iso8601>`) rather than a `NAME=VALUE` list;
//! the tag name just lexed decides which grammar the colon-content uses. Numbers transition to
//! [`ItemKind::RawString`] mid-scan when a resolution (`x`) or byte-range (`@`) separator
//! appears.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Tag,
    AttrName,
    Equals,
    Number,
    QuotedString,
    RawString,
    Comma,
    Url,
    Newline,
    Eof,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub kind: ItemKind,
    pub value: String,
    pub line: usize,
}

impl Item {
    fn new(kind: ItemKind, value: impl Into<String>, line: usize) -> Self {
        Item { kind, value: value.into(), line }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagMode {
    /// No colon-delimited value at all (`#EXTM3U`, `#EXT-X-ENDLIST`, ...).
    NoValue,
    /// A single bare integer (`#EXT-X-VERSION:7`).
    SingleNumber,
    /// One opaque value spanning the rest of the line (`#EXT-X-PROGRAM-DATE-TIME:...`,
    /// `#EXT-X-BYTERANGE:512000@0`, unrecognized tags).
    SingleRaw,
    /// `#EXTINF:<duration>,<title>` — a number, an optional comma, then a freeform title.
    Extinf,
    /// Comma-separated `NAME=VALUE` attribute list.
    AttrList,
}

fn tag_mode(name: &str) -> TagMode {
    match name {
        "EXTM3U" | "EXT-X-DISCONTINUITY" | "EXT-X-ENDLIST" | "EXT-X-INDEPENDENT-SEGMENTS" => {
            TagMode::NoValue
        }
        "EXT-X-VERSION" | "EXT-X-TARGETDURATION" | "EXT-X-MEDIA-SEQUENCE"
        | "EXT-X-DISCONTINUITY-SEQUENCE" => TagMode::SingleNumber,
        "EXT-X-PLAYLIST-TYPE" | "EXT-X-BYTERANGE" | "EXT-X-PROGRAM-DATE-TIME" => TagMode::SingleRaw,
        "EXTINF" => TagMode::Extinf,
        "EXT-X-STREAM-INF" | "EXT-X-MEDIA" | "EXT-X-KEY" | "EXT-X-MAP" | "EXT-X-DATERANGE"
        | "EXT-X-SESSION-DATA" | "EXT-X-SESSION-KEY" => TagMode::AttrList,
        _ => TagMode::SingleRaw,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    TagName,
    SingleNumber,
    SingleRaw,
    ExtinfDuration,
    ExtinfTitle,
    AttrName,
    AttrValue,
    Number,
    QuotedString,
    RawString,
    Url,
    Done,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    items: Vec<Item>,
    scratch: String,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            items: Vec::new(),
            scratch: String::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn emit(&mut self, kind: ItemKind, value: impl Into<String>) {
        self.items.push(Item::new(kind, value, self.line));
    }

    fn run(&mut self) {
        let mut state = State::Start;
        loop {
            state = match state {
                State::Start => self.lex_start(),
                State::TagName => self.lex_tag_name(),
                State::SingleNumber => self.lex_single_number(),
                State::SingleRaw => self.lex_single_raw(),
                State::ExtinfDuration => self.lex_extinf_duration(),
                State::ExtinfTitle => self.lex_extinf_title(),
                State::AttrName => self.lex_attr_name(),
                State::AttrValue => self.lex_attr_value(),
                State::Number => self.lex_number(),
                State::QuotedString => self.lex_quoted_string(),
                State::RawString => self.lex_raw_string(),
                State::Url => self.lex_url(),
                State::Done => break,
            };
        }
        self.emit(ItemKind::Eof, "");
    }

    fn skip_to_newline(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn lex_start(&mut self) -> State {
        match self.peek() {
            None => State::Done,
            Some('\n') => {
                self.bump();
                self.emit(ItemKind::Newline, "\n");
                State::Start
            }
            Some('\r') => {
                self.bump();
                State::Start
            }
            Some('#') => {
                self.bump();
                self.scratch.clear();
                State::TagName
            }
            Some(_) => State::Url,
        }
    }

    fn lex_tag_name(&mut self) -> State {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' {
                self.scratch.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let name = std::mem::take(&mut self.scratch);
        let mode = tag_mode(&name);
        self.emit(ItemKind::Tag, name);
        if self.peek() != Some(':') {
            // Comment or valueless tag: discard anything else on the line.
            self.skip_to_newline();
            return State::Start;
        }
        self.bump(); // ':'
        match mode {
            TagMode::NoValue => {
                self.skip_to_newline();
                State::Start
            }
            TagMode::SingleNumber => State::SingleNumber,
            TagMode::SingleRaw => State::SingleRaw,
            TagMode::Extinf => State::ExtinfDuration,
            TagMode::AttrList => State::AttrName,
        }
    }

    fn lex_single_number(&mut self) -> State {
        self.scratch.clear();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.scratch.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let value = std::mem::take(&mut self.scratch);
        self.emit(ItemKind::Number, value);
        self.skip_to_newline();
        State::Start
    }

    fn lex_single_raw(&mut self) -> State {
        self.scratch.clear();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.scratch.push(c);
            self.bump();
        }
        let value = std::mem::take(&mut self.scratch);
        self.emit(ItemKind::RawString, value);
        State::Start
    }

    fn lex_extinf_duration(&mut self) -> State {
        self.scratch.clear();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.scratch.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let value = std::mem::take(&mut self.scratch);
        self.emit(ItemKind::Number, value);
        if self.peek() == Some(',') {
            self.bump();
            self.emit(ItemKind::Comma, ",");
            State::ExtinfTitle
        } else {
            self.skip_to_newline();
            State::Start
        }
    }

    fn lex_extinf_title(&mut self) -> State {
        self.scratch.clear();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.scratch.push(c);
            self.bump();
        }
        let value = std::mem::take(&mut self.scratch);
        self.emit(ItemKind::RawString, value);
        State::Start
    }

    fn lex_attr_name(&mut self) -> State {
        self.scratch.clear();
        while let Some(c) = self.peek() {
            if c == ' ' {
                self.bump();
                continue;
            }
            break;
        }
        if matches!(self.peek(), None | Some('\n')) {
            return State::Start;
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' {
                self.scratch.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.scratch.is_empty() {
            self.emit(ItemKind::Error, "expected attribute name");
            self.skip_to_newline();
            return State::Start;
        }
        let name = std::mem::take(&mut self.scratch);
        self.emit(ItemKind::AttrName, name);
        if self.peek() == Some('=') {
            self.bump();
            self.emit(ItemKind::Equals, "=");
            State::AttrValue
        } else {
            self.emit(ItemKind::Error, "expected '=' after attribute name");
            self.skip_to_newline();
            State::Start
        }
    }

    fn lex_attr_value(&mut self) -> State {
        match self.peek() {
            Some('"') => State::QuotedString,
            Some(c) if c.is_ascii_digit() || c == '-' => State::Number,
            _ => State::RawString,
        }
    }

    fn lex_number(&mut self) -> State {
        self.scratch.clear();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' || c == '-' {
                self.scratch.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match self.peek() {
            Some('x') | Some('@') => {
                // Resolution (WxH) or byte-range (length@offset): keep scanning as one token.
                self.scratch.push(self.bump().unwrap());
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        self.scratch.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                let raw = std::mem::take(&mut self.scratch);
                self.emit(ItemKind::RawString, raw);
            }
            _ => {
                let num = std::mem::take(&mut self.scratch);
                self.emit(ItemKind::Number, num);
            }
        }
        self.after_value()
    }

    fn lex_quoted_string(&mut self) -> State {
        self.scratch.clear();
        self.bump(); // opening quote
        while let Some(c) = self.peek() {
            if c == '"' {
                self.bump();
                break;
            }
            if c == '\n' {
                break;
            }
            self.scratch.push(c);
            self.bump();
        }
        let value = std::mem::take(&mut self.scratch);
        self.emit(ItemKind::QuotedString, value);
        self.after_value()
    }

    fn lex_raw_string(&mut self) -> State {
        self.scratch.clear();
        while let Some(c) = self.peek() {
            if c == ',' || c == '\n' {
                break;
            }
            self.scratch.push(c);
            self.bump();
        }
        let value = std::mem::take(&mut self.scratch);
        self.emit(ItemKind::RawString, value);
        self.after_value()
    }

    fn lex_url(&mut self) -> State {
        self.scratch.clear();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.scratch.push(c);
            self.bump();
        }
        let value = std::mem::take(&mut self.scratch);
        self.emit(ItemKind::Url, value);
        State::Start
    }

    fn after_value(&mut self) -> State {
        match self.peek() {
            Some(',') => {
                self.bump();
                self.emit(ItemKind::Comma, ",");
                State::AttrName
            }
            Some('\n') | None => State::Start,
            Some(_) => State::RawString,
        }
    }
}

/// Tokenizes a full playlist document into its item stream.
pub fn lex(input: &str) -> Vec<Item> {
    let mut lexer = Lexer::new(input);
    lexer.run();
    lexer.items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexes_extm3u_and_version() {
        let items = lex("#EXTM3U\n#EXT-X-VERSION:7\n");
        assert_eq!(items[0], Item::new(ItemKind::Tag, "EXTM3U", 1));
        assert_eq!(items[1], Item::new(ItemKind::Newline, "\n", 2));
        assert_eq!(items[2], Item::new(ItemKind::Tag, "EXT-X-VERSION", 2));
        assert_eq!(items[3], Item::new(ItemKind::Number, "7", 2));
    }

    #[test]
    fn test_lexes_quoted_and_raw_attrs() {
        let items = lex("#EXT-X-STREAM-INF:BANDWIDTH=2000000,CODECS=\"avc1.4d401f\"\n");
        let kinds: Vec<ItemKind> = items.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ItemKind::Tag,
                ItemKind::AttrName,
                ItemKind::Equals,
                ItemKind::Number,
                ItemKind::Comma,
                ItemKind::AttrName,
                ItemKind::Equals,
                ItemKind::QuotedString,
                ItemKind::Newline,
                ItemKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexes_resolution_as_raw_string() {
        let items = lex("#EXT-X-STREAM-INF:RESOLUTION=1280x720\n");
        let resolution = items.iter().find(|i| i.kind == ItemKind::RawString).unwrap();
        assert_eq!(resolution.value, "1280x720");
    }

    #[test]
    fn test_lexes_byte_range_tag_as_single_raw() {
        let items = lex("#EXT-X-BYTERANGE:512000@0\n");
        assert_eq!(items[1], Item::new(ItemKind::RawString, "512000@0", 1));
    }

    #[test]
    fn test_lexes_url_line() {
        let items = lex("segment_0.ts\n");
        assert_eq!(items[0], Item::new(ItemKind::Url, "segment_0.ts", 1));
    }

    #[test]
    fn test_lexes_enum_raw_string_without_quotes() {
        let items = lex("#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=English,DEFAULT=YES\n");
        let raws: Vec<&str> = items
            .iter()
            .filter(|i| i.kind == ItemKind::RawString)
            .map(|i| i.value.as_str())
            .collect();
        assert_eq!(raws, vec!["AUDIO", "English", "YES"]);
    }

    #[test]
    fn test_lexes_extinf_duration_and_title() {
        let items = lex("#EXTINF:9.967,Segment title\n");
        let kinds: Vec<ItemKind> = items.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![ItemKind::Tag, ItemKind::Number, ItemKind::Comma, ItemKind::RawString, ItemKind::Newline, ItemKind::Eof]
        );
        assert_eq!(items[1].value, "9.967");
        assert_eq!(items[3].value, "Segment title");
    }

    #[test]
    fn test_lexes_extinf_without_title() {
        let items = lex("#EXTINF:10,\n");
        assert_eq!(items[1], Item::new(ItemKind::Number, "10", 1));
        assert_eq!(items[2], Item::new(ItemKind::Comma, ",", 1));
        assert_eq!(items[3], Item::new(ItemKind::RawString, "", 1));
    }

    #[test]
    fn test_lexes_program_date_time_with_embedded_colons() {
        let items = lex("#EXT-X-PROGRAM-DATE-TIME:2020-01-02T03:04:05.678Z\n");
        assert_eq!(items[1], Item::new(ItemKind::RawString, "2020-01-02T03:04:05.678Z", 1));
    }
}
