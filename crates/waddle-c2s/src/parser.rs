//! Incremental XML framing for XMPP client streams.
//!
//! XMPP uses a single long-lived XML document per session. The parser below
//! tracks element depth over the raw byte buffer to cut complete top-level
//! elements out of the stream, then hands each fragment to minidom.

use minidom::Element;

use crate::error::{C2sError, StreamErrorCondition};

/// Namespace URIs used in XMPP
pub mod ns {
    /// XMPP client namespace
    pub const JABBER_CLIENT: &str = "jabber:client";
    /// XMPP streams namespace
    pub const STREAM: &str = "http://etherx.jabber.org/streams";
    /// Stream error condition namespace
    pub const STREAMS_ERRORS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
    /// SASL namespace
    pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
    /// Resource binding namespace
    pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
    /// Session namespace
    pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
    /// Stanza error namespace
    pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
}

/// Parsed stream header information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeader {
    /// The 'to' attribute (target domain)
    pub to: Option<String>,
    /// The 'from' attribute (source entity)
    pub from: Option<String>,
    /// The 'id' attribute (stream ID, set by server)
    pub id: Option<String>,
    /// The 'version' attribute (should be "1.0")
    pub version: Option<String>,
    /// The 'xml:lang' attribute
    pub lang: Option<String>,
    /// The default namespace declared on the stream
    pub xmlns: Option<String>,
    /// The namespace bound to the `stream` prefix
    pub stream_ns: Option<String>,
}

impl StreamHeader {
    /// Parse a stream header from its opening tag.
    ///
    /// The tag is intentionally unclosed; its end tag arrives when the
    /// session ends.
    pub fn parse(tag: &str) -> Result<Self, C2sError> {
        let tag = tag.trim();
        let name = tag_name(tag);

        if name != "stream:stream" {
            return Err(C2sError::protocol(
                StreamErrorCondition::BadFormat,
                format!("Expected stream header, got <{}>", name),
            ));
        }

        if tag.ends_with("/>") {
            return Err(C2sError::protocol(
                StreamErrorCondition::BadFormat,
                "Stream header must not be self-closing",
            ));
        }

        let mut header = StreamHeader::default();
        for (key, value) in parse_attributes(tag) {
            match key.as_str() {
                "to" => header.to = Some(value),
                "from" => header.from = Some(value),
                "id" => header.id = Some(value),
                "version" => header.version = Some(value),
                "xml:lang" => header.lang = Some(value),
                "xmlns" => header.xmlns = Some(value),
                "xmlns:stream" => header.stream_ns = Some(value),
                _ => {}
            }
        }

        Ok(header)
    }

    /// Validate the stream header per RFC 6120.
    pub fn validate(&self) -> Result<(), C2sError> {
        if let Some(ref version) = self.version {
            if version != "1.0" {
                return Err(C2sError::protocol(
                    StreamErrorCondition::UnsupportedVersion,
                    format!("Unsupported XMPP version: {}", version),
                ));
            }
        }

        if let Some(ref stream_ns) = self.stream_ns {
            if stream_ns != ns::STREAM {
                return Err(C2sError::protocol(
                    StreamErrorCondition::InvalidNamespace,
                    format!("Invalid stream namespace: {}", stream_ns),
                ));
            }
        }

        if let Some(ref xmlns) = self.xmlns {
            if xmlns != ns::JABBER_CLIENT {
                return Err(C2sError::protocol(
                    StreamErrorCondition::InvalidNamespace,
                    format!("Invalid content namespace: {}", xmlns),
                ));
            }
        }

        Ok(())
    }
}

/// Parsed stanza variants.
#[derive(Debug, Clone)]
pub enum ParsedStanza {
    /// Opening `<stream:stream>` tag
    StreamStart(StreamHeader),
    /// Closing `</stream:stream>` tag
    StreamEnd,
    /// SASL auth request with mechanism and base64 data
    SaslAuth { mechanism: String, data: String },
    /// Message stanza
    Message(Element),
    /// Presence stanza
    Presence(Element),
    /// IQ stanza
    Iq(Element),
    /// `<stream:error/>` sent by the peer
    StreamError(StreamErrorCondition),
    /// Unknown top-level element
    Unknown(Element),
}

/// Incremental XML parser for XMPP stanzas.
///
/// Accumulates data and emits complete top-level elements as they become
/// available. Bytes that have not been consumed yet survive a stream
/// restart.
pub struct XmlParser {
    /// Accumulated data buffer
    buffer: Vec<u8>,
    /// Whether the stream header of the current stream has been consumed
    stream_open: bool,
    /// Largest partial stanza tolerated before giving up
    max_stanza_size: usize,
}

impl XmlParser {
    /// Create a new XML parser with the given stanza size limit.
    pub fn new(max_stanza_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(8192),
            stream_open: false,
            max_stanza_size,
        }
    }

    /// Feed data into the parser.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes buffered but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the current stream header has been seen.
    pub fn is_stream_open(&self) -> bool {
        self.stream_open
    }

    /// Expect a fresh stream header (RFC 6120 stream restart).
    ///
    /// Unconsumed bytes are kept.
    pub fn restart(&mut self) {
        self.stream_open = false;
    }

    /// Parse and return the next complete item from the buffer.
    ///
    /// Returns `None` if more data is needed.
    pub fn next_stanza(&mut self) -> Result<Option<ParsedStanza>, C2sError> {
        loop {
            let Some(start) = self.buffer.iter().position(|b| !b.is_ascii_whitespace()) else {
                // Whitespace keepalives only
                self.buffer.clear();
                return Ok(None);
            };
            if start > 0 {
                self.buffer.drain(..start);
            }

            let buf = &self.buffer;
            if buf[0] != b'<' {
                return Err(C2sError::protocol(
                    StreamErrorCondition::NotWellFormed,
                    "Unexpected character data at stream level",
                ));
            }
            if buf.len() < 2 {
                return self.incomplete();
            }

            if buf.starts_with(b"<?") {
                if self.stream_open {
                    return Err(restricted_xml("Processing instructions are not allowed"));
                }
                match find(buf, 2, b"?>") {
                    Some(end) => {
                        self.buffer.drain(..end + 2);
                        continue;
                    }
                    None => return self.incomplete(),
                }
            }

            if buf.starts_with(b"<!") {
                if buf.len() < 4 {
                    return self.incomplete();
                }
                if !buf.starts_with(b"<!--") {
                    return Err(restricted_xml("DTDs and CDATA are not allowed at stream level"));
                }
                match find(buf, 4, b"-->") {
                    Some(end) => {
                        self.buffer.drain(..end + 3);
                        continue;
                    }
                    None => return self.incomplete(),
                }
            }

            if !self.stream_open {
                let Some(end) = tag_end(buf, 0) else {
                    return self.incomplete();
                };
                let tag = utf8(&buf[..=end])?.to_string();
                self.buffer.drain(..=end);

                let header = StreamHeader::parse(&tag)?;
                self.stream_open = true;
                return Ok(Some(ParsedStanza::StreamStart(header)));
            }

            if buf.starts_with(b"</") {
                let Some(end) = tag_end(buf, 0) else {
                    return self.incomplete();
                };
                let name = utf8(&buf[2..end])?.trim().to_string();
                if name != "stream:stream" {
                    return Err(C2sError::protocol(
                        StreamErrorCondition::NotWellFormed,
                        format!("Unexpected closing tag </{}>", name),
                    ));
                }
                self.buffer.drain(..=end);
                self.stream_open = false;
                return Ok(Some(ParsedStanza::StreamEnd));
            }

            return match element_len(buf)? {
                Some(len) if len > self.max_stanza_size => Err(oversized(len)),
                Some(len) => {
                    let fragment: Vec<u8> = self.buffer.drain(..len).collect();
                    let fragment = String::from_utf8(fragment).map_err(|_| {
                        C2sError::protocol(
                            StreamErrorCondition::UnsupportedEncoding,
                            "Stanza is not valid UTF-8",
                        )
                    })?;
                    classify(&fragment).map(Some)
                }
                None => self.incomplete(),
            };
        }
    }

    fn incomplete(&self) -> Result<Option<ParsedStanza>, C2sError> {
        if self.buffer.len() > self.max_stanza_size {
            return Err(oversized(self.buffer.len()));
        }
        Ok(None)
    }
}

fn oversized(len: usize) -> C2sError {
    C2sError::protocol(
        StreamErrorCondition::PolicyViolation,
        format!("Stanza of {} bytes exceeds the size limit", len),
    )
}

fn restricted_xml(text: &str) -> C2sError {
    C2sError::protocol(StreamErrorCondition::RestrictedXml, text)
}

fn utf8(bytes: &[u8]) -> Result<&str, C2sError> {
    std::str::from_utf8(bytes).map_err(|_| {
        C2sError::protocol(
            StreamErrorCondition::UnsupportedEncoding,
            "Stream data is not valid UTF-8",
        )
    })
}

/// Position of `needle` in `hay` at or after `from`.
fn find(hay: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= hay.len() {
        return None;
    }
    hay[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Index of the `>` closing the tag that opens at `start`, honoring quoted
/// attribute values.
fn tag_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in buf.iter().enumerate().skip(start + 1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Length of the complete element at the start of `buf`, or `None` while it
/// is still incomplete.
fn element_len(buf: &[u8]) -> Result<Option<usize>, C2sError> {
    let mut depth = 0usize;
    let mut pos = 0usize;

    loop {
        let Some(lt) = buf[pos..].iter().position(|&b| b == b'<').map(|p| p + pos) else {
            return Ok(None);
        };
        let rest = &buf[lt..];

        if rest.starts_with(b"<?") {
            return Err(restricted_xml("Processing instructions are not allowed"));
        }

        if rest.starts_with(b"<!") {
            if rest.starts_with(b"<!--") {
                match find(buf, lt + 4, b"-->") {
                    Some(end) => {
                        pos = end + 3;
                        continue;
                    }
                    None => return Ok(None),
                }
            }
            if rest.starts_with(b"<![CDATA[") {
                match find(buf, lt + 9, b"]]>") {
                    Some(end) => {
                        pos = end + 3;
                        continue;
                    }
                    None => return Ok(None),
                }
            }
            if rest.len() < 9 && (b"<!--".starts_with(rest) || b"<![CDATA[".starts_with(rest)) {
                return Ok(None);
            }
            return Err(restricted_xml("DTDs are not allowed"));
        }

        let Some(end) = tag_end(buf, lt) else {
            return Ok(None);
        };

        if rest.starts_with(b"</") {
            depth = depth.checked_sub(1).ok_or_else(|| {
                C2sError::protocol(StreamErrorCondition::NotWellFormed, "Unbalanced closing tag")
            })?;
            if depth == 0 {
                return Ok(Some(end + 1));
            }
        } else if buf[end - 1] == b'/' {
            if depth == 0 {
                return Ok(Some(end + 1));
            }
        } else {
            depth += 1;
        }

        pos = end + 1;
    }
}

/// Name of the element whose start tag begins `tag`.
fn tag_name(tag: &str) -> &str {
    let body = tag.trim_start_matches('<');
    let end = body
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(body.len());
    &body[..end]
}

/// Parse the attributes of a start tag.
fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    let body = tag.trim_start_matches('<');
    let name_len = tag_name(tag).len();
    let mut rest = &body[name_len..];
    let mut attrs = Vec::new();

    loop {
        rest = rest.trim_start();
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim();
        if key.is_empty() || key.contains(['>', '/', '<']) {
            break;
        }

        let after = rest[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '\'' || *c == '"') else {
            break;
        };
        let Some(close) = after[1..].find(quote) else { break };

        attrs.push((key.to_string(), unescape(&after[1..1 + close])));
        rest = &after[close + 2..];
    }

    attrs
}

/// Add the namespace declarations a top-level fragment inherits from the
/// stream header, so it can be parsed on its own.
fn qualify(fragment: &str) -> String {
    let name = tag_name(fragment);
    let start_tag_end = tag_end(fragment.as_bytes(), 0).unwrap_or(fragment.len());
    let start_tag = &fragment[..start_tag_end];
    let attrs = parse_attributes(start_tag);
    let declares = |key: &str| attrs.iter().any(|(k, _)| k == key);

    let mut extra = String::new();
    if !name.contains(':') && !declares("xmlns") {
        extra.push_str(&format!(" xmlns='{}'", ns::JABBER_CLIENT));
    }
    if fragment.contains("stream:") && !declares("xmlns:stream") {
        extra.push_str(&format!(" xmlns:stream='{}'", ns::STREAM));
    }

    if extra.is_empty() {
        return fragment.to_string();
    }

    let insert_at = 1 + name.len();
    let mut qualified = String::with_capacity(fragment.len() + extra.len());
    qualified.push_str(&fragment[..insert_at]);
    qualified.push_str(&extra);
    qualified.push_str(&fragment[insert_at..]);
    qualified
}

/// Parse a complete top-level fragment and decide what it is.
fn classify(fragment: &str) -> Result<ParsedStanza, C2sError> {
    let element = parse_element(&qualify(fragment))?;
    let name = element.name().to_string();
    let namespace = element.ns();

    let parsed = match (name.as_str(), namespace.as_str()) {
        ("auth", ns::SASL) => ParsedStanza::SaslAuth {
            mechanism: element.attr("mechanism").unwrap_or_default().to_string(),
            data: element.text().trim().to_string(),
        },
        ("message", ns::JABBER_CLIENT) => ParsedStanza::Message(element),
        ("presence", ns::JABBER_CLIENT) => ParsedStanza::Presence(element),
        ("iq", ns::JABBER_CLIENT) => ParsedStanza::Iq(element),
        ("error", ns::STREAM) => {
            let condition = element
                .children()
                .find(|child| child.ns() == ns::STREAMS_ERRORS && child.name() != "text")
                .and_then(|child| StreamErrorCondition::from_name(child.name()))
                .unwrap_or_default();
            ParsedStanza::StreamError(condition)
        }
        _ => ParsedStanza::Unknown(element),
    };

    Ok(parsed)
}

/// Parse a string into a minidom Element.
fn parse_element(data: &str) -> Result<Element, C2sError> {
    data.parse::<Element>()
        .map_err(|e| C2sError::xml_parse(format!("Failed to parse element: {}", e)))
}

/// Convert a minidom Element back to an XML string.
pub fn element_to_string(element: &Element) -> Result<String, C2sError> {
    let mut output = Vec::new();
    element
        .write_to(&mut output)
        .map_err(|e| C2sError::xml_parse(format!("Failed to serialize element: {}", e)))?;
    String::from_utf8(output).map_err(|e| C2sError::xml_parse(format!("Invalid UTF-8: {}", e)))
}

/// Escape text for use in XML character data or attribute values.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
