use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

// encode and decode bypass traditional libraries
// like serde or message pack -- the wire format is plain
// newline-terminated text lines with a leading tag and
// ':' separated fields

const TAG_MSG: &str = "!msg";
const TAG_PRIVATE: &str = "!pv";
const TAG_JOIN: &str = "!newcli";
const TAG_LEAVE: &str = "!rmcli";
const TAG_NO_TARGET: &str = "!errNoCli";
const TAG_ROSTER: &str = "!addcli";

// Embedded newlines travel as a literal run of three spaces.
// Lossy if chat text itself contains the run -- kept as-is for
// wire compatibility.
const NEWLINE_SUB: &str = "   ";

// cap on a single unterminated line before the peer is cut off
const MAX_LINE_LEN: usize = 8192;

/// Client to server messages.
///
/// The handshake name line carries no tag, so any line that does not
/// start with `!` decodes as [`Request::Hello`]; the server only honors
/// it as a handshake, everything later in the session ignores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Hello { name: String },
    Broadcast { sender_id: u32, text: String },  // !msg:<id>:<text>
    Private { target: String, text: String },    // !pv:<name>:<text>
    RosterRefresh,                               // !addcli
    Unknown,
}

/// Server to client messages.
///
/// Note `!pv` swaps its second field by direction: clients send a target
/// name, the server relays back the resolved sender id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Broadcast { sender_id: u32, text: String },  // !msg:<id>:<text>
    Private { sender_id: u32, text: String },    // !pv:<id>:<text>
    Join { id: u32, name: String },              // !newcli:<id>:<name>
    Leave { id: u32 },                           // !rmcli:<id>
    NoSuchTarget { name: String },               // !errNoCli:<name>
    Unknown,
}

/// Server side of the wire: decodes [`Request`], encodes [`Response`].
pub struct ServerCodec;

/// Client side of the wire: decodes [`Response`], encodes [`Request`].
pub struct ClientCodec;

impl Decoder for ServerCodec {
    type Item = Request;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match take_line(src)? {
            Some(line) => Ok(Some(parse_request(&line))),
            None => Ok(None),
        }
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match take_line(src)? {
            Some(line) => Ok(Some(parse_response(&line))),
            None => Ok(None),
        }
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Response::Broadcast { sender_id, text } => {
                put_line(&format!("{}:{}:{}", TAG_MSG, sender_id, escape_newlines(&text)), dst)
            }
            Response::Private { sender_id, text } => {
                put_line(&format!("{}:{}:{}", TAG_PRIVATE, sender_id, escape_newlines(&text)), dst)
            }
            Response::Join { id, name } => {
                put_line(&format!("{}:{}:{}", TAG_JOIN, id, name), dst)
            }
            Response::Leave { id } => put_line(&format!("{}:{}", TAG_LEAVE, id), dst),
            Response::NoSuchTarget { name } => {
                put_line(&format!("{}:{}", TAG_NO_TARGET, name), dst)
            }
            Response::Unknown => debug!("skipping encode of unknown response"),
        }
        Ok(())
    }
}

impl Encoder<Request> for ClientCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Request::Hello { name } => put_line(&name, dst),
            Request::Broadcast { sender_id, text } => {
                put_line(&format!("{}:{}:{}", TAG_MSG, sender_id, escape_newlines(&text)), dst)
            }
            Request::Private { target, text } => {
                put_line(&format!("{}:{}:{}", TAG_PRIVATE, target, escape_newlines(&text)), dst)
            }
            Request::RosterRefresh => put_line(TAG_ROSTER, dst),
            Request::Unknown => debug!("skipping encode of unknown request"),
        }
        Ok(())
    }
}

// Classify one client line by its tag. Malformed field layouts fall
// through to Unknown rather than erroring, so a bad line never takes
// the connection down with it.
fn parse_request(line: &str) -> Request {
    if !line.starts_with('!') {
        return Request::Hello { name: line.to_owned() };
    }

    if let Some(rest) = strip_tag(line, TAG_MSG) {
        if let Some((id, text)) = rest.split_once(':') {
            if let Ok(sender_id) = id.parse() {
                return Request::Broadcast { sender_id, text: unescape_newlines(text) };
            }
        }
    } else if let Some(rest) = strip_tag(line, TAG_PRIVATE) {
        if let Some((target, text)) = rest.split_once(':') {
            return Request::Private {
                target: target.to_owned(),
                text: unescape_newlines(text),
            };
        }
    } else if line.starts_with(TAG_ROSTER) {
        return Request::RosterRefresh;
    }

    debug!("unrecognized client line: {:?}", line);
    Request::Unknown
}

// Classify one server line by its tag.
fn parse_response(line: &str) -> Response {
    if let Some(rest) = strip_tag(line, TAG_MSG) {
        if let Some((id, text)) = rest.split_once(':') {
            if let Ok(sender_id) = id.parse() {
                return Response::Broadcast { sender_id, text: unescape_newlines(text) };
            }
        }
    } else if let Some(rest) = strip_tag(line, TAG_PRIVATE) {
        if let Some((id, text)) = rest.split_once(':') {
            if let Ok(sender_id) = id.parse() {
                return Response::Private { sender_id, text: unescape_newlines(text) };
            }
        }
    } else if let Some(rest) = strip_tag(line, TAG_JOIN) {
        if let Some((id, name)) = rest.split_once(':') {
            if let Ok(id) = id.parse() {
                return Response::Join { id, name: name.to_owned() };
            }
        }
    } else if let Some(rest) = strip_tag(line, TAG_LEAVE) {
        // trailing fields after the id are tolerated and dropped
        if let Ok(id) = rest.split(':').next().unwrap_or(rest).parse() {
            return Response::Leave { id };
        }
    } else if let Some(rest) = strip_tag(line, TAG_NO_TARGET) {
        // everything after the tag is the name, colons included
        return Response::NoSuchTarget { name: rest.to_owned() };
    }

    debug!("unrecognized server line: {:?}", line);
    Response::Unknown
}

// "<tag>:<rest>" -> Some(rest)
fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix(tag)?.strip_prefix(':')
}

// Pull one newline-terminated line out of the read buffer.
// Tolerates a trailing '\r'; replaces invalid utf8 rather than failing.
fn take_line(src: &mut BytesMut) -> Result<Option<String>, std::io::Error> {
    let Some(pos) = src.iter().position(|b| *b == b'\n') else {
        if src.len() > MAX_LINE_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "line exceeds maximum length",
            ));
        }
        return Ok(None);
    };

    let mut line = src.split_to(pos + 1);
    line.truncate(pos);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

fn put_line(line: &str, dst: &mut BytesMut) {
    dst.reserve(line.len() + 1);
    dst.put_slice(line.as_bytes());
    dst.put_u8(b'\n');
}

fn escape_newlines(text: &str) -> String {
    text.replace('\n', NEWLINE_SUB)
}

fn unescape_newlines(text: &str) -> String {
    text.replace(NEWLINE_SUB, "\n")
}
