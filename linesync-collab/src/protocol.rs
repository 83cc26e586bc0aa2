//! Text protocol between clients and the sync server.
//!
//! Client → server, one JSON record per frame, each terminated by
//! [`DELIMITER`]:
//! ```text
//! {"opcode":"INSERT","line":"1","idx":"0","char":"X","ver":0,"id":"…"}␝
//! ```
//!
//! Server → client, header fields and document lines joined by
//! [`DELIMITER`], each message terminated by [`END_OF_MESSAGE`]:
//! ```text
//! VERSION: 3␝CURSOR: 1.4␝hello\n␝world␞
//! ID: 6f1c…␞
//! ACK: 12␞
//! ```
//!
//! A frame may carry an optional `"seq"`. The acting client's own reply to
//! such a frame is followed by `ACK: <seq>`, so a client can tell it apart
//! from states caused by other clients.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::document::Position;

/// Frame delimiter (ASCII group separator). Never valid document content.
pub const DELIMITER: char = '\u{1D}';

/// Terminates one server message (ASCII record separator).
pub const END_OF_MESSAGE: char = '\u{1E}';

const VERSION_PREFIX: &str = "VERSION: ";
const CURSOR_PREFIX: &str = "CURSOR: ";
const ID_PREFIX: &str = "ID: ";
const ACK_PREFIX: &str = "ACK: ";

/// Identity assigned to a connection when it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ClientId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| ProtocolError::Malformed(format!("client id: {e}")))
    }
}

/// Caret movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// The effect an operation asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    InsertChar(char),
    InsertSpace,
    InsertReturn,
    Backspace,
    CursorMove(Direction),
}

impl Edit {
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::CursorMove(_) => "CURSOR",
            _ => "INSERT",
        }
    }

    /// Value of the `char` field on the wire.
    pub fn payload(&self) -> String {
        match self {
            Self::InsertChar(c) => c.to_string(),
            Self::InsertSpace => "space".to_string(),
            Self::InsertReturn => "return".to_string(),
            Self::Backspace => "backspace".to_string(),
            Self::CursorMove(dir) => dir.as_str().to_string(),
        }
    }
}

/// A decoded client request, stamped with the connection it arrived on.
///
/// `line` and `column` are kept signed and unclamped; the engine resolves
/// them against the document at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub client: ClientId,
    pub edit: Edit,
    pub line: i64,
    pub column: i64,
    /// Last document version the client had seen.
    pub version: u64,
    /// Client-chosen number echoed back in an `ACK:` once applied.
    pub seq: Option<u64>,
}

impl Operation {
    pub fn new(client: ClientId, edit: Edit, at: Position, version: u64) -> Self {
        Self {
            client,
            edit,
            line: at.line as i64,
            column: at.column as i64,
            version,
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Decode one frame (without its delimiter) received from `client`.
    ///
    /// The frame's own `id` field is not trusted: the operation is always
    /// attributed to the connection it arrived on.
    pub fn decode(client: ClientId, frame: &[u8]) -> Result<Self, ProtocolError> {
        let raw: OperationFrame = serde_json::from_slice(frame)?;
        let edit = parse_edit(&raw.opcode, &raw.payload)?;
        Ok(Self {
            client,
            edit,
            line: raw.line,
            column: raw.idx,
            version: raw.ver.max(0) as u64,
            seq: raw.seq,
        })
    }

    /// Encode as a delimiter-terminated frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let frame = OperationFrame {
            opcode: self.edit.opcode().to_string(),
            line: self.line,
            idx: self.column,
            payload: self.edit.payload(),
            ver: self.version as i64,
            id: Some(serde_json::Value::String(self.client.to_string())),
            seq: self.seq,
        };
        let mut bytes = serde_json::to_vec(&frame)?;
        let mut delim = [0u8; 4];
        bytes.extend_from_slice(DELIMITER.encode_utf8(&mut delim).as_bytes());
        Ok(bytes)
    }
}

/// Wire shape of a client frame.
#[derive(Debug, Serialize, Deserialize)]
struct OperationFrame {
    opcode: String,
    #[serde(deserialize_with = "lenient_int")]
    line: i64,
    #[serde(deserialize_with = "lenient_int")]
    idx: i64,
    #[serde(rename = "char")]
    payload: String,
    #[serde(default, deserialize_with = "lenient_int")]
    ver: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
}

/// Accept `3` as well as `"3"`.
fn lenient_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(n) => Ok(n),
        IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn parse_edit(opcode: &str, payload: &str) -> Result<Edit, ProtocolError> {
    match opcode {
        // "MODIFY" is what older clients send for INSERT.
        "INSERT" | "MODIFY" => match payload {
            "space" => Ok(Edit::InsertSpace),
            "return" => Ok(Edit::InsertReturn),
            "backspace" => Ok(Edit::Backspace),
            literal => {
                let mut chars = literal.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_control() => Ok(Edit::InsertChar(c)),
                    _ => Err(ProtocolError::InvalidPayload {
                        opcode: opcode.to_string(),
                        payload: literal.to_string(),
                    }),
                }
            }
        },
        "CURSOR" => match payload {
            "left" => Ok(Edit::CursorMove(Direction::Left)),
            "right" => Ok(Edit::CursorMove(Direction::Right)),
            "up" => Ok(Edit::CursorMove(Direction::Up)),
            "down" => Ok(Edit::CursorMove(Direction::Down)),
            other => Err(ProtocolError::InvalidPayload {
                opcode: opcode.to_string(),
                payload: other.to_string(),
            }),
        },
        other => Err(ProtocolError::UnknownOpcode(other.to_string())),
    }
}

/// Encode the document body shared by every state message of one broadcast.
pub fn encode_body(lines: &[String]) -> String {
    let mut body = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        body.push(DELIMITER);
        body.push_str(line);
    }
    body.push(END_OF_MESSAGE);
    body
}

/// Prefix a pre-encoded body with one recipient's header.
pub fn encode_state(version: u64, cursor: Position, body: &str) -> String {
    format!("{VERSION_PREFIX}{version}{DELIMITER}{CURSOR_PREFIX}{cursor}{body}")
}

/// Greeting sent to a client right after it is registered.
pub fn encode_welcome(client: ClientId) -> String {
    format!("{ID_PREFIX}{client}{END_OF_MESSAGE}")
}

/// Sent to the acting client after its reply to a frame with a `seq`.
pub fn encode_ack(seq: u64) -> String {
    format!("{ACK_PREFIX}{seq}{END_OF_MESSAGE}")
}

/// A decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Welcome(ClientId),
    State(DocumentState),
    /// Every state up to and including the previous one reflects the
    /// client's own frame with this `seq`.
    Ack(u64),
}

/// The state a client renders: version, its own caret, all lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentState {
    pub version: u64,
    pub cursor: Position,
    pub lines: Vec<String>,
}

impl ServerMessage {
    /// Parse one message with its [`END_OF_MESSAGE`] already stripped.
    pub fn parse(message: &str) -> Result<Self, ProtocolError> {
        if let Some(id) = message.strip_prefix(ID_PREFIX) {
            return id.parse().map(Self::Welcome);
        }
        if let Some(seq) = message.strip_prefix(ACK_PREFIX) {
            return seq
                .trim()
                .parse()
                .map(Self::Ack)
                .map_err(|e| ProtocolError::Malformed(format!("ack: {e}")));
        }

        let mut fields = message.split(DELIMITER);
        let version = fields
            .next()
            .and_then(|f| f.strip_prefix(VERSION_PREFIX))
            .ok_or_else(|| ProtocolError::Malformed("missing VERSION header".into()))?
            .trim()
            .parse::<u64>()
            .map_err(|e| ProtocolError::Malformed(format!("version: {e}")))?;

        let cursor = fields
            .next()
            .and_then(|f| f.strip_prefix(CURSOR_PREFIX))
            .ok_or_else(|| ProtocolError::Malformed("missing CURSOR header".into()))?;
        let cursor = parse_position(cursor)?;

        let lines = fields.map(str::to_string).collect();
        Ok(Self::State(DocumentState {
            version,
            cursor,
            lines,
        }))
    }
}

fn parse_position(s: &str) -> Result<Position, ProtocolError> {
    let (line, column) = s
        .trim()
        .split_once('.')
        .ok_or_else(|| ProtocolError::Malformed(format!("cursor `{s}`")))?;
    let line = line
        .parse()
        .map_err(|e| ProtocolError::Malformed(format!("cursor line: {e}")))?;
    let column = column
        .parse()
        .map_err(|e| ProtocolError::Malformed(format!("cursor column: {e}")))?;
    Ok(Position { line, column })
}

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),
    #[error("invalid payload `{payload}` for {opcode}")]
    InvalidPayload { opcode: String, payload: String },
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out waiting for the server")]
    Timeout,
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}
