//! STOMP 1.2 frame codec
//!
//! A frame is `COMMAND EOL *(header EOL) EOL body NULL`. Header values are
//! escaped on every frame except CONNECT and CONNECTED. A `content-length`
//! header delimits the body, otherwise the first NULL byte does. Bare EOLs
//! between frames are heart-beats and are skipped.

use bytes::{Buf, BytesMut};

/// Largest frame accepted before the session is closed
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

pub const HEADER_CONTENT_LENGTH: &str = "content-length";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_DESTINATION: &str = "destination";
pub const HEADER_ID: &str = "id";
pub const HEADER_RECEIPT: &str = "receipt";
pub const HEADER_RECEIPT_ID: &str = "receipt-id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Ack => "ACK",
            StompCommand::Nack => "NACK",
            StompCommand::Begin => "BEGIN",
            StompCommand::Commit => "COMMIT",
            StompCommand::Abort => "ABORT",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let command = match value {
            "CONNECT" => StompCommand::Connect,
            "STOMP" => StompCommand::Stomp,
            "CONNECTED" => StompCommand::Connected,
            "SEND" => StompCommand::Send,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "ACK" => StompCommand::Ack,
            "NACK" => StompCommand::Nack,
            "BEGIN" => StompCommand::Begin,
            "COMMIT" => StompCommand::Commit,
            "ABORT" => StompCommand::Abort,
            "DISCONNECT" => StompCommand::Disconnect,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            _ => return None,
        };
        Some(command)
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl std::fmt::Display for StompCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Unknown STOMP command '{0}'")]
    UnknownCommand(String),
    #[error("Malformed header line '{0}'")]
    MalformedHeader(String),
    #[error("Invalid escape sequence in header '{0}'")]
    InvalidEscape(String),
    #[error("Invalid content-length '{0}'")]
    InvalidContentLength(String),
    #[error("Frame body is not terminated by NULL")]
    MissingTerminator,
    #[error("Frame exceeds the maximum size of {0} bytes")]
    TooLarge(usize),
    #[error("Frame headers are not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep their first occurrence
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Serialize, adding `content-length` for a non-empty body
    pub fn encode(&self) -> Vec<u8> {
        let escape = self.command.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');

        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.get_header(HEADER_CONTENT_LENGTH).is_none() {
            let content_length = format!("{}:{}\n", HEADER_CONTENT_LENGTH, self.body.len());
            out.extend_from_slice(content_length.as_bytes());
        }

        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

fn escape_header(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            ':' => escaped.push_str("\\c"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('c') => unescaped.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(unescaped)
}

/// Incremental decoder; a WebSocket message may hold several frames or part of one
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete frame, `None` while more data is needed
    pub fn decode(&mut self) -> Result<Option<StompFrame>, FrameError> {
        self.skip_heartbeats();
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let Some((header_end, body_start)) = find_header_end(&self.buffer) else {
            return self.incomplete();
        };

        let head = std::str::from_utf8(&self.buffer[..header_end])
            .map_err(|_| FrameError::InvalidUtf8)?;
        let mut lines = head
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty());

        let command_line = lines.next().unwrap_or_default();
        let command = StompCommand::parse(command_line)
            .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == HEADER_CONTENT_LENGTH)
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                let end = body_start
                    .checked_add(len)
                    .filter(|end| *end < self.max_frame_size)
                    .ok_or(FrameError::TooLarge(self.max_frame_size))?;
                if self.buffer.len() <= end {
                    return self.incomplete();
                }
                if self.buffer[end] != 0 {
                    return Err(FrameError::MissingTerminator);
                }
                end
            }
            None => match self.buffer[body_start..].iter().position(|b| *b == 0) {
                Some(offset) => body_start + offset,
                None => return self.incomplete(),
            },
        };

        if body_end >= self.max_frame_size {
            return Err(FrameError::TooLarge(self.max_frame_size));
        }

        let body = self.buffer[body_start..body_end].to_vec();
        self.buffer.advance(body_end + 1);

        Ok(Some(StompFrame {
            command,
            headers,
            body,
        }))
    }

    fn skip_heartbeats(&mut self) {
        loop {
            if self.buffer.starts_with(b"\n") {
                self.buffer.advance(1);
            } else if self.buffer.starts_with(b"\r\n") {
                self.buffer.advance(2);
            } else {
                break;
            }
        }
    }

    fn incomplete(&self) -> Result<Option<StompFrame>, FrameError> {
        if self.buffer.len() > self.max_frame_size {
            return Err(FrameError::TooLarge(self.max_frame_size));
        }
        Ok(None)
    }
}

/// Locate the blank line ending the headers: (end of header block, start of body)
fn find_header_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    for (i, b) in buffer.iter().enumerate() {
        if *b != b'\n' {
            continue;
        }
        let line = &buffer[line_start..i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() && line_start > 0 {
            return Some((line_start, i + 1));
        }
        line_start = i + 1;
    }
    None
}
