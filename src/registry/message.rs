//! Messages and the records they are encoded into
//!
//! A [`Message`] is what producers hand to the registry. It is rendered to a
//! [`Record`] exactly once, at publish time, and that record is what travels
//! through the room queue and out to every subscriber.
//!
//! Records are server-sent event frames:
//!
//! ```text
//! data: {"level":"info","message":"hello","timestamp":"2024-05-01T12:00:00Z"}
//! <blank line>
//! ```

use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity tag attached to a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown level name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl std::fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown log level: {}", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "success" => Ok(LogLevel::Success),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

/// How a message is rendered into the `data:` payload of a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Message text only
    Raw,
    /// JSON object with level, message and timestamp
    #[default]
    Structured,
}

/// A message produced for a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    level: LogLevel,
    #[serde(rename = "message")]
    text: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Create an info-level message stamped with the current time
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Set the severity level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Render the payload text for the given format
    pub fn render(&self, format: PayloadFormat) -> String {
        match format {
            PayloadFormat::Raw => self.text.clone(),
            PayloadFormat::Structured => match serde_json::to_string(self) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize message, sending raw text");
                    self.text.clone()
                }
            },
        }
    }

    /// Encode into a record ready for queuing
    pub fn encode(&self, format: PayloadFormat) -> Record {
        Record::from_payload(&self.render(format))
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::new(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::new(text)
    }
}

/// An encoded event-stream frame
///
/// Cheap to clone: every subscriber of a room shares the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(Bytes);

impl Record {
    const FIELD: &'static [u8] = b"data: ";

    /// Frame a payload, one `data:` line per payload line
    pub fn from_payload(payload: &str) -> Self {
        let mut buf = BytesMut::with_capacity(payload.len() + Self::FIELD.len() + 2);

        for line in split_lines(payload) {
            buf.put_slice(Self::FIELD);
            buf.put_slice(line.as_bytes());
            buf.put_u8(b'\n');
        }
        buf.put_u8(b'\n');

        Record(buf.freeze())
    }

    /// Wrap bytes that already hold an encoded frame
    pub fn from_bytes(bytes: Bytes) -> Self {
        Record(bytes)
    }

    /// Recover the payload by joining the `data:` lines
    pub fn payload(&self) -> String {
        String::from_utf8_lossy(&self.0)
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Split on every event-stream line terminator: `\r\n`, `\r` or `\n`
///
/// A bare `\r` must not survive into a frame, or the text after it would be
/// read as a separate field.
fn split_lines(payload: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(payload);
    std::iter::from_fn(move || {
        let text = rest?;
        match text.find(['\r', '\n']) {
            Some(at) => {
                let skip = if text[at..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&text[at + skip..]);
                Some(&text[..at])
            }
            None => {
                rest = None;
                Some(text)
            }
        }
    })
}

impl From<Record> for Bytes {
    fn from(record: Record) -> Self {
        record.0
    }
}
