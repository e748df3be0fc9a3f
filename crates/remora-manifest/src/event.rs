//! Manifest events and their line encoding.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::error::ManifestError;
use crate::{SHORT_ID_LEN, TIMESTAMP_FORMAT, TIMESTAMP_LEN};

/// Stream an event was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Lifecycle transitions (the default when no tag is present)
    State,
    /// Captured standard output
    Stdout,
    /// Captured standard error
    Stderr,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::State => "state",
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
        }
    }

    /// Parse the inside of a `[channel]` tag. Case-insensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "state" => Some(Channel::State),
            "stdout" => Some(Channel::Stdout),
            "stderr" => Some(Channel::Stderr),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle tags understood on the state channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateTag {
    Submitted,
    Started,
    Running,
    Completed,
    Failed,
}

impl StateTag {
    pub const ALL: [StateTag; 5] = [
        StateTag::Submitted,
        StateTag::Started,
        StateTag::Running,
        StateTag::Completed,
        StateTag::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateTag::Submitted => "submitted",
            StateTag::Started => "started",
            StateTag::Running => "running",
            StateTag::Completed => "completed",
            StateTag::Failed => "failed",
        }
    }

    /// Check whether `content` names this tag (case-insensitive, surrounding
    /// whitespace ignored).
    pub fn matches(&self, content: &str) -> bool {
        content.trim().eq_ignore_ascii_case(self.as_str())
    }
}

impl FromStr for StateTag {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.matches(s))
            .ok_or_else(|| ManifestError::UnknownState(s.trim().to_string()))
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single manifest event.
///
/// `content` may span several lines for the stdout/stderr channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEvent {
    /// Remote wall-clock time the event was appended
    pub timestamp: NaiveDateTime,
    /// Short id of the producing Process or Runner
    pub producer: String,
    pub channel: Channel,
    pub content: String,
}

impl ManifestEvent {
    pub fn new(
        timestamp: NaiveDateTime,
        producer: impl Into<String>,
        channel: Channel,
        content: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            producer: producer.into(),
            channel,
            content: content.into(),
        }
    }

    /// Create a state-channel event for a lifecycle tag
    pub fn state(timestamp: NaiveDateTime, producer: impl Into<String>, tag: StateTag) -> Self {
        Self::new(timestamp, producer, Channel::State, tag.as_str())
    }

    /// The lifecycle tag carried by this event, if it is a recognised state event
    pub fn state_tag(&self) -> Option<StateTag> {
        if self.channel != Channel::State {
            return None;
        }
        self.content.parse().ok()
    }

    /// Encode as manifest text. State events omit the channel tag.
    pub fn to_line(&self) -> String {
        match self.channel {
            Channel::State => format!(
                "{} [{}] {}",
                format_timestamp(&self.timestamp),
                self.producer,
                self.content
            ),
            channel => format!(
                "{} [{}] [{}] {}",
                format_timestamp(&self.timestamp),
                self.producer,
                channel,
                self.content
            ),
        }
    }
}

impl fmt::Display for ManifestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

impl FromStr for ManifestEvent {
    type Err = ManifestError;

    /// Strict parse of one event. Continuation lines become part of the content.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (first, rest) = match s.split_once('\n') {
            Some((first, rest)) => (first, Some(rest)),
            None => (s, None),
        };
        let header = split_header(first).ok_or_else(|| ManifestError::MalformedLine(first.to_string()))?;
        let mut event = header.into_event();
        if let Some(rest) = rest {
            event.content.push('\n');
            event.content.push_str(rest);
        }
        Ok(event)
    }
}

/// Decoded prefix of a timestamped line.
pub(crate) struct Header<'a> {
    pub timestamp: NaiveDateTime,
    pub producer: &'a str,
    pub channel: Channel,
    pub content: &'a str,
}

impl Header<'_> {
    pub fn into_event(self) -> ManifestEvent {
        ManifestEvent::new(self.timestamp, self.producer, self.channel, self.content)
    }
}

/// Split a line into its fixed-offset header fields.
///
/// Returns `None` when the line does not start with
/// `<timestamp> [<short-id>]`, i.e. when it is a continuation line.
pub(crate) fn split_header(line: &str) -> Option<Header<'_>> {
    let producer_start = TIMESTAMP_LEN + 2;
    let producer_end = producer_start + SHORT_ID_LEN;

    let timestamp = parse_timestamp(line.get(..TIMESTAMP_LEN)?).ok()?;
    if line.get(TIMESTAMP_LEN..producer_start)? != " [" {
        return None;
    }
    let producer = line.get(producer_start..producer_end)?;
    if line.get(producer_end..producer_end + 1)? != "]" {
        return None;
    }

    let tail = line.get(producer_end + 1..)?;
    let tail = tail.strip_prefix(' ').unwrap_or(tail);

    let (channel, content) = match tail.strip_prefix('[').and_then(|t| t.split_once(']')) {
        Some((tag, after)) => match Channel::from_tag(tag) {
            Some(channel) => (channel, after.strip_prefix(' ').unwrap_or(after)),
            None => (Channel::State, tail),
        },
        None => (Channel::State, tail),
    };

    Some(Header {
        timestamp,
        producer,
        channel,
        content,
    })
}

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, ManifestError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| ManifestError::InvalidTimestamp(s.to_string()))
}

/// Append one event to a manifest file, creating the file if needed.
///
/// The whole event is written with a single `write_all`; short appends are
/// assumed atomic, exactly as the remote side assumes for its `printf >>`.
pub fn append_event(path: &Path, event: &ManifestEvent) -> Result<(), ManifestError> {
    if event.producer.len() != SHORT_ID_LEN {
        return Err(ManifestError::InvalidProducer {
            expected: SHORT_ID_LEN,
            actual: event.producer.clone(),
        });
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = event.to_line();
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}
