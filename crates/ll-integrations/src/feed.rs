//! Feed client: pulls events from an [`EventSource`] and hands them, in
//! arrival order, to an [`EventHandler`].
//!
//! Two sources ship with the crate:
//! - [`ReplaySource`] reads recorded live-timing lines from a file or stdin
//! - [`ChannelSource`] wraps an mpsc receiver for embedding and tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ll_core::event::{Event, Topic};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FeedError {
    /// No event arrived within the read timeout.
    #[error("no event received for {0:?}")]
    Timeout(Duration),

    /// Reading the underlying stream failed.
    #[error("feed io error: {0}")]
    Io(#[from] std::io::Error),

    /// Source-specific failure.
    #[error("feed source error: {0}")]
    Source(String),
}

/// A replay line that could not be turned into an [`Event`].
#[derive(Debug, Error, PartialEq)]
pub enum LineError {
    #[error("not JSON: {0}")]
    Json(String),
    #[error("expected [topic, content, timestamp?] or an object with topic/content")]
    Shape,
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An asynchronous stream of feed events. `Ok(None)` is end of stream.
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Result<Option<Event>, FeedError>;
}

#[async_trait]
impl<S: EventSource + ?Sized> EventSource for Box<S> {
    async fn next_event(&mut self) -> Result<Option<Event>, FeedError> {
        (**self).next_event().await
    }
}

/// Consumer of feed events. Called once per event, never concurrently.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event);
}

// ---------------------------------------------------------------------------
// FeedClient
// ---------------------------------------------------------------------------

/// How a feed read loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEnd {
    EndOfStream,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub events_received: u64,
    pub end: FeedEnd,
}

pub struct FeedClient<S> {
    source: S,
    handler: Arc<dyn EventHandler>,
    read_timeout: Duration,
}

impl<S: EventSource> FeedClient<S> {
    pub fn new(source: S, handler: Arc<dyn EventHandler>, read_timeout: Duration) -> Self {
        Self {
            source,
            handler,
            read_timeout,
        }
    }

    /// Read until end of stream, cancellation, timeout or source error.
    ///
    /// Cancellation is only observed while waiting for the next event; an
    /// event already being handled is finished first.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<FeedStats, FeedError> {
        let mut events_received = 0_u64;
        info!(read_timeout_secs = self.read_timeout.as_secs_f64(), "feed client started");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(events_received, "feed client cancelled");
                    return Ok(FeedStats { events_received, end: FeedEnd::Cancelled });
                }
                next = tokio::time::timeout(self.read_timeout, self.source.next_event()) => next,
            };

            match next {
                Err(_) => {
                    warn!(
                        timeout_secs = self.read_timeout.as_secs_f64(),
                        events_received,
                        "feed read timed out"
                    );
                    return Err(FeedError::Timeout(self.read_timeout));
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(None)) => {
                    info!(events_received, "feed reached end of stream");
                    return Ok(FeedStats {
                        events_received,
                        end: FeedEnd::EndOfStream,
                    });
                }
                Ok(Ok(Some(event))) => {
                    events_received += 1;
                    self.handler.handle_event(event).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelSource
// ---------------------------------------------------------------------------

/// Events pushed through a channel; end of stream once every sender is gone.
pub struct ChannelSource {
    rx: mpsc::Receiver<Event>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// A bounded channel and the source reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Event>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<Event>, FeedError> {
        Ok(self.rx.recv().await)
    }
}

// ---------------------------------------------------------------------------
// ReplaySource
// ---------------------------------------------------------------------------

/// Recorded feed, one JSON value per line.
///
/// Accepted line shapes:
/// - `["TimingAppData", {...}, "2024-03-02T15:04:05.123Z"]`
/// - `["Heartbeat", {...}]` (stamped with the read time)
/// - `{"topic": "...", "content": ..., "timestamp": "..."}`
///
/// Malformed lines are logged and skipped. With pacing enabled, consecutive
/// events are spaced by the difference of their recorded timestamps.
pub struct ReplaySource<R> {
    lines: Lines<R>,
    line_no: u64,
    skipped: u64,
    realtime: bool,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<R: AsyncBufRead + Unpin + Send> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
            realtime: false,
            last_timestamp: None,
        }
    }

    pub fn realtime(mut self, enabled: bool) -> Self {
        self.realtime = enabled;
        self
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    async fn pace(&mut self, timestamp: DateTime<Utc>) {
        if !self.realtime {
            return;
        }
        if let Some(prev) = self.last_timestamp.replace(timestamp) {
            if let Ok(gap) = (timestamp - prev).to_std() {
                tokio::time::sleep(gap).await;
            }
        }
    }
}

impl ReplaySource<BufReader<tokio::fs::File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        debug!(path = %path.as_ref().display(), "opened replay file");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl ReplaySource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for ReplaySource<R> {
    async fn next_event(&mut self) -> Result<Option<Event>, FeedError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line, Utc::now()) {
                Ok(event) => {
                    self.pace(event.timestamp).await;
                    return Ok(Some(event));
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, error = %e, "skipping malformed replay line");
                }
            }
        }
        Ok(None)
    }
}

/// Parse one recorded line; `now` stamps lines that carry no timestamp.
pub fn parse_line(line: &str, now: DateTime<Utc>) -> Result<Event, LineError> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => python_literal(line).ok_or_else(|| LineError::Json(e.to_string()))?,
    };

    let (topic, content, timestamp) = match &value {
        Value::Array(items) => match items.as_slice() {
            [Value::String(topic), content, rest @ ..] => (topic, content, rest.first()),
            _ => return Err(LineError::Shape),
        },
        Value::Object(map) => match (map.get("topic"), map.get("content")) {
            (Some(Value::String(topic)), Some(content)) => (topic, content, map.get("timestamp")),
            _ => return Err(LineError::Shape),
        },
        _ => return Err(LineError::Shape),
    };

    let timestamp = match timestamp {
        None | Some(Value::Null) => now,
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| LineError::Timestamp(raw.clone()))?,
        Some(other) => return Err(LineError::Timestamp(other.to_string())),
    };

    Ok(Event::new(Topic::parse(topic), content.clone(), timestamp))
}

/// Parse a Python literal as written by `str(obj)`: single-quoted strings,
/// `True`/`False`/`None`, tuples and trailing commas.
fn python_literal(line: &str) -> Option<Value> {
    let mut json = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let mut text = String::new();
                loop {
                    match chars.next()? {
                        '\\' => text.push(python_escape(&mut chars)?),
                        ch if ch == c => break,
                        ch => text.push(ch),
                    }
                }
                json.push_str(&serde_json::to_string(&text).ok()?);
            }
            '(' => json.push('['),
            ']' | '}' | ')' => {
                let kept = json.trim_end().trim_end_matches(',').len();
                json.truncate(kept);
                json.push(if c == '}' { '}' } else { ']' });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                match word.as_str() {
                    "True" => json.push_str("true"),
                    "False" => json.push_str("false"),
                    "None" => json.push_str("null"),
                    // Exponent marker inside a number, e.g. 1e-05.
                    w if is_exponent(w) && json.ends_with(|d: char| d.is_ascii_digit()) => {
                        json.push_str(w)
                    }
                    _ => return None,
                }
            }
            other => json.push(other),
        }
    }
    serde_json::from_str(&json).ok()
}

fn is_exponent(word: &str) -> bool {
    word.starts_with(|c: char| c == 'e' || c == 'E')
        && word[1..].chars().all(|c| c.is_ascii_digit())
}

fn python_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<char> {
    let hex = |chars: &mut std::iter::Peekable<std::str::Chars<'_>>, n: usize| {
        let digits: String = chars.by_ref().take(n).collect();
        u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
    };
    Some(match chars.next()? {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        'x' => hex(chars, 2)?,
        'u' => hex(chars, 4)?,
        'U' => hex(chars, 8)?,
        other => other,
    })
}
