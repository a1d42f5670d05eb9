//! Inbound message sources.
//!
//! A message is a list of byte parts; the frame payload is always the last
//! one. [`TcpSource`] speaks a newline-delimited relay protocol where each
//! line is `<topic> <payload>` or a bare payload.

use futures::StreamExt;
use std::future::Future;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::debug;

pub type Multipart = Vec<Vec<u8>>;

/// Longest relay line accepted.
pub const MAX_LINE_LENGTH: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("relay line error: {0}")]
    Line(#[from] LinesCodecError),
}

pub trait MessageSource: Send + 'static {
    /// Next message; `Ok(None)` once the source is exhausted.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Multipart>, TransportError>> + Send;
}

/// In-process source fed through an mpsc channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Multipart>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Multipart>) -> Self {
        Self { rx }
    }

    pub fn channel(capacity: usize) -> (mpsc::Sender<Multipart>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

impl MessageSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Multipart>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Subscriber on a line-oriented relay, filtered by topic prefix.
#[derive(Debug)]
pub struct TcpSource {
    lines: FramedRead<TcpStream, LinesCodec>,
    topics: Vec<String>,
}

impl TcpSource {
    pub async fn connect<A: ToSocketAddrs>(addr: A, topics: Vec<String>) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, topics))
    }

    pub fn from_stream(stream: TcpStream, topics: Vec<String>) -> Self {
        Self {
            lines: FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            topics,
        }
    }
}

/// An empty topic list subscribes to everything.
pub fn matches_topic(line: &str, topics: &[String]) -> bool {
    topics.is_empty() || topics.iter().any(|t| line.starts_with(t.as_str()))
}

/// `"<topic> <payload>"` becomes two parts, a bare payload one.
pub fn split_line(line: &str) -> Multipart {
    let line = line.trim();
    if line.starts_with('[') {
        return vec![line.as_bytes().to_vec()];
    }
    match line.split_once(char::is_whitespace) {
        Some((topic, payload)) => vec![topic.as_bytes().to_vec(), payload.trim_start().as_bytes().to_vec()],
        None => vec![line.as_bytes().to_vec()],
    }
}

impl MessageSource for TcpSource {
    async fn recv(&mut self) -> Result<Option<Multipart>, TransportError> {
        while let Some(line) = self.lines.next().await {
            let line = line?;
            if !matches_topic(&line, &self.topics) {
                continue;
            }
            return Ok(Some(split_line(&line)));
        }
        debug!("Relay connection closed");
        Ok(None)
    }
}
