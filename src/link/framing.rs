//! Newline-delimited message framing for the controller link.
//!
//! The controller speaks one JSON value per line in both directions. TCP
//! delivers those lines in arbitrary fragments, so inbound bytes are
//! accumulated in a receive buffer and complete lines are cut off the front
//! as their delimiter arrives.
//!
//! # Wire Format
//!
//! ```text
//! {"ok":true}\n
//! {"ok":true,"distance_cm":12.5,"cliff":"safe"}\n
//! ```
//!
//! Surrounding whitespace (including a `\r` from CRLF peers) is trimmed and
//! blank lines are skipped.

use tracing::warn;

use crate::models::Response;

/// Message delimiter used in both directions.
pub const DELIMITER: u8 = b'\n';

/// Maximum length of one line, delimiter excluded (1MB).
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// One unit produced by the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete, trimmed, non-empty line.
    Line(String),
    /// A line that exceeded the limit. Its bytes were dropped up to and
    /// including the delimiter; it still stands for exactly one response.
    Oversized(usize),
}

/// Incremental line framer.
///
/// Owns the receive buffer for exactly one connection. Call [`reset`] when
/// the connection drops; a half-received line is never carried over.
///
/// [`reset`]: LineFramer::reset
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line: usize,
    /// Bytes dropped so far from an oversized line still in progress.
    discarding: Option<usize>,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_LENGTH)
    }

    /// Create a framer with a custom overflow limit.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_line,
            discarding: None,
        }
    }

    /// Append `bytes` and return every frame completed by them.
    ///
    /// Frames come back in arrival order. Empty lines produce nothing. A line
    /// over the limit produces a single [`Frame::Oversized`] once its
    /// delimiter arrives, however it was fragmented.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            let delimiter = rest.iter().position(|&b| b == DELIMITER);

            if let Some(dropped) = self.discarding {
                match delimiter {
                    Some(offset) => {
                        let length = dropped + offset;
                        warn!("Discarded oversized line of {} bytes (max {})", length, self.max_line);
                        frames.push(Frame::Oversized(length));
                        self.discarding = None;
                        rest = &rest[offset + 1..];
                    }
                    None => {
                        self.discarding = Some(dropped + rest.len());
                        rest = &[];
                    }
                }
                continue;
            }

            match delimiter {
                Some(offset) => {
                    let length = self.buffer.len() + offset;
                    if length > self.max_line {
                        warn!("Discarded oversized line of {} bytes (max {})", length, self.max_line);
                        frames.push(Frame::Oversized(length));
                    } else {
                        self.buffer.extend_from_slice(&rest[..offset]);
                        if let Some(line) = trimmed_line(&self.buffer) {
                            frames.push(Frame::Line(line));
                        }
                    }
                    self.buffer.clear();
                    rest = &rest[offset + 1..];
                }
                None => {
                    self.buffer.extend_from_slice(rest);
                    rest = &[];
                    if self.buffer.len() > self.max_line {
                        self.discarding = Some(self.buffer.len());
                        self.buffer.clear();
                    }
                }
            }
        }

        frames
    }

    /// Drop any partially received line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = None;
    }

    /// Number of bytes waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl From<Frame> for Response {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Line(line) => Response::parse(&line),
            Frame::Oversized(length) => Response::Oversized(length),
        }
    }
}

fn trimmed_line(bytes: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(bytes);
    let trimmed = line.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
