//! Wire frames exchanged between clients and the relay.
//!
//! Frames are JSON objects, one per line:
//!
//! ```text
//! {"type":"hello","actor":"…","session":"demo"}
//! {"type":"push","transaction":{…}}
//! ```

use std::io::{BufRead, ErrorKind};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{ActorId, Transaction};

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client → relay: join a session.
    Hello {
        /// Joining actor.
        actor: ActorId,
        /// Session to join.
        session: String,
    },
    /// Relay → client: the full session log, answering `Hello`.
    Snapshot {
        /// Every transaction of the session in relay order.
        transactions: Vec<Transaction>,
    },
    /// Client → relay: a local commit.
    Push {
        /// The committed transaction.
        transaction: Transaction,
    },
    /// Relay → client: `(actor, seq)` and everything before it is stored.
    Ack {
        /// Committing actor.
        actor: ActorId,
        /// Highest stored sequence number.
        seq: u64,
    },
    /// Relay → client: a transaction committed by another peer.
    Broadcast {
        /// The remote transaction.
        transaction: Transaction,
    },
    /// Relay → client: a request was rejected.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The line is not a valid frame.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The line is empty.
    #[error("empty frame")]
    Empty,
    /// The line is not valid UTF-8.
    #[error("frame is not UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Encodes a frame as one newline-terminated line.
pub fn encode(frame: &Frame) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

/// Decodes one line (with or without its trailing newline).
pub fn decode(line: &str) -> Result<Frame, CodecError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

/// Result of one non-blocking read attempt on a framed stream.
#[derive(Debug)]
pub(crate) enum LineRead {
    /// A complete line arrived.
    Line(Result<Frame, CodecError>),
    /// No complete line yet (timeout or partial data).
    Pending,
    /// The peer closed the stream.
    Eof,
}

/// Reads from a stream with a read timeout, accumulating partial lines in `buf`.
pub(crate) fn read_frame<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead> {
    match reader.read_until(b'\n', buf) {
        Ok(0) => Ok(LineRead::Eof),
        Ok(_) if buf.ends_with(b"\n") => {
            let frame = std::str::from_utf8(buf)
                .map_err(CodecError::from)
                .and_then(decode);
            buf.clear();
            Ok(LineRead::Line(frame))
        }
        Ok(_) => Ok(LineRead::Pending),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
            ) =>
        {
            Ok(LineRead::Pending)
        }
        Err(err) => Err(err),
    }
}
