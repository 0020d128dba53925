//! NDJSON codec for the agent's protocol streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line length
//! to prevent memory exhaustion caused by unterminated or maliciously large
//! output from a misbehaving agent process.
//!
//! # Usage
//!
//! Use [`ProtoCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] over the agent's stdout.  Each
//! newline-terminated (`\n`) UTF-8 string is one complete protocol line.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted by the protocol codec: 1 MiB.
///
/// Lines exceeding this limit on the inbound stream cause
/// [`ProtoCodec::decode`] to return [`AppError::Protocol`] with
/// `"line too long"`, protecting the host from allocating unbounded memory
/// for a single message.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON line codec for the agent protocol.
///
/// Delegates line-framing to [`LinesCodec`] with a fixed [`MAX_LINE_BYTES`]
/// limit.
///
/// # Decoder
///
/// Inbound lines longer than [`MAX_LINE_BYTES`] return
/// [`AppError::Protocol`]`("line too long: …")` rather than allocating.
/// I/O errors are mapped to [`AppError::Io`].
///
/// # Encoder
///
/// Outbound strings are encoded as `item\n`.  The max-length limit is a
/// decoder-side concern and is not enforced during encoding.
#[derive(Debug)]
pub struct ProtoCodec(LinesCodec);

impl ProtoCodec {
    /// Create a new `ProtoCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for ProtoCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ProtoCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` when `src` contains no complete line yet
    /// (buffering).  Returns `Err(AppError::Protocol("line too long: …"))`
    /// when the line exceeds [`MAX_LINE_BYTES`].
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final line when the stream reaches EOF.
    ///
    /// Delegates to [`LinesCodec::decode_eof`], applying the same error
    /// mapping.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for ProtoCodec {
    type Error = AppError;

    /// Encode `item` as a `\n`-terminated NDJSON line into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] on underlying I/O failures.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        // LinesCodec::encode does not enforce a max line length;
        // the limit applies only to decoding.
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
