//! Fixed-size padded frames.
//!
//! Every frame on the wire is `HEADER_SIZE + frame_size` bytes no matter how
//! much application data it carries:
//!
//! ```text
//! byte 0   : length & 0xFF
//! byte 1   : (length >> 8) & 0x7F, bit 7 set on the last fragment
//! 2..      : payload, tail filled with random bytes on the last fragment
//! ```
//!
//! After encryption all ciphertexts therefore have the same length, and the
//! filler after real data is never a guessable pattern.

use bytes::{BufMut, Bytes, BytesMut};
use rand::{CryptoRng, RngCore};

use crate::errors::{ProtocolError, Result};

/// Size of the frame header.
pub const HEADER_SIZE: usize = 2;

/// Largest frame size the 15-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = 0x7FFF;

/// Frame size used when none is configured.
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Reassembly limit used when none is configured (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const LAST_FLAG: u8 = 0x80;

/// Check a frame size against the header's 15-bit length field.
///
/// # Errors
///
/// - `InvalidArgument` if `frame_size` is zero or above [`MAX_FRAME_SIZE`]
pub fn validate_frame_size(frame_size: usize) -> Result<()> {
    if frame_size == 0 || frame_size > MAX_FRAME_SIZE {
        return Err(ProtocolError::InvalidArgument(format!(
            "frame size must be between 1 and {MAX_FRAME_SIZE}, got {frame_size}"
        )));
    }
    Ok(())
}

/// Two-byte frame header: 15-bit payload length plus the last-fragment flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    len: u16,
    last: bool,
}

impl FrameHeader {
    /// Header declaring `len` payload bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `len` does not fit in 15 bits
    pub fn new(len: usize, last: bool) -> Result<Self> {
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::InvalidArgument(format!(
                "frame length {len} exceeds {MAX_FRAME_SIZE}"
            )));
        }
        let Ok(len) = u16::try_from(len) else {
            unreachable!("length bounded by MAX_FRAME_SIZE")
        };
        Ok(Self { len, last })
    }

    /// Declared payload length.
    pub fn payload_len(&self) -> usize {
        usize::from(self.len)
    }

    /// Whether this is the final fragment of a message.
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Wire encoding.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let [hi, lo] = self.len.to_be_bytes();
        let flag = if self.last { LAST_FLAG } else { 0 };
        [lo, (hi & 0x7F) | flag]
    }

    /// Parse a header. Every 2-byte value is a well-formed header; the length
    /// is checked against the frame size by [`Frame::decode`].
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        let len = u16::from_be_bytes([bytes[1] & 0x7F, bytes[0]]);
        Self { len, last: bytes[1] & LAST_FLAG != 0 }
    }
}

/// One fixed-size frame: header plus exactly `frame_size` body bytes.
///
/// Only the first [`FrameHeader::payload_len`] body bytes are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    body: Bytes,
}

impl Frame {
    /// Frame header.
    pub fn header(&self) -> FrameHeader {
        self.header
    }

    /// Whether this is the final fragment of a message.
    pub fn is_last(&self) -> bool {
        self.header.last
    }

    /// Data bytes, without padding.
    pub fn payload(&self) -> &[u8] {
        &self.body[..self.header.payload_len()]
    }

    /// Body size, which is the frame size the frame was built for.
    pub fn frame_size(&self) -> usize {
        self.body.len()
    }

    /// Encoded length: `HEADER_SIZE + frame_size`.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Encode header and body.
    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.body);
        dst.freeze()
    }

    /// Decode an encoded frame of the given frame size.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `frame_size` is out of range
    /// - `SizeMismatch` if `bytes` is not `HEADER_SIZE + frame_size` long, or
    ///   the header declares more than `frame_size` bytes
    pub fn decode(bytes: &[u8], frame_size: usize) -> Result<Self> {
        validate_frame_size(frame_size)?;

        let expected = HEADER_SIZE + frame_size;
        if bytes.len() != expected {
            return Err(ProtocolError::SizeMismatch(format!(
                "frame must be {expected} bytes, got {}",
                bytes.len()
            )));
        }

        let header = FrameHeader::from_bytes([bytes[0], bytes[1]]);
        if header.payload_len() > frame_size {
            return Err(ProtocolError::SizeMismatch(format!(
                "frame declares {} bytes but holds {frame_size}",
                header.payload_len()
            )));
        }

        Ok(Self { header, body: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]) })
    }
}

/// Split a payload into `len / frame_size + 1` frames.
///
/// All frames but the last are full. The last carries the remaining
/// `len % frame_size` bytes (zero when the payload is an exact multiple) and
/// random filler.
///
/// # Errors
///
/// - `InvalidArgument` if `frame_size` is zero or above [`MAX_FRAME_SIZE`]
pub fn split<R: RngCore + CryptoRng>(
    payload: &[u8],
    frame_size: usize,
    rng: &mut R,
) -> Result<Vec<Frame>> {
    validate_frame_size(frame_size)?;

    let full = payload.len() / frame_size;
    let mut frames = Vec::with_capacity(full + 1);

    for chunk in payload.chunks_exact(frame_size) {
        frames.push(Frame {
            header: FrameHeader::new(frame_size, false)?,
            body: Bytes::copy_from_slice(chunk),
        });
    }

    let rest = &payload[full * frame_size..];
    let mut body = vec![0u8; frame_size];
    rng.fill_bytes(&mut body);
    body[..rest.len()].copy_from_slice(rest);
    frames.push(Frame { header: FrameHeader::new(rest.len(), true)?, body: Bytes::from(body) });

    Ok(frames)
}

/// Incremental frame reassembler.
///
/// Feed frames in arrival order; a complete message comes out when the frame
/// with the last flag arrives. Partial state survives between calls so the
/// caller can feed frames as they trickle in.
///
/// After an error the rest of the broken message is skipped: frames are
/// dropped up to and including the next one carrying the last flag, so a
/// message tail never comes out as a message of its own.
#[derive(Debug)]
pub struct Reassembler {
    frame_size: usize,
    max_message_size: usize,
    buffer: BytesMut,
    frames: usize,
    discarding: bool,
}

impl Reassembler {
    /// Reassembler for frames of `frame_size`, refusing messages above
    /// `max_message_size`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `frame_size` is out of range
    pub fn new(frame_size: usize, max_message_size: usize) -> Result<Self> {
        validate_frame_size(frame_size)?;
        Ok(Self {
            frame_size,
            max_message_size,
            buffer: BytesMut::new(),
            frames: 0,
            discarding: false,
        })
    }

    /// Configured frame size.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Frames absorbed into the pending message.
    pub fn pending_frames(&self) -> usize {
        self.frames
    }

    /// Whether a message is partially assembled.
    pub fn has_partial(&self) -> bool {
        self.frames > 0
    }

    /// Whether frames are being skipped until the next last-flagged frame.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Drop the pending message and skip the frames that remain of it.
    ///
    /// Use when a frame was lost or rejected before it reached
    /// [`Reassembler::push`], e.g. on an authentication failure.
    pub fn discard_message(&mut self) {
        self.reset();
        self.discarding = true;
    }

    /// Decode and absorb one encoded frame.
    ///
    /// # Errors
    ///
    /// - `SizeMismatch` if the frame is malformed (see [`Frame::decode`])
    /// - `MessageTooLarge` if the message would exceed the limit
    pub fn push_encoded(&mut self, bytes: &[u8]) -> Result<Option<Bytes>> {
        match Frame::decode(bytes, self.frame_size) {
            Ok(frame) => self.push(&frame),
            Err(e) => {
                self.discard_message();
                Err(e)
            },
        }
    }

    /// Absorb one frame, returning the message once its last frame arrives.
    ///
    /// On error the partial message is discarded along with its remaining
    /// frames.
    ///
    /// # Errors
    ///
    /// - `SizeMismatch` if the frame was built for another frame size
    /// - `MessageTooLarge` if the message would exceed the limit
    pub fn push(&mut self, frame: &Frame) -> Result<Option<Bytes>> {
        if frame.frame_size() != self.frame_size {
            self.discard_message();
            return Err(ProtocolError::SizeMismatch(format!(
                "frame holds {} bytes, expected {}",
                frame.frame_size(),
                self.frame_size
            )));
        }

        if self.discarding {
            self.discarding = !frame.is_last();
            return Ok(None);
        }

        let size = self.buffer.len() + frame.payload().len();
        if size > self.max_message_size {
            if frame.is_last() {
                self.reset();
            } else {
                self.discard_message();
            }
            return Err(ProtocolError::MessageTooLarge { size, max: self.max_message_size });
        }

        self.buffer.put_slice(frame.payload());
        self.frames += 1;

        if !frame.is_last() {
            return Ok(None);
        }

        self.frames = 0;
        Ok(Some(self.buffer.split().freeze()))
    }

    /// Discard any partial message and stop skipping frames.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.frames = 0;
        self.discarding = false;
    }
}

/// Reassemble one message from a sequence of frames.
///
/// Consumes frames up to and including the first one with the last flag;
/// anything after it is left in the iterator.
///
/// # Errors
///
/// - `SizeMismatch` if a frame has the wrong size or the sequence ends before
///   a last frame
/// - `MessageTooLarge` if the message exceeds [`DEFAULT_MAX_MESSAGE_SIZE`]
pub fn reassemble<'a, I>(frames: I, frame_size: usize) -> Result<Bytes>
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut reassembler = Reassembler::new(frame_size, DEFAULT_MAX_MESSAGE_SIZE)?;
    for frame in frames {
        if let Some(message) = reassembler.push(frame)? {
            return Ok(message);
        }
    }
    Err(ProtocolError::SizeMismatch("frame sequence ended before the last fragment".into()))
}
