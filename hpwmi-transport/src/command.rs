//! Request encoding and response decoding for the firmware buffer protocol
//!
//! The codec owns the wire format only; it never talks to the firmware.
//! Callers encode a request, hand it to a [`WmiTransport`](crate::WmiTransport)
//! together with the [`OutputClass`] for their requested output size, and
//! decode whatever buffer comes back.

use thiserror::Error;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::protocol::{MAX_INSIZE, MIN_INSIZE, SIGNATURE};

/// Codec-level errors: size-limit violations and malformed responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("requested output size {0} exceeds the 4096-byte limit")]
    OutputTooLarge(usize),

    #[error("payload size {0} exceeds the 4096-byte limit")]
    PayloadTooLarge(usize),

    #[error("response too short: got {got} bytes, need at least {expected}")]
    ResponseTooShort { expected: usize, got: usize },
}

/// Output-size class passed to the transport in place of the raw size.
///
/// The firmware method is dispatched on one of five fixed size classes, not
/// on the byte count itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum OutputClass {
    /// No output requested.
    Zero = 1,
    /// Up to 4 bytes.
    Word = 2,
    /// Up to 128 bytes.
    Buffer128 = 3,
    /// Up to 1024 bytes.
    Buffer1K = 4,
    /// Up to 4096 bytes.
    Buffer4K = 5,
}

impl OutputClass {
    /// Select the class for a requested output size. Total over (0, 4096];
    /// anything larger is rejected before the transport is touched.
    pub fn for_size(outsize: usize) -> Result<Self, CodecError> {
        if outsize > 4096 {
            return Err(CodecError::OutputTooLarge(outsize));
        }
        Ok(if outsize > 1024 {
            Self::Buffer4K
        } else if outsize > 128 {
            Self::Buffer1K
        } else if outsize > 4 {
            Self::Buffer128
        } else if outsize > 0 {
            Self::Word
        } else {
            Self::Zero
        })
    }

    /// The method id the transport dispatches on.
    pub fn method_id(self) -> u32 {
        self as u32
    }
}

/// Fixed 16-byte request header.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RequestHeader {
    signature: U32,
    command: U32,
    commandtype: U32,
    datasize: U32,
}

/// Fixed 8-byte response header: signature echo plus status word.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct ResponseHeader {
    signature: U32,
    status: U32,
}

/// Size of the response status header.
pub const RESPONSE_HEADER_SIZE: usize = std::mem::size_of::<ResponseHeader>();

/// Build the outbound buffer for one firmware call.
///
/// The declared `datasize` is the caller's true payload length (possibly 0
/// under the zero-input-size convention); the wire payload is zero-padded to
/// the 128-byte minimum the firmware expects.
pub fn encode_request(command: u32, commandtype: u32, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.len() > MAX_INSIZE {
        return Err(CodecError::PayloadTooLarge(data.len()));
    }
    let header = RequestHeader {
        signature: SIGNATURE.into(),
        command: command.into(),
        commandtype: commandtype.into(),
        datasize: (data.len() as u32).into(),
    };
    let padded = data.len().max(MIN_INSIZE);
    let mut buf = Vec::with_capacity(std::mem::size_of::<RequestHeader>() + padded);
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(data);
    buf.resize(std::mem::size_of::<RequestHeader>() + padded, 0);
    Ok(buf)
}

/// A decoded firmware response: the status word and whatever payload
/// followed the header. The payload is retained only on success — a nonzero
/// status never carries data to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u32,
    payload: Vec<u8>,
}

impl Response {
    /// Decode a raw response buffer. Buffers shorter than the status header
    /// are a protocol error.
    pub fn parse(raw: &[u8]) -> Result<Self, CodecError> {
        let (header, payload) = ResponseHeader::read_from_prefix(raw).map_err(|_| {
            CodecError::ResponseTooShort {
                expected: RESPONSE_HEADER_SIZE,
                got: raw.len(),
            }
        })?;
        let status = header.status.get();
        let payload = if status == 0 { payload.to_vec() } else { Vec::new() };
        Ok(Self { status, payload })
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Copy the payload into a caller-sized buffer: min(requested, available)
    /// bytes, zero-filled to the requested size.
    pub fn read_output(&self, outsize: usize) -> Vec<u8> {
        let take = outsize.min(self.payload.len());
        let mut out = vec![0u8; outsize];
        out[..take].copy_from_slice(&self.payload[..take]);
        out
    }
}
