//! Driver error types

use std::fmt;

use hpwmi_transport::protocol::status;
use hpwmi_transport::{CodecError, TransportError};
use thiserror::Error;

/// A nonzero status word returned by a firmware query.
///
/// The "unsupported" statuses (unknown command, unknown command type) are
/// expected outcomes of capability probes and are classified here so callers
/// can treat them as "feature absent" instead of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareStatus(pub u32);

impl FirmwareStatus {
    pub fn is_unsupported(self) -> bool {
        status::is_unsupported(self.0)
    }

    pub fn is_invalid_parameters(self) -> bool {
        self.0 == status::INVALID_PARAMETERS
    }
}

impl fmt::Display for FirmwareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} ({})", self.0, status::name(self.0))
    }
}

/// Errors from driver operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// The firmware call primitive itself failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response buffer did not decode.
    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    /// The firmware answered with a nonzero status word.
    #[error("firmware error {0}")]
    Firmware(FirmwareStatus),

    /// Rejected before any hardware interaction.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The feature or value is not available on this hardware variant.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The hardware answered with something the driver cannot interpret.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl PlatformError {
    /// True when the error is an expected "firmware does not implement this"
    /// probe outcome.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Firmware(s) if s.is_unsupported())
    }
}
