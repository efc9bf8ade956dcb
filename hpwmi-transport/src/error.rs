//! Transport error types

use thiserror::Error;

/// Errors from the firmware call primitives.
///
/// Any of these is fatal to the call that raised it: the firmware either
/// could not be reached or answered with something that is not a response
/// buffer. Firmware-level status codes are *not* transport errors; they
/// travel in the decoded response.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The firmware method evaluation itself failed.
    #[error("firmware method evaluation failed: {0}")]
    Evaluation(String),

    /// The firmware interface is not present on this machine.
    #[error("firmware interface not present")]
    NotPresent,

    /// The evaluation returned an object that is not a buffer.
    #[error("firmware returned a non-buffer object (type {object_type})")]
    NotABuffer { object_type: u32 },

    /// Embedded-controller register access failed.
    #[error("embedded controller access failed: {0}")]
    Ec(String),
}
