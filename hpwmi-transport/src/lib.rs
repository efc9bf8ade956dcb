//! Wire-level building blocks for HP WMI platform hardware
//!
//! This crate owns everything below the driver subsystems: the binary
//! command codec, the protocol constants, the asynchronous-notification
//! decoder, and the two capability traits the hardware is reached through —
//! the firmware buffer call and raw embedded-controller register access.
//!
//! The actual transports (ACPI/WMI evaluation, EC port I/O) live with the
//! embedder; everything here is testable against in-memory fakes.

pub mod command;
pub mod error;
pub mod event;
pub mod protocol;

pub use command::{encode_request, CodecError, OutputClass, Response, RESPONSE_HEADER_SIZE};
pub use error::TransportError;
pub use event::{parse_notification, EventId, Notification, NotificationError};
pub use protocol::RadioKind;

use std::sync::Arc;

/// The single synchronous firmware primitive.
///
/// One call, one response buffer. The call blocks until the firmware
/// answers; there is no internal timeout, so a stuck firmware stalls the
/// calling thread. Failure of this primitive is fatal to the query that
/// issued it.
pub trait WmiTransport: Send + Sync {
    /// Evaluate the firmware method for the given output-size class with the
    /// encoded request buffer, returning the raw response buffer.
    fn evaluate(
        &self,
        output_class: OutputClass,
        input: &[u8],
    ) -> Result<Vec<u8>, TransportError>;
}

/// Byte-addressable embedded-controller register access.
///
/// A second, narrower capability independent of the buffer protocol. EC
/// failures are surfaced as-is and never retried through the firmware-query
/// error path.
pub trait EmbeddedController: Send + Sync {
    fn read_byte(&self, register: u8) -> Result<u8, TransportError>;
    fn write_byte(&self, register: u8, value: u8) -> Result<(), TransportError>;
}

/// Shared handle to a firmware transport.
pub type BoxedTransport = Arc<dyn WmiTransport>;

/// Shared handle to an embedded controller.
pub type BoxedEc = Arc<dyn EmbeddedController>;
