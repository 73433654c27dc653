//! Error types shared by the SPI arbiter and the pin interrupt table.

use embedded_hal::spi::{self, ErrorKind};

/// Failure of an arbitrated SPI operation.
///
/// `E` is the physical transport's own error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiError<E> {
    /// The physical transport reports itself uninitialized (or asleep).
    NotInitialized,
    /// Zero-length transfer, or write/read buffers of different lengths.
    InvalidLength,
    /// The transaction queue has no free slot; the request was dropped.
    QueueFull,
    /// The physical transport refused or failed the transfer.
    Transport(E),
}

impl<E: spi::Error> spi::Error for SpiError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            SpiError::Transport(e) => e.kind(),
            _ => ErrorKind::Other,
        }
    }
}

/// Failure of a pin interrupt table operation. No state is changed on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    /// The pin mask does not have exactly one bit set.
    InvalidPin,
    /// A callback is already registered for this pin.
    AlreadyRegistered,
    /// No callback is registered for this pin.
    NotRegistered,
}
