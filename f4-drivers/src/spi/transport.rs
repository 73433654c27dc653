//! What the arbiter needs from a physical SPI peripheral.

use embedded_hal::spi::SpiBus;

/// Which peripheral feature moves the bytes of a non-blocking transfer.
///
/// Both are asynchronous from the caller's point of view; they differ only in
/// which start routine the physical transport runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// DMA stream feeds the data register ("buffered").
    Dma,
    /// TXE/RXNE interrupts feed the data register ("immediate").
    Interrupt,
}

/// A physical SPI peripheral as seen by [`SpiArbiter`](super::SpiArbiter).
///
/// Blocking transfers come from the [`SpiBus`] supertrait. The `start_*`
/// methods return as soon as the transfer is under way; the peripheral's
/// interrupt handler later reports the outcome by calling
/// [`SpiArbiter::on_transfer_complete`](super::SpiArbiter::on_transfer_complete)
/// or [`SpiArbiter::on_transfer_error`](super::SpiArbiter::on_transfer_error).
///
/// # Buffer contract
///
/// Slices handed to a `start_*` method stay valid and untouched until that
/// completion is reported. The arbiter guarantees this by parking the
/// caller's `'static` buffers in the queue slot of the in-flight transaction,
/// so an implementation may keep raw pointers to them (e.g. for DMA).
///
/// # Reentrancy
///
/// A `start_*` implementation must not report completion from inside the call
/// itself; it should pend the completion interrupt instead.
pub trait SpiTransport: SpiBus<u8> {
    /// Whether the peripheral is configured and able to start transfers.
    fn is_initialized(&self) -> bool;

    /// Configure the peripheral (clocks, pins, DMA links).
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Abort any transfer in progress and power the peripheral down.
    fn sleep(&mut self) -> Result<(), Self::Error>;

    /// Start transmitting `tx`; received bytes are discarded.
    fn start_write(&mut self, mode: TransferMode, tx: &[u8]) -> Result<(), Self::Error>;

    /// Start a full-duplex transfer. `tx` and `rx` have the same length.
    fn start_write_read(
        &mut self,
        mode: TransferMode,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), Self::Error>;

    /// Start receiving into `rx` while clocking out filler bytes.
    fn start_read(&mut self, mode: TransferMode, rx: &mut [u8]) -> Result<(), Self::Error>;
}
