//! [`SpiTransport`] over any blocking [`SpiBus`].
//!
//! HALs such as `stm32f4xx-hal` expose the SPI peripheral as a blocking
//! `embedded-hal` bus. [`BusTransport`] wraps one so it can sit behind
//! [`SpiArbiter`](super::SpiArbiter): each `start_*` call runs the whole
//! transfer on the spot and then raises `signal`, which should pend the
//! interrupt whose handler calls
//! [`on_transfer_complete`](super::SpiArbiter::on_transfer_complete).
//!
//! Clients still see the asynchronous contract (completion later, from the
//! interrupt), the CPU simply does the byte shuffling up front.

use embedded_hal::spi::{ErrorType, SpiBus};

use super::transport::{SpiTransport, TransferMode};

/// Blocking bus adapted to the arbiter's transport interface.
pub struct BusTransport<B> {
    bus: B,
    initialized: bool,
    signal: fn(),
}

impl<B: SpiBus<u8>> BusTransport<B> {
    /// `signal` must only pend the completion interrupt; reporting the
    /// completion from inside it would reenter the arbiter.
    pub fn new(bus: B, signal: fn()) -> Self {
        BusTransport {
            bus,
            initialized: false,
            signal,
        }
    }

    pub fn bus(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give back the wrapped bus.
    pub fn release(self) -> B {
        self.bus
    }

    fn finish(&mut self, mode: TransferMode, len: usize) -> Result<(), B::Error> {
        self.bus.flush()?;
        log::trace!("{:?} transfer of {} bytes done, signalling", mode, len);
        (self.signal)();
        Ok(())
    }
}

impl<B: SpiBus<u8>> ErrorType for BusTransport<B> {
    type Error = B::Error;
}

impl<B: SpiBus<u8>> SpiBus<u8> for BusTransport<B> {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.read(words)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.bus.write(words)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.bus.transfer(read, write)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.transfer_in_place(words)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.bus.flush()
    }
}

impl<B: SpiBus<u8>> SpiTransport for BusTransport<B> {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The wrapped bus arrives configured by its HAL; this only marks it usable.
    fn init(&mut self) -> Result<(), Self::Error> {
        self.initialized = true;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.initialized = false;
        self.bus.flush()
    }

    fn start_write(&mut self, mode: TransferMode, tx: &[u8]) -> Result<(), Self::Error> {
        self.bus.write(tx)?;
        self.finish(mode, tx.len())
    }

    fn start_write_read(
        &mut self,
        mode: TransferMode,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.transfer(rx, tx)?;
        self.finish(mode, tx.len())
    }

    fn start_read(&mut self, mode: TransferMode, rx: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.read(rx)?;
        self.finish(mode, rx.len())
    }
}
