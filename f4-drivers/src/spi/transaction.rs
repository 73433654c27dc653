//! Pending bus operations and their completion reports.

use embedded_hal::spi::ErrorKind;

use super::transport::{SpiTransport, TransferMode};

/// Completion handler for one transaction.
///
/// Runs in the completion interrupt's context, exactly once per accepted
/// transaction. It must not call the arbiter's blocking operations: the bus
/// is still held while it runs.
pub type Completion = fn(Completed);

/// Buffers of one transaction, tagged by direction.
///
/// The transfer length is the slice length; for [`Buffers::WriteRead`] both
/// directions run over the same clock cycles, so both slices are equally long.
#[derive(Debug)]
pub enum Buffers {
    Write(&'static [u8]),
    WriteRead(&'static [u8], &'static mut [u8]),
    Read(&'static mut [u8]),
}

impl Buffers {
    /// Transfer length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Buffers::Write(tx) => tx.len(),
            Buffers::WriteRead(tx, _) => tx.len(),
            Buffers::Read(rx) => rx.len(),
        }
    }

    /// Non-empty, and for full-duplex transfers both sides agree on length.
    pub fn is_valid(&self) -> bool {
        match self {
            Buffers::Write(tx) => !tx.is_empty(),
            Buffers::WriteRead(tx, rx) => !tx.is_empty() && tx.len() == rx.len(),
            Buffers::Read(rx) => !rx.is_empty(),
        }
    }
}

/// One logical request queued on the arbitrated bus.
#[derive(Debug)]
pub struct Transaction {
    mode: TransferMode,
    buffers: Buffers,
    on_done: Option<Completion>,
}

impl Transaction {
    pub fn write(mode: TransferMode, tx: &'static [u8], on_done: Option<Completion>) -> Self {
        Transaction {
            mode,
            buffers: Buffers::Write(tx),
            on_done,
        }
    }

    pub fn write_read(
        mode: TransferMode,
        tx: &'static [u8],
        rx: &'static mut [u8],
        on_done: Option<Completion>,
    ) -> Self {
        Transaction {
            mode,
            buffers: Buffers::WriteRead(tx, rx),
            on_done,
        }
    }

    pub fn read(mode: TransferMode, rx: &'static mut [u8], on_done: Option<Completion>) -> Self {
        Transaction {
            mode,
            buffers: Buffers::Read(rx),
            on_done,
        }
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    /// Hand this transaction to the physical transport.
    pub(crate) fn start<T: SpiTransport>(&mut self, transport: &mut T) -> Result<(), T::Error> {
        let mode = self.mode;
        match &mut self.buffers {
            Buffers::Write(tx) => transport.start_write(mode, &tx[..]),
            Buffers::WriteRead(tx, rx) => transport.start_write_read(mode, &tx[..], &mut rx[..]),
            Buffers::Read(rx) => transport.start_read(mode, &mut rx[..]),
        }
    }

    /// Consume the transaction, running its completion handler if it has one.
    pub(crate) fn complete(self, status: Result<(), ErrorKind>) {
        if let Some(on_done) = self.on_done {
            on_done(Completed {
                buffers: self.buffers,
                status,
            });
        }
    }
}

/// What a completion handler receives: the caller's buffers, handed back,
/// and the outcome of the transfer.
#[derive(Debug)]
pub struct Completed {
    pub buffers: Buffers,
    pub status: Result<(), ErrorKind>,
}

impl Completed {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// The transmitted bytes, if this was a write or full-duplex transfer.
    pub fn tx(&self) -> Option<&'static [u8]> {
        match self.buffers {
            Buffers::Write(tx) | Buffers::WriteRead(tx, _) => Some(tx),
            Buffers::Read(_) => None,
        }
    }

    /// Take back the receive buffer, if this transfer had one.
    pub fn into_rx(self) -> Option<&'static mut [u8]> {
        match self.buffers {
            Buffers::WriteRead(_, rx) | Buffers::Read(rx) => Some(rx),
            Buffers::Write(_) => None,
        }
    }
}
