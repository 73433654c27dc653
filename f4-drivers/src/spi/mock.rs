//! Test doubles for the SPI layer.

use std::boxed::Box;
use std::sync::{Arc, Mutex, MutexGuard};
use std::vec::Vec;

use embedded_hal::spi::{self, ErrorKind, ErrorType, SpiBus};

use super::transport::{SpiTransport, TransferMode};

/// Give a test-owned byte string the `'static` lifetime the arbiter expects.
pub fn leak(bytes: &[u8]) -> &'static [u8] {
    Box::leak(bytes.to_vec().into_boxed_slice())
}

/// A fresh zeroed `'static` receive buffer.
pub fn leak_zeroed(len: usize) -> &'static mut [u8] {
    Box::leak(std::vec![0u8; len].into_boxed_slice())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub ErrorKind);

impl spi::Error for MockError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// One call into the mock, in the order the transport saw them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartWrite(TransferMode, Vec<u8>),
    StartWriteRead(TransferMode, Vec<u8>),
    StartRead(TransferMode, usize),
    Write(Vec<u8>),
    Read(usize),
    Transfer(Vec<u8>),
    Init,
    Sleep,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<Call>,
    pub initialized: bool,
    /// Number of upcoming `start_*` calls to refuse.
    pub refuse_starts: usize,
    /// Byte clocked in by reads.
    pub fill: u8,
    /// Make `sleep` report a failure (after powering down anyway).
    pub fail_sleep: bool,
    /// Runs once, inside the next blocking `write`, with the state unlocked.
    pub during_write: Option<fn()>,
}

/// Physical transport double. Async starts only record the call; the test
/// plays the completion interrupt by calling the arbiter directly.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialized() -> Self {
        let mock = Self::new();
        mock.state().initialized = true;
        mock
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Number of async transfers started so far.
    pub fn starts(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::StartWrite(..) | Call::StartWriteRead(..) | Call::StartRead(..)
                )
            })
            .count()
    }

    fn start(&mut self, call: Call) -> Result<(), MockError> {
        let mut state = self.state();
        if state.refuse_starts > 0 {
            state.refuse_starts -= 1;
            return Err(MockError(ErrorKind::Other));
        }
        state.calls.push(call);
        Ok(())
    }
}

impl ErrorType for MockTransport {
    type Error = MockError;
}

impl SpiBus for MockTransport {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut state = self.state();
        words.fill(state.fill);
        state.calls.push(Call::Read(words.len()));
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let hook = {
            let mut state = self.state();
            state.calls.push(Call::Write(words.to_vec()));
            state.during_write.take()
        };
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.state();
        read.fill(state.fill);
        state.calls.push(Call::Transfer(write.to_vec()));
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut state = self.state();
        state.calls.push(Call::Transfer(words.to_vec()));
        words.fill(state.fill);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl SpiTransport for MockTransport {
    fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state();
        state.initialized = true;
        state.calls.push(Call::Init);
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state();
        state.initialized = false;
        state.calls.push(Call::Sleep);
        if state.fail_sleep {
            return Err(MockError(ErrorKind::Other));
        }
        Ok(())
    }

    fn start_write(&mut self, mode: TransferMode, tx: &[u8]) -> Result<(), Self::Error> {
        self.start(Call::StartWrite(mode, tx.to_vec()))
    }

    fn start_write_read(
        &mut self,
        mode: TransferMode,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.start(Call::StartWriteRead(mode, tx.to_vec()))?;
        // Loop MOSI back to MISO
        rx.copy_from_slice(tx);
        Ok(())
    }

    fn start_read(&mut self, mode: TransferMode, rx: &mut [u8]) -> Result<(), Self::Error> {
        self.start(Call::StartRead(mode, rx.len()))?;
        rx.fill(self.state().fill);
        Ok(())
    }
}
