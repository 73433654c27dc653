//! Register-file SPI device and chip-select pin doubles for driver tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, ErrorKind, ErrorType, SpiBus};

/// What crossed the wire, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Select,
    Deselect,
    /// Bytes clocked out by the controller.
    Sent(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

impl spi::Error for BusFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ModeFault
    }
}

impl digital::Error for BusFault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

pub struct Wire {
    pub events: Vec<Event>,
    /// Device register file. Frames `[addr, value]` with bit 7 clear write
    /// it; frames starting with `addr | 0x80` read from it, auto-incrementing.
    pub regs: [u8; 128],
    pub fail_next: bool,
}

impl Default for Wire {
    fn default() -> Self {
        Wire {
            events: Vec::new(),
            regs: [0; 128],
            fail_next: false,
        }
    }
}

impl Wire {
    pub fn shared() -> Rc<RefCell<Wire>> {
        Rc::new(RefCell::new(Wire::default()))
    }

    /// Frames sent while selected, dropping the chip-select events.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Sent(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    fn clock(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
        if core::mem::take(&mut self.fail_next) {
            return Err(BusFault);
        }
        self.events.push(Event::Sent(words.to_vec()));
        match words {
            [addr, rest @ ..] if *addr & 0x80 != 0 => {
                let base = (*addr & 0x7F) as usize;
                for (i, byte) in rest.iter_mut().enumerate() {
                    *byte = self.regs[(base + i) % 128];
                }
            }
            [addr, value] => self.regs[*addr as usize] = *value,
            _ => {}
        }
        Ok(())
    }
}

pub struct MockBus(pub Rc<RefCell<Wire>>);

impl ErrorType for MockBus {
    type Error = BusFault;
}

impl SpiBus for MockBus {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        words.fill(0);
        self.0.borrow_mut().clock(words)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.0.borrow_mut().clock(&mut words.to_vec())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let mut words = write.to_vec();
        self.0.borrow_mut().clock(&mut words)?;
        let n = read.len().min(words.len());
        read[..n].copy_from_slice(&words[..n]);
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.0.borrow_mut().clock(words)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub struct MockCs(pub Rc<RefCell<Wire>>);

impl digital::ErrorType for MockCs {
    type Error = BusFault;
}

impl OutputPin for MockCs {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().events.push(Event::Select);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().events.push(Event::Deselect);
        Ok(())
    }
}
