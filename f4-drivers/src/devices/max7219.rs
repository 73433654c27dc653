//! Maxim MAX7219 LED driver wired to an 8x8 matrix.
//!
//! Every command is one 16-bit frame: register address, then data. The chip
//! latches the frame on the rising edge of chip select.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use super::{selected, DeviceError};

/// Row 0 lives in the DIGIT0 register; rows 1 to 7 follow.
pub const DIGIT0: u8 = 0x01;
pub const DECODE_MODE: u8 = 0x09;
pub const INTENSITY: u8 = 0x0A;
pub const SCAN_LIMIT: u8 = 0x0B;
pub const SHUTDOWN: u8 = 0x0C;
pub const DISPLAY_TEST: u8 = 0x0F;

/// Highest duty-cycle step accepted by [`Max7219::set_intensity`].
pub const MAX_INTENSITY: u8 = 0x0F;

pub struct Max7219<SPI, CS> {
    spi: SPI,
    cs: CS,
}

type Result<T, SPI, CS> = core::result::Result<
    T,
    DeviceError<<SPI as embedded_hal::spi::ErrorType>::Error, <CS as embedded_hal::digital::ErrorType>::Error>,
>;

impl<SPI, CS> Max7219<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Raw matrix mode on all eight rows, blanked, then out of shutdown.
    pub fn init(&mut self) -> Result<(), SPI, CS> {
        self.write_register(DISPLAY_TEST, 0)?;
        self.write_register(SCAN_LIMIT, 7)?;
        self.write_register(DECODE_MODE, 0)?;
        self.clear()?;
        self.wake()
    }

    /// Duty-cycle step, clamped to 0..=15.
    pub fn set_intensity(&mut self, level: u8) -> Result<(), SPI, CS> {
        self.write_register(INTENSITY, level.min(MAX_INTENSITY))
    }

    /// Blank the display; register contents are kept.
    pub fn shutdown(&mut self) -> Result<(), SPI, CS> {
        self.write_register(SHUTDOWN, 0)
    }

    pub fn wake(&mut self) -> Result<(), SPI, CS> {
        self.write_register(SHUTDOWN, 1)
    }

    /// Show `rows`, one byte per row, MSB on the left.
    pub fn draw(&mut self, rows: &[u8; 8]) -> Result<(), SPI, CS> {
        for (digit, &row) in (DIGIT0..).zip(rows.iter()) {
            self.write_register(digit, row)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), SPI, CS> {
        self.draw(&[0; 8])
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), SPI, CS> {
        selected(&mut self.spi, &mut self.cs, |spi| spi.write(&[register, value]))
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}
