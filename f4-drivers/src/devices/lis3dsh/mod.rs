//! ST LIS3DSH 3-axis accelerometer over SPI.
//!
//! The driver is generic over any [`embedded_hal::spi::SpiBus`] and a
//! chip-select [`embedded_hal::digital::OutputPin`].
//!
//! # Example
//!
//! ```ignore
//! let mut accel = Lis3dsh::new(&arbiter, cs);
//! accel.init(DataRate::Hz100, FullScale::G2)?;
//! let [x, y, z] = accel.read_mg()?;
//! ```
//!
//! For the non-blocking path, drive chip select yourself and queue
//! [`SAMPLE_COMMAND`] as a write/read transfer; hand the received frame to
//! [`decode_sample`].

mod registers;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use super::{selected, DeviceError};
use registers as reg;

/// Bytes in one X/Y/Z burst read, including the address byte.
pub const SAMPLE_LEN: usize = 7;

/// Burst read of the six output registers.
pub const SAMPLE_COMMAND: [u8; SAMPLE_LEN] = [reg::READ | reg::OUT_X_L, 0, 0, 0, 0, 0, 0];

/// Raw X/Y/Z counts from a frame clocked in for [`SAMPLE_COMMAND`].
pub fn decode_sample(frame: &[u8; SAMPLE_LEN]) -> [i16; 3] {
    [
        i16::from_le_bytes([frame[1], frame[2]]),
        i16::from_le_bytes([frame[3], frame[4]]),
        i16::from_le_bytes([frame[5], frame[6]]),
    ]
}

/// Output data rate (CTRL_REG4.ODR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    PowerDown = 0,
    Hz3_125 = 1,
    Hz6_25 = 2,
    Hz12_5 = 3,
    Hz25 = 4,
    Hz50 = 5,
    Hz100 = 6,
    Hz400 = 7,
    Hz800 = 8,
    Hz1600 = 9,
}

/// Measurement range (CTRL_REG5.FSCALE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullScale {
    G2 = 0,
    G4 = 1,
    G6 = 2,
    G8 = 3,
    G16 = 4,
}

impl FullScale {
    /// Milli-g per LSB.
    pub fn sensitivity(self) -> f32 {
        match self {
            FullScale::G2 => 0.06,
            FullScale::G4 => 0.12,
            FullScale::G6 => 0.18,
            FullScale::G8 => 0.24,
            FullScale::G16 => 0.73,
        }
    }

    /// Convert raw counts to milli-g.
    pub fn to_mg(self, raw: [i16; 3]) -> [f32; 3] {
        let s = self.sensitivity();
        raw.map(|v| v as f32 * s)
    }
}

/// Board orientation derived from the gravity vector, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tilt {
    /// Rotation about the Y axis; positive when X points up.
    pub pitch: f32,
    /// Rotation about the X axis; positive when Y points up.
    pub roll: f32,
}

impl Tilt {
    pub fn from_mg([x, y, z]: [f32; 3]) -> Self {
        let deg = 180.0 / core::f32::consts::PI;
        Tilt {
            pitch: libm::atan2f(x, libm::sqrtf(y * y + z * z)) * deg,
            roll: libm::atan2f(y, libm::sqrtf(x * x + z * z)) * deg,
        }
    }
}

pub struct Lis3dsh<SPI, CS> {
    spi: SPI,
    cs: CS,
    scale: FullScale,
}

type Result<T, SPI, CS> = core::result::Result<
    T,
    DeviceError<<SPI as embedded_hal::spi::ErrorType>::Error, <CS as embedded_hal::digital::ErrorType>::Error>,
>;

impl<SPI, CS> Lis3dsh<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self {
            spi,
            cs,
            scale: FullScale::G2,
        }
    }

    /// Check the device identity, then configure rate and range with all
    /// three axes enabled and burst reads auto-incrementing.
    pub fn init(&mut self, rate: DataRate, scale: FullScale) -> Result<(), SPI, CS> {
        let id = self.who_am_i()?;
        if id != reg::WHO_AM_I_VALUE {
            log::warn!("LIS3DSH: unexpected WHO_AM_I {:#04x}", id);
            return Err(DeviceError::UnexpectedId(id));
        }

        self.write_register(reg::CTRL_REG6, reg::CTRL6_ADD_INC)?;
        self.write_register(reg::CTRL_REG5, (scale as u8) << reg::CTRL5_FSCALE_SHIFT)?;
        self.write_register(
            reg::CTRL_REG4,
            ((rate as u8) << reg::CTRL4_ODR_SHIFT) | reg::CTRL4_BDU | reg::CTRL4_XYZ_EN,
        )?;
        self.scale = scale;
        log::debug!("LIS3DSH: {:?}, {:?}", rate, scale);
        Ok(())
    }

    pub fn who_am_i(&mut self) -> Result<u8, SPI, CS> {
        self.read_register(reg::WHO_AM_I)
    }

    /// Whether a new X/Y/Z set is waiting.
    pub fn data_ready(&mut self) -> Result<bool, SPI, CS> {
        Ok(self.read_register(reg::STATUS)? & reg::STATUS_ZYXDA != 0)
    }

    pub fn read_raw(&mut self) -> Result<[i16; 3], SPI, CS> {
        let mut frame = SAMPLE_COMMAND;
        selected(&mut self.spi, &mut self.cs, |spi| spi.transfer_in_place(&mut frame))?;
        Ok(decode_sample(&frame))
    }

    /// Acceleration in milli-g at the configured range.
    pub fn read_mg(&mut self) -> Result<[f32; 3], SPI, CS> {
        Ok(self.scale.to_mg(self.read_raw()?))
    }

    pub fn tilt(&mut self) -> Result<Tilt, SPI, CS> {
        Ok(Tilt::from_mg(self.read_mg()?))
    }

    pub fn scale(&self) -> FullScale {
        self.scale
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), SPI, CS> {
        selected(&mut self.spi, &mut self.cs, |spi| spi.write(&[register, value]))
    }

    pub fn read_register(&mut self, register: u8) -> Result<u8, SPI, CS> {
        let mut frame = [reg::READ | register, 0];
        selected(&mut self.spi, &mut self.cs, |spi| spi.transfer_in_place(&mut frame))?;
        Ok(frame[1])
    }

    /// Release the bus and chip-select pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}
