//! Client drivers for the SPI devices on the board.
//!
//! Both drivers are generic over [`embedded_hal::spi::SpiBus`] plus a
//! chip-select [`OutputPin`], so they run unchanged on a dedicated bus or on
//! `&SpiArbiter` sharing one peripheral between them.
//!
//! # Feature gates
//!
//! | Feature | Driver |
//! |---------|--------|
//! | `lis3dsh` | [`lis3dsh::Lis3dsh`] 3-axis accelerometer |
//! | `max7219` | [`max7219::Max7219`] 8x8 LED matrix |

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

#[cfg(feature = "lis3dsh")]
pub mod lis3dsh;
#[cfg(feature = "max7219")]
pub mod max7219;

#[cfg(test)]
pub(crate) mod mock;

/// Failure of a device driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError<S, P> {
    /// The SPI bus failed.
    Spi(S),
    /// The chip-select pin could not be driven.
    Pin(P),
    /// The identification register did not hold the expected value.
    UnexpectedId(u8),
}

/// Run `f` with chip select asserted (low), flush, then deassert.
///
/// Chip select is released even when the transfer fails.
pub(crate) fn selected<SPI, CS, R>(
    spi: &mut SPI,
    cs: &mut CS,
    f: impl FnOnce(&mut SPI) -> Result<R, SPI::Error>,
) -> Result<R, DeviceError<SPI::Error, CS::Error>>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    cs.set_low().map_err(DeviceError::Pin)?;
    let result = f(spi).and_then(|r| spi.flush().map(|()| r));
    cs.set_high().map_err(DeviceError::Pin)?;
    result.map_err(DeviceError::Spi)
}
