//! LIS3DSH register map (the subset the driver touches).
//!
//! SPI frames start with the register address; bit 7 set means read. With
//! `CTRL_REG6.ADD_INC` set the address auto-increments across a burst.

/// Set in the address byte to read.
pub const READ: u8 = 0x80;

/// Device identification (read-only), always [`WHO_AM_I_VALUE`].
pub const WHO_AM_I: u8 = 0x0F;
pub const WHO_AM_I_VALUE: u8 = 0x3F;

/// Control register 4.
/// - Bits 7:4: ODR (output data rate, 0 = power down)
/// - Bit 3:    BDU (block data update)
/// - Bits 2:0: Z/Y/X axis enable
pub const CTRL_REG4: u8 = 0x20;
pub const CTRL4_ODR_SHIFT: u8 = 4;
pub const CTRL4_BDU: u8 = 0x08;
pub const CTRL4_XYZ_EN: u8 = 0x07;

/// Control register 5.
/// - Bits 7:6: anti-aliasing bandwidth
/// - Bits 5:3: FSCALE (full-scale selection)
pub const CTRL_REG5: u8 = 0x24;
pub const CTRL5_FSCALE_SHIFT: u8 = 3;

/// Control register 6.
/// - Bit 4: ADD_INC (register address auto-increment)
pub const CTRL_REG6: u8 = 0x25;
pub const CTRL6_ADD_INC: u8 = 0x10;

/// Status register.
/// - Bit 3: ZYXDA (new X, Y and Z data available)
pub const STATUS: u8 = 0x27;
pub const STATUS_ZYXDA: u8 = 0x08;

/// First of six output bytes: X, Y, Z, each low byte first.
pub const OUT_X_L: u8 = 0x28;
