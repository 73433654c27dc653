//! # f4-drivers
//!
//! `no_std` building blocks for sharing peripherals between interrupt
//! contexts on STM32F4 parts (Cortex-M4): one SPI bus serving several client
//! drivers, and sixteen GPIO pin interrupts funnelled through seven NVIC
//! lines.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Primitives | [`sync`] / [`queue`] | Spinlock and the multi-producer, interrupt-consumer ring |
//! | Checks | [`contract`] / [`error`] | Build-time contract policy, error enums |
//! | SPI | [`spi`] | [`SpiArbiter`](spi::SpiArbiter) serializing transactions onto one transport |
//! | EXTI | [`exti`] | [`PinInterrupts`](exti::PinInterrupts) per-pin callback table |
//! | Devices | [`devices`] | LIS3DSH and MAX7219 client drivers (feature-gated) |
//!
//! ## Quick start
//!
//! ```ignore
//! use f4_drivers::spi::{BusTransport, SpiArbiter, TransferMode};
//!
//! static ARBITER: StaticCell<SpiArbiter<BusTransport<Spi1>>> = StaticCell::new();
//!
//! let arbiter = ARBITER.init(SpiArbiter::new(BusTransport::new(spi1, pend_spi1)));
//! arbiter.init()?;
//!
//! // From any context; `sent` runs later in the SPI interrupt
//! arbiter.write_async(TransferMode::Dma, &FRAME, Some(sent))?;
//!
//! // Blocking drivers take `&SpiArbiter` as their bus
//! let mut matrix = Max7219::new(&*arbiter, cs);
//!
//! #[interrupt]
//! fn SPI1() {
//!     arbiter.on_transfer_complete();
//! }
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `lis3dsh` | yes | LIS3DSH accelerometer driver (pulls in `libm`) |
//! | `max7219` | yes | MAX7219 LED matrix driver |
//! | `legacy-dispatch` | no | Leave a transfer the transport refused in the queue |
//! | `contract-ignore` / `contract-trap` / `contract-reset` | no | Contract failure policy (see [`contract`]) |
//!
//! ## Limits
//!
//! - **Arbiter queue:** 4 transactions including the in-flight one
//!   ([`constants::ARBITER_QUEUE_SLOTS`] slots, one kept free)
//! - **Pin slots:** 16 ([`constants::PIN_SLOTS`])

#![no_std]

#[cfg(test)]
extern crate std;

pub mod constants;
pub mod contract;
pub mod error;
pub mod exti;
pub mod queue;
pub mod spi;
pub mod sync;

#[cfg(any(feature = "lis3dsh", feature = "max7219"))]
pub mod devices;
