//! Shared SPI bus.
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`SpiTransport`] | What the arbiter needs from a physical peripheral |
//! | [`SpiArbiter`] | FIFO of pending transactions, one in flight at a time |
//! | [`Transaction`] / [`Completed`] | A queued request and its completion report |
//! | [`BusTransport`] | Adapts a blocking `embedded-hal` bus to [`SpiTransport`] |

mod arbiter;
mod bus_transport;
mod transaction;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use arbiter::SpiArbiter;
pub use bus_transport::BusTransport;
pub use transaction::{Buffers, Completed, Completion, Transaction};
pub use transport::{SpiTransport, TransferMode};
