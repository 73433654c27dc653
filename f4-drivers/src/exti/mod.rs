//! GPIO pin interrupts on the STM32F4 EXTI controller.
//!
//! The sixteen pin positions (shared across all GPIO ports) feed seven NVIC
//! lines. Pins 0 to 4 each get their own line; pins 5 to 9 share `EXTI9_5`
//! and pins 10 to 15 share `EXTI15_10`. [`PinInterrupts`] keeps one callback
//! per pin position and fans each line interrupt out to the pins behind it.

mod table;

pub use table::{PinCallback, PinInterrupts};

use core::ops::RangeInclusive;

use crate::constants::PIN_SLOTS;
use crate::error::PinError;

/// A pin position, stored as its single-bit mask (`GPIO_PIN_x`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinId(u16);

impl PinId {
    /// Wrap a pin mask. Fails unless exactly one bit is set.
    pub const fn new(mask: u16) -> Result<Self, PinError> {
        if mask.count_ones() == 1 {
            Ok(PinId(mask))
        } else {
            Err(PinError::InvalidPin)
        }
    }

    /// The pin at bit position `slot`, if there is one.
    pub const fn from_slot(slot: usize) -> Option<Self> {
        if slot < PIN_SLOTS {
            Some(PinId(1 << slot))
        } else {
            None
        }
    }

    pub const fn mask(self) -> u16 {
        self.0
    }

    /// Table slot: the position of the mask's set bit.
    pub const fn slot(self) -> usize {
        self.0.trailing_zeros() as usize
    }

    pub const fn line(self) -> ExtiLine {
        ExtiLine::for_slot(self.slot())
    }
}

/// Signal edge that raises the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub fn rising(self) -> bool {
        matches!(self, Edge::Rising | Edge::Both)
    }

    pub fn falling(self) -> bool {
        matches!(self, Edge::Falling | Edge::Both)
    }
}

/// NVIC interrupt line serving one or more pin positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtiLine {
    Exti0,
    Exti1,
    Exti2,
    Exti3,
    Exti4,
    Exti9_5,
    Exti15_10,
}

impl ExtiLine {
    pub const ALL: [ExtiLine; 7] = [
        ExtiLine::Exti0,
        ExtiLine::Exti1,
        ExtiLine::Exti2,
        ExtiLine::Exti3,
        ExtiLine::Exti4,
        ExtiLine::Exti9_5,
        ExtiLine::Exti15_10,
    ];

    /// Line serving pin position `slot`. Positions above 15 are a programming
    /// error.
    pub const fn for_slot(slot: usize) -> ExtiLine {
        match slot {
            0 => ExtiLine::Exti0,
            1 => ExtiLine::Exti1,
            2 => ExtiLine::Exti2,
            3 => ExtiLine::Exti3,
            4 => ExtiLine::Exti4,
            5..=9 => ExtiLine::Exti9_5,
            10..=15 => ExtiLine::Exti15_10,
            _ => panic!("pin slot out of range"),
        }
    }

    /// Pin positions this line covers.
    pub const fn slots(self) -> RangeInclusive<usize> {
        match self {
            ExtiLine::Exti0 => 0..=0,
            ExtiLine::Exti1 => 1..=1,
            ExtiLine::Exti2 => 2..=2,
            ExtiLine::Exti3 => 3..=3,
            ExtiLine::Exti4 => 4..=4,
            ExtiLine::Exti9_5 => 5..=9,
            ExtiLine::Exti15_10 => 10..=15,
        }
    }

    pub fn pins(self) -> impl Iterator<Item = PinId> {
        self.slots().filter_map(PinId::from_slot)
    }

    pub fn is_shared(self) -> bool {
        self.slots().count() > 1
    }
}

/// Interrupt-controller operations the pin table needs.
///
/// Line operations act on the NVIC; pin operations act on the EXTI block.
/// Implemented over the PAC in firmware and by a recording mock in tests.
pub trait InterruptLines {
    fn mask_line(&mut self, line: ExtiLine);
    fn unmask_line(&mut self, line: ExtiLine);
    /// Clear the NVIC pending state of `line`.
    fn clear_pending(&mut self, line: ExtiLine);
    fn set_priority(&mut self, line: ExtiLine, priority: u8);
    /// Select the trigger edge(s) for `pin` and route it to the controller.
    fn configure_trigger(&mut self, pin: PinId, edge: Edge);
    /// Acknowledge `pin` in the EXTI pending register.
    fn clear_pin_pending(&mut self, pin: PinId);
}
