/// Total slots in the arbiter's transaction queue. Usable depth is one less.
pub const ARBITER_QUEUE_SLOTS: usize = 5;

/// Number of GPIO pin positions per port (one EXTI source each).
pub const PIN_SLOTS: usize = 16;

/// Most pins that can share a single EXTI interrupt vector (EXTI15_10).
pub const MAX_PINS_PER_LINE: usize = 6;

/// NVIC priority given to an EXTI line when it is first unmasked.
pub const DEFAULT_EXTI_PRIORITY: u8 = 0x80;
