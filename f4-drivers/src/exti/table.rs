//! Per-pin callback table behind the shared EXTI lines.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::constants::{DEFAULT_EXTI_PRIORITY, MAX_PINS_PER_LINE, PIN_SLOTS};
use crate::contract;
use crate::error::PinError;

use super::{Edge, ExtiLine, InterruptLines, PinId};

/// Handler for one pin. Runs in the line's interrupt context.
pub type PinCallback = fn(PinId);

#[derive(Clone, Copy)]
struct Slot {
    callback: Option<PinCallback>,
    enabled: bool,
}

impl Slot {
    const EMPTY: Slot = Slot {
        callback: None,
        enabled: false,
    };

    fn is_registered(&self) -> bool {
        self.callback.is_some()
    }

    fn dispatches(&self) -> bool {
        self.is_registered() && self.enabled
    }
}

struct Inner<H> {
    slots: [Slot; PIN_SLOTS],
    /// Bit `line as u8` set while that line is unmasked.
    unmasked: u8,
    hw: H,
}

impl<H: InterruptLines> Inner<H> {
    fn is_unmasked(&self, line: ExtiLine) -> bool {
        self.unmasked & (1 << line as u8) != 0
    }

    fn registered(&mut self, pin: PinId) -> Result<&mut Slot, PinError> {
        let slot = &mut self.slots[pin.slot()];
        if slot.callback.is_none() {
            return Err(PinError::NotRegistered);
        }
        Ok(slot)
    }

    /// Unmask `line` unless it already is.
    fn open(&mut self, line: ExtiLine, priority: u8) {
        if self.is_unmasked(line) {
            return;
        }
        self.hw.clear_pending(line);
        self.hw.set_priority(line, priority);
        self.hw.unmask_line(line);
        self.unmasked |= 1 << line as u8;
        log::debug!("{:?} unmasked", line);
    }

    /// Mask the line of `pin` unless another pin on it is registered.
    fn close(&mut self, pin: PinId) {
        let line = pin.line();
        let shared = line
            .slots()
            .any(|slot| slot != pin.slot() && self.slots[slot].is_registered());
        if shared || !self.is_unmasked(line) {
            return;
        }
        self.hw.mask_line(line);
        self.unmasked &= !(1 << line as u8);
        log::debug!("{:?} masked", line);
    }
}

/// Registry of pin interrupt callbacks, owned by whoever owns the EXTI
/// hardware handle `H`.
///
/// Registering or enabling a pin unmasks its line. Disabling or removing one
/// masks the line only when no other pin on it has a callback, so a sibling
/// is never silenced, even a disabled one. The enabled flag itself only
/// decides whether a callback runs at dispatch.
pub struct PinInterrupts<H> {
    inner: Mutex<RefCell<Inner<H>>>,
    priority: u8,
}

impl<H: InterruptLines> PinInterrupts<H> {
    pub const fn new(hw: H) -> Self {
        Self::with_priority(hw, DEFAULT_EXTI_PRIORITY)
    }

    /// `priority` is the raw NVIC priority byte given to each line when it
    /// is unmasked.
    pub const fn with_priority(hw: H, priority: u8) -> Self {
        PinInterrupts {
            inner: Mutex::new(RefCell::new(Inner {
                slots: [Slot::EMPTY; PIN_SLOTS],
                unmasked: 0,
                hw,
            })),
            priority,
        }
    }

    /// Install `callback` for `pin` and configure its trigger edge.
    ///
    /// The line is unmasked unless a sibling pin had already unmasked it,
    /// whether or not `enabled` is set.
    pub fn register(
        &self,
        pin: PinId,
        edge: Edge,
        callback: PinCallback,
        enabled: bool,
    ) -> Result<(), PinError> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.slots[pin.slot()].callback.is_some() {
                return Err(PinError::AlreadyRegistered);
            }
            inner.hw.configure_trigger(pin, edge);
            inner.slots[pin.slot()] = Slot {
                callback: Some(callback),
                enabled,
            };
            inner.open(pin.line(), self.priority);
            log::debug!("pin {} registered ({:?}, enabled: {})", pin.slot(), edge, enabled);
            Ok(())
        })
    }

    /// Resume dispatching to `pin`, unmasking its line if needed.
    pub fn enable(&self, pin: PinId) -> Result<(), PinError> {
        self.set_enabled(pin, true)
    }

    /// Stop dispatching to `pin`. Its line is masked only if no other pin on
    /// it is registered.
    pub fn disable(&self, pin: PinId) -> Result<(), PinError> {
        self.set_enabled(pin, false)
    }

    /// Drop the callback for `pin`, masking its line if no other pin on it
    /// is registered.
    pub fn remove(&self, pin: PinId) -> Result<(), PinError> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            *inner.registered(pin)? = Slot::EMPTY;
            inner.close(pin);
            log::debug!("pin {} removed", pin.slot());
            Ok(())
        })
    }

    fn set_enabled(&self, pin: PinId, enabled: bool) -> Result<(), PinError> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.registered(pin)?.enabled = enabled;
            if enabled {
                inner.open(pin.line(), self.priority);
            } else {
                inner.close(pin);
            }
            log::trace!("pin {} enabled: {}", pin.slot(), enabled);
            Ok(())
        })
    }

    pub fn is_registered(&self, pin: PinId) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).slots[pin.slot()].callback.is_some())
    }

    pub fn is_enabled(&self, pin: PinId) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).slots[pin.slot()].dispatches())
    }

    /// Call from the interrupt handler of `line`.
    ///
    /// Every pin the line covers is acknowledged, and every one with an
    /// enabled callback has it invoked, lowest position first. Pins without
    /// one are skipped silently. Callbacks run outside the critical section,
    /// so they may re-register, disable or remove pins.
    pub fn on_line_interrupt(&self, line: ExtiLine) {
        let ready = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let mut ready = heapless::Vec::<(PinCallback, PinId), MAX_PINS_PER_LINE>::new();
            for pin in line.pins() {
                inner.hw.clear_pin_pending(pin);
                let slot = inner.slots[pin.slot()];
                if let (Some(callback), true) = (slot.callback, slot.enabled) {
                    if ready.push((callback, pin)).is_err() {
                        contract::fatal("EXTI line covers more than MAX_PINS_PER_LINE pins");
                    }
                }
            }
            ready
        });

        for (callback, pin) in ready {
            callback(pin);
        }
    }

    /// Run `f` on the hardware handle inside a critical section.
    pub fn with_hardware<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs).hw))
    }

    /// Give back the hardware handle.
    pub fn release(self) -> H {
        self.inner.into_inner().into_inner().hw
    }
}
