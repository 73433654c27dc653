//! STM32F407 glue shared by the demos: RTT logging and the EXTI/NVIC backend
//! for the pin interrupt table.

use cortex_m::peripheral::NVIC;
use f4_drivers::exti::{Edge, ExtiLine, InterruptLines, PinId};
use rtt_target::{rprintln, rtt_init_print};
use stm32f4xx_hal::pac::{self, Interrupt};

// ── Logging ──────────────────────────────────────────────────────────

struct RttLogger;

impl log::Log for RttLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            rprintln!("{:<5} {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: RttLogger = RttLogger;

/// Open the RTT up channel and route the `log` facade to it.
pub fn init_logging(level: log::LevelFilter) {
    rtt_init_print!();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// ── EXTI ─────────────────────────────────────────────────────────────

fn irq(line: ExtiLine) -> Interrupt {
    match line {
        ExtiLine::Exti0 => Interrupt::EXTI0,
        ExtiLine::Exti1 => Interrupt::EXTI1,
        ExtiLine::Exti2 => Interrupt::EXTI2,
        ExtiLine::Exti3 => Interrupt::EXTI3,
        ExtiLine::Exti4 => Interrupt::EXTI4,
        ExtiLine::Exti9_5 => Interrupt::EXTI9_5,
        ExtiLine::Exti15_10 => Interrupt::EXTI15_10,
    }
}

/// EXTI block plus the NVIC lines it feeds.
///
/// Port routing (SYSCFG_EXTICRx) is left to the HAL's
/// `make_interrupt_source`; this only handles edges, masks and pending bits.
pub struct ExtiLines {
    exti: pac::EXTI,
}

impl ExtiLines {
    pub fn new(exti: pac::EXTI) -> Self {
        ExtiLines { exti }
    }
}

impl InterruptLines for ExtiLines {
    fn mask_line(&mut self, line: ExtiLine) {
        NVIC::mask(irq(line));
    }

    fn unmask_line(&mut self, line: ExtiLine) {
        // SAFETY: the handlers for these lines are RTIC tasks, so unmasking
        // cannot break a priority-based critical section.
        unsafe { NVIC::unmask(irq(line)) };
    }

    fn clear_pending(&mut self, line: ExtiLine) {
        NVIC::unpend(irq(line));
    }

    fn set_priority(&mut self, line: ExtiLine, priority: u8) {
        // RTIC derives the lock ceilings from the task priorities it programs
        // itself; overriding them here would void those locks.
        log::trace!("{:?}: keeping RTIC priority, ignoring {:#04x}", line, priority);
    }

    fn configure_trigger(&mut self, pin: PinId, edge: Edge) {
        let mask = u32::from(pin.mask());
        let set = |on: bool, bits: u32| if on { bits | mask } else { bits & !mask };
        self.exti
            .rtsr()
            .modify(|r, w| unsafe { w.bits(set(edge.rising(), r.bits())) });
        self.exti
            .ftsr()
            .modify(|r, w| unsafe { w.bits(set(edge.falling(), r.bits())) });
        self.exti
            .imr()
            .modify(|r, w| unsafe { w.bits(r.bits() | mask) });
    }

    fn clear_pin_pending(&mut self, pin: PinId) {
        // PR is write-one-to-clear
        self.exti
            .pr()
            .write(|w| unsafe { w.bits(u32::from(pin.mask())) });
    }
}
