//! Two SPI devices on one bus, plus a button on a pin interrupt.
//!
//! The LIS3DSH accelerometer and a MAX7219 8x8 LED matrix share SPI1 through
//! one `SpiArbiter`. Accelerometer samples go through the async path: chip
//! select drops, a 7-byte burst read is queued, and the completion callback
//! (run from the SPI1 interrupt) raises chip select and stores the sample.
//! The matrix is driven through the arbiter's blocking `SpiBus` surface and
//! shows a dot that rolls with the board's tilt. The user button cycles the
//! matrix brightness.
//!
//! Hardware: STM32F407G-DISC1 + MAX7219 matrix module
//!
//! ```text
//!   SPI1 ── PA5 SCK ── PA6 MISO ── PA7 MOSI ──┬── LIS3DSH  (CS PE3, on board)
//!                                             └── MAX7219  (CS PB6)
//!   PA0 user button ── EXTI0
//! ```

#![no_std]
#![no_main]

mod board;

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;
use embedded_hal::digital::OutputPin;
use f4_drivers::devices::lis3dsh::{self, SAMPLE_LEN};
use f4_drivers::exti::PinId;
use f4_drivers::spi::{BusTransport, Completed, SpiArbiter, TransferMode};
use stm32f4xx_hal::gpio::{Output, Pin};
use stm32f4xx_hal::spi::Spi1;

type Transport = BusTransport<Spi1>;
type Arbiter = SpiArbiter<Transport>;
type AccelCs = Pin<'E', 3, Output>;

/// Accelerometer chip select, raised by the sample completion.
static ACCEL_CS: Mutex<RefCell<Option<AccelCs>>> = Mutex::new(RefCell::new(None));
/// Receive buffer for the next sample; `None` while a sample is in flight.
static SAMPLE_RX: Mutex<RefCell<Option<&'static mut [u8]>>> = Mutex::new(RefCell::new(None));
static LATEST: Mutex<Cell<Option<[i16; 3]>>> = Mutex::new(Cell::new(None));
static PRESSES: AtomicU32 = AtomicU32::new(0);

/// Signal hook for the transport: the completion runs from the SPI1 task.
fn pend_spi1() {
    rtic::pend(stm32f4xx_hal::pac::Interrupt::SPI1);
}

fn sample_done(done: Completed) {
    let ok = done.is_ok();
    critical_section::with(|cs| {
        if let Some(pin) = ACCEL_CS.borrow_ref_mut(cs).as_mut() {
            let _ = pin.set_high();
        }
        let Some(rx) = done.into_rx() else {
            return;
        };
        if ok {
            if let Ok(frame) = <&[u8; SAMPLE_LEN]>::try_from(&*rx) {
                LATEST.borrow(cs).set(Some(lis3dsh::decode_sample(frame)));
            }
        }
        SAMPLE_RX.borrow_ref_mut(cs).replace(rx);
    });
}

/// Queue one accelerometer read unless the previous one is still out.
fn start_sample(arbiter: &Arbiter) {
    let Some(rx) = critical_section::with(|cs| {
        let rx = SAMPLE_RX.borrow_ref_mut(cs).take()?;
        // Only idle touches the bus, so nothing else is selected right now
        if let Some(pin) = ACCEL_CS.borrow_ref_mut(cs).as_mut() {
            let _ = pin.set_low();
        }
        Some(rx)
    }) else {
        return;
    };

    if let Err(e) = arbiter.write_read_async(
        TransferMode::Dma,
        &lis3dsh::SAMPLE_COMMAND,
        rx,
        Some(sample_done),
    ) {
        // The buffer went down with the request; sampling stops here
        log::error!("accelerometer sample rejected: {:?}", e);
        critical_section::with(|cs| {
            if let Some(pin) = ACCEL_CS.borrow_ref_mut(cs).as_mut() {
                let _ = pin.set_high();
            }
        });
    }
}

fn on_button(_pin: PinId) {
    PRESSES.fetch_add(1, Ordering::Relaxed);
}

/// A single lit dot, pushed towards the low side of the board.
fn level_pattern(tilt: lis3dsh::Tilt) -> [u8; 8] {
    let cell = |deg: f32| ((deg.clamp(-45.0, 45.0) + 45.0) * 7.0 / 90.0 + 0.5) as usize;
    let mut rows = [0u8; 8];
    rows[cell(tilt.pitch)] = 0x80 >> cell(tilt.roll);
    rows
}

#[rtic::app(device = stm32f4xx_hal::pac, peripherals = true)]
mod app {
    use super::*;

    use f4_drivers::devices::lis3dsh::{DataRate, FullScale, Lis3dsh, Tilt};
    use f4_drivers::devices::max7219::{Max7219, MAX_INTENSITY};
    use f4_drivers::exti::{Edge, ExtiLine, PinInterrupts};
    use static_cell::StaticCell;
    use stm32f4xx_hal::{gpio::PinState, prelude::*};

    use crate::board::{self, ExtiLines};

    /// Core clock, also the unit of `asm::delay`.
    const SYSCLK_HZ: u32 = 84_000_000;
    const SAMPLE_PERIOD_CYCLES: u32 = SYSCLK_HZ / 25;

    type MatrixCs = Pin<'B', 6, Output>;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        arbiter_irq: &'static Arbiter,
        pins: &'static PinInterrupts<ExtiLines>,
        matrix: Max7219<&'static Arbiter, MatrixCs>,
        arbiter_idle: &'static Arbiter,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        static ARBITER: StaticCell<Arbiter> = StaticCell::new();
        static PINS: StaticCell<PinInterrupts<ExtiLines>> = StaticCell::new();
        static SAMPLE_BUF: StaticCell<[u8; SAMPLE_LEN]> = StaticCell::new();

        board::init_logging(log::LevelFilter::Debug);

        let dp = cx.device;
        let clocks = dp
            .RCC
            .constrain()
            .cfgr
            .use_hse(8.MHz())
            .sysclk(SYSCLK_HZ.Hz())
            .freeze();

        let gpioa = dp.GPIOA.split();
        let gpiob = dp.GPIOB.split();
        let gpioe = dp.GPIOE.split();

        // ── SPI1 behind the arbiter ─────────────────────────────────
        let spi = dp.SPI1.spi(
            (gpioa.pa5, gpioa.pa6, gpioa.pa7),
            embedded_hal::spi::MODE_3,
            1.MHz(),
            &clocks,
        );
        let arbiter: &'static Arbiter =
            ARBITER.init(SpiArbiter::new(BusTransport::new(spi, pend_spi1)));
        arbiter.init().expect("SPI1 init");

        // ── Devices ─────────────────────────────────────────────────
        let accel_cs = gpioe.pe3.into_push_pull_output_in_state(PinState::High);
        let mut accel = Lis3dsh::new(arbiter, accel_cs);
        accel
            .init(DataRate::Hz100, FullScale::G2)
            .expect("LIS3DSH init");
        let (_, accel_cs) = accel.release();

        let matrix_cs = gpiob.pb6.into_push_pull_output_in_state(PinState::High);
        let mut matrix = Max7219::new(arbiter, matrix_cs);
        matrix.init().expect("MAX7219 init");
        matrix.set_intensity(1).expect("MAX7219 intensity");

        critical_section::with(|cs| {
            ACCEL_CS.borrow_ref_mut(cs).replace(accel_cs);
            SAMPLE_RX
                .borrow_ref_mut(cs)
                .replace(SAMPLE_BUF.init([0; SAMPLE_LEN]));
        });

        // ── Button on PA0 ───────────────────────────────────────────
        let mut syscfg = dp.SYSCFG.constrain();
        let mut button = gpioa.pa0.into_pull_down_input();
        button.make_interrupt_source(&mut syscfg);

        let pins: &'static _ = PINS.init(PinInterrupts::new(ExtiLines::new(dp.EXTI)));
        let button_pin = PinId::from_slot(0).expect("PA0");
        pins.register(button_pin, Edge::Rising, on_button, true)
            .expect("PA0 interrupt");

        log::info!("shared_spi up");

        (
            Shared {},
            Local {
                arbiter_irq: arbiter,
                pins,
                matrix,
                arbiter_idle: arbiter,
            },
        )
    }

    #[idle(local = [matrix, arbiter_idle, shown_presses: u32 = 0])]
    fn idle(cx: idle::Context) -> ! {
        let matrix = cx.local.matrix;
        let arbiter = *cx.local.arbiter_idle;

        loop {
            start_sample(arbiter);
            cortex_m::asm::delay(SAMPLE_PERIOD_CYCLES);

            if let Some(raw) = critical_section::with(|cs| LATEST.borrow(cs).take()) {
                let tilt = Tilt::from_mg(FullScale::G2.to_mg(raw));
                if let Err(e) = matrix.draw(&level_pattern(tilt)) {
                    log::warn!("matrix refresh failed: {:?}", e);
                }
            }

            let presses = PRESSES.load(Ordering::Relaxed);
            if presses != *cx.local.shown_presses {
                *cx.local.shown_presses = presses;
                let level = (presses * 4) as u8 % (MAX_INTENSITY + 1);
                log::debug!("button: intensity {}", level);
                if let Err(e) = matrix.set_intensity(level) {
                    log::warn!("matrix intensity failed: {:?}", e);
                }
            }
        }
    }

    #[task(binds = SPI1, local = [arbiter_irq], priority = 2)]
    fn spi1_done(cx: spi1_done::Context) {
        cx.local.arbiter_irq.on_transfer_complete();
    }

    #[task(binds = EXTI0, local = [pins], priority = 1)]
    fn exti0(cx: exti0::Context) {
        cx.local.pins.on_line_interrupt(ExtiLine::Exti0);
    }
}
