//! Shared-bus arbiter.
//!
//! [`SpiArbiter`] lets several client drivers (an accelerometer and a LED
//! matrix, say) use one physical SPI peripheral as if each owned it. Async
//! requests are queued in submission order and executed one at a time; each
//! completion interrupt finishes the in-flight request and starts the next.
//!
//! ## Bus ownership
//!
//! The `busy` flag is the ownership token for the physical transport: the
//! context that flips it from `false` to `true` may touch the transport (and
//! acts as the queue's consumer) until it either hands the bus over to an
//! in-flight transfer or flips the flag back. Ownership moves like this:
//!
//! ```text
//!  submit (idle) ──start──► in flight ──completion ISR──► next queued? ──yes──► in flight
//!        ▲                                                     │no
//!        └──────────────────────── idle ◄──────────────────────┘
//!  blocking call: spin until idle, take, transfer, then same "next queued?" step
//! ```
//!
//! Invariant: while the bus is idle the queue is empty. The in-flight
//! transaction stays at the queue head until its completion has run.
//!
//! A second flag, `in_flight`, is set only while an async transfer started
//! from the queue head is outstanding. Completions arriving without one
//! (bus idle, or held by a blocking call) are contract violations and leave
//! the queue untouched.
//!
//! ## Usage
//!
//! ```ignore
//! static ARBITER: StaticCell<SpiArbiter<Transport>> = StaticCell::new();
//! let arbiter: &'static _ = ARBITER.init(SpiArbiter::new(transport));
//! arbiter.init()?;
//!
//! // Any context:
//! arbiter.write_async(TransferMode::Dma, &FRAME, Some(frame_sent))?;
//!
//! // SPI / DMA completion interrupt:
//! arbiter.on_transfer_complete();
//! ```

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::spi::{Error as _, ErrorKind, ErrorType, SpiBus};

use crate::constants::ARBITER_QUEUE_SLOTS;
use crate::contract;
use crate::error::SpiError;
use crate::queue::IsrQueue;

use super::transaction::{Completion, Transaction};
use super::transport::{SpiTransport, TransferMode};

/// Serializes transactions from many clients onto one [`SpiTransport`].
pub struct SpiArbiter<T> {
    transport: UnsafeCell<T>,
    queue: IsrQueue<Transaction, ARBITER_QUEUE_SLOTS>,
    /// True exactly while some context owns the transport.
    busy: AtomicBool,
    /// True while the queue head has been started and not yet completed.
    in_flight: AtomicBool,
}

// SAFETY: the transport is only reached through `&mut` by the context that
// holds `busy` (see module docs), so sharing the arbiter only requires that
// the transport itself may move between contexts.
unsafe impl<T: Send> Sync for SpiArbiter<T> {}

type Result<T, E> = core::result::Result<T, SpiError<E>>;

impl<T: SpiTransport> SpiArbiter<T> {
    /// Queue depth available to clients, counting the in-flight transaction.
    pub const QUEUE_DEPTH: usize = ARBITER_QUEUE_SLOTS - 1;

    pub const fn new(transport: T) -> Self {
        SpiArbiter {
            transport: UnsafeCell::new(transport),
            queue: IsrQueue::new(),
            busy: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Initialize the physical transport, waiting for the bus if needed.
    pub fn init(&self) -> Result<(), T::Error> {
        self.with_bus(|transport| transport.init().map_err(SpiError::Transport))
    }

    // ── Async operations ───────────────────────────────────────────────

    /// Queue a transmit of `tx`. `on_done` runs once the bytes are out.
    pub fn write_async(
        &self,
        mode: TransferMode,
        tx: &'static [u8],
        on_done: Option<Completion>,
    ) -> Result<(), T::Error> {
        self.submit(Transaction::write(mode, tx, on_done))
    }

    /// Queue a full-duplex transfer; `tx` and `rx` must be the same length.
    pub fn write_read_async(
        &self,
        mode: TransferMode,
        tx: &'static [u8],
        rx: &'static mut [u8],
        on_done: Option<Completion>,
    ) -> Result<(), T::Error> {
        self.submit(Transaction::write_read(mode, tx, rx, on_done))
    }

    /// Queue a receive into `rx`.
    pub fn read_async(
        &self,
        mode: TransferMode,
        rx: &'static mut [u8],
        on_done: Option<Completion>,
    ) -> Result<(), T::Error> {
        self.submit(Transaction::read(mode, rx, on_done))
    }

    /// Queue `transaction`, starting it right away if the bus is idle.
    ///
    /// On error the transaction is dropped and its completion never runs.
    pub fn submit(&self, transaction: Transaction) -> Result<(), T::Error> {
        contract::expect(
            transaction.buffers().is_valid(),
            SpiError::InvalidLength,
            "transfer length must be non-zero and equal in both directions",
        )?;

        critical_section::with(|_| {
            let owner = self.try_acquire();
            if owner {
                // SAFETY: `busy` was just taken by this context.
                let ready = unsafe { self.transport() }.is_initialized();
                if let Err(e) =
                    contract::expect(ready, SpiError::NotInitialized, "SPI transport not initialized")
                {
                    self.busy.store(false, Ordering::Release);
                    return Err(e);
                }
            }

            if self.queue.push(transaction).is_err() {
                if owner {
                    self.busy.store(false, Ordering::Release);
                }
                log::warn!("SPI queue full, request dropped");
                return Err(SpiError::QueueFull);
            }

            if !owner {
                log::trace!("SPI busy, request queued ({} pending)", self.queue.len());
                return Ok(());
            }

            // SAFETY: the bus is ours and the queue held nothing before this push.
            match unsafe { self.start_head() } {
                Ok(()) => Ok(()),
                Err(e) => {
                    log::warn!("SPI transport refused transfer: {:?}", e.kind());
                    if !cfg!(feature = "legacy-dispatch") {
                        drop(self.queue.pop());
                        self.busy.store(false, Ordering::Release);
                    }
                    Err(SpiError::Transport(e))
                }
            }
        })
    }

    // ── Completion (interrupt context) ─────────────────────────────────

    /// The in-flight transfer finished. Call from the transport's
    /// completion interrupt.
    ///
    /// Runs the finished transaction's completion, then starts the next
    /// queued transaction or marks the bus idle.
    pub fn on_transfer_complete(&self) {
        self.finish(Ok(()));
    }

    /// The in-flight transfer failed. The transaction completes with
    /// `Err(kind)` and the queue moves on.
    pub fn on_transfer_error(&self, kind: ErrorKind) {
        self.finish(Err(kind));
    }

    fn finish(&self, status: core::result::Result<(), ErrorKind>) {
        if !self.in_flight.swap(false, Ordering::AcqRel) {
            contract::violated("SPI completion with no transfer in flight");
            return;
        }
        // The completion interrupt is the queue's consumer while a transfer is
        // in flight; no other context touches the head until `advance()`.
        let Some(done) = self.queue.pop() else {
            contract::violated("SPI completion with an empty queue");
            return;
        };
        log::trace!("SPI transfer done ({} bytes)", done.buffers().len());
        done.complete(status);

        // SAFETY: `busy` is still held on behalf of the finished transfer.
        critical_section::with(|_| unsafe { self.advance() });
    }

    /// Start the queue head, or mark the bus idle if nothing is waiting.
    ///
    /// # Safety
    ///
    /// The caller holds the bus and runs inside a critical section.
    unsafe fn advance(&self) {
        loop {
            if self.queue.is_empty() {
                self.busy.store(false, Ordering::Release);
                return;
            }
            match unsafe { self.start_head() } {
                Ok(()) => return,
                Err(e) => {
                    log::error!("SPI transport refused queued transfer: {:?}", e.kind());
                    if cfg!(feature = "legacy-dispatch") {
                        return;
                    }
                    if let Some(refused) = self.queue.pop() {
                        refused.complete(Err(e.kind()));
                    }
                }
            }
        }
    }

    /// # Safety
    ///
    /// The caller holds the bus (and with it the queue's consumer role).
    unsafe fn start_head(&self) -> core::result::Result<(), T::Error> {
        let transport = unsafe { self.transport() };
        let Some(head) = (unsafe { self.queue.head_mut() }) else {
            return Ok(());
        };
        head.start(transport)?;
        self.in_flight.store(true, Ordering::Release);
        Ok(())
    }

    // ── Blocking operations ────────────────────────────────────────────

    /// Transmit `tx`, spinning until the bus is free and the bytes are out.
    pub fn write_blocking(&self, tx: &[u8]) -> Result<(), T::Error> {
        contract::expect(!tx.is_empty(), SpiError::InvalidLength, "empty SPI write")?;
        self.blocking(|bus| bus.write(tx))
    }

    /// Full-duplex transfer; `tx` and `rx` must be the same length.
    pub fn write_read_blocking(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), T::Error> {
        contract::expect(
            !tx.is_empty() && tx.len() == rx.len(),
            SpiError::InvalidLength,
            "SPI write/read buffers must be non-empty and equally long",
        )?;
        self.blocking(|bus| bus.transfer(rx, tx))
    }

    /// Receive into `rx`, spinning until the bus is free and the bytes are in.
    pub fn read_blocking(&self, rx: &mut [u8]) -> Result<(), T::Error> {
        contract::expect(!rx.is_empty(), SpiError::InvalidLength, "empty SPI read")?;
        self.blocking(|bus| bus.read(rx))
    }

    fn blocking(
        &self,
        op: impl FnOnce(&mut T) -> core::result::Result<(), T::Error>,
    ) -> Result<(), T::Error> {
        self.with_bus(|transport| {
            contract::expect(
                transport.is_initialized(),
                SpiError::NotInitialized,
                "SPI transport not initialized",
            )?;
            op(&mut *transport)
                .and_then(|_| transport.flush())
                .map_err(SpiError::Transport)
        })
    }

    // ── Power ──────────────────────────────────────────────────────────

    /// Wait for the bus to go idle, drop anything still queued and put the
    /// transport to sleep.
    ///
    /// The arbiter is idle and empty afterwards even when the transport's own
    /// sleep fails; that failure is still returned.
    pub fn sleep(&self) -> Result<(), T::Error> {
        self.acquire();
        critical_section::with(|_| {
            self.queue.clear();
            self.in_flight.store(false, Ordering::Release);
            // SAFETY: acquired above.
            let result = unsafe { self.transport() }.sleep();
            self.busy.store(false, Ordering::Release);
            log::debug!("SPI arbiter asleep");
            result.map_err(SpiError::Transport)
        })
    }

    // ── Introspection ──────────────────────────────────────────────────

    /// Whether a transfer is in flight (or a blocking call holds the bus).
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Transactions queued, including the in-flight one.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Give back the transport. Queued transactions are dropped.
    pub fn release(self) -> T {
        self.transport.into_inner()
    }

    // ── Bus ownership ──────────────────────────────────────────────────

    fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn acquire(&self) {
        while self
            .busy
            .compare_exchange_weak(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            spin_loop();
        }
    }

    /// Spin until the bus is free, run `f` on the transport, then hand the
    /// bus to whatever was queued meanwhile.
    fn with_bus<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.acquire();
        // SAFETY: acquired above.
        let result = f(unsafe { self.transport() });
        // SAFETY: still held; `advance` releases it or passes it on.
        critical_section::with(|_| unsafe { self.advance() });
        result
    }

    /// # Safety
    ///
    /// The caller holds `busy`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn transport(&self) -> &mut T {
        unsafe { &mut *self.transport.get() }
    }
}

// ── Drop-in bus surface ────────────────────────────────────────────────

impl<T: SpiTransport> ErrorType for &SpiArbiter<T> {
    type Error = SpiError<T::Error>;
}

/// Every operation runs on the blocking path, so a client driver generic over
/// [`SpiBus`] works the same on an arbitrated bus as on a physical one.
/// Zero-length operations are no-ops here, as `SpiBus` requires.
impl<T: SpiTransport> SpiBus<u8> for &SpiArbiter<T> {
    fn read(&mut self, words: &mut [u8]) -> core::result::Result<(), Self::Error> {
        if words.is_empty() {
            return Ok(());
        }
        self.read_blocking(words)
    }

    fn write(&mut self, words: &[u8]) -> core::result::Result<(), Self::Error> {
        if words.is_empty() {
            return Ok(());
        }
        self.write_blocking(words)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> core::result::Result<(), Self::Error> {
        if read.is_empty() && write.is_empty() {
            return Ok(());
        }
        self.blocking(|bus| bus.transfer(read, write))
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> core::result::Result<(), Self::Error> {
        if words.is_empty() {
            return Ok(());
        }
        self.blocking(|bus| bus.transfer_in_place(words))
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::mock::{leak, leak_zeroed, Call, MockError, MockTransport};
    use crate::spi::Completed;
    use std::sync::{Mutex, OnceLock};
    use std::vec::Vec;

    fn make_arbiter() -> (SpiArbiter<MockTransport>, MockTransport) {
        let mock = MockTransport::initialized();
        (SpiArbiter::new(mock.clone()), mock)
    }

    #[test]
    fn idle_submit_starts_immediately() {
        let (arbiter, mock) = make_arbiter();

        arbiter.write_async(TransferMode::Dma, leak(&[0xA1]), None).unwrap();

        assert_eq!(mock.calls(), [Call::StartWrite(TransferMode::Dma, std::vec![0xA1])]);
        assert!(arbiter.is_busy());
        assert_eq!(arbiter.pending(), 1);
    }

    #[test]
    fn completions_fire_in_submission_order() {
        static LOG: Mutex<Vec<u8>> = Mutex::new(Vec::new());
        fn record(done: Completed) {
            LOG.lock().unwrap().push(done.tx().unwrap()[0]);
        }

        let (arbiter, mock) = make_arbiter();
        for id in [b'A', b'B', b'C'] {
            arbiter
                .write_async(TransferMode::Dma, leak(&[id]), Some(record))
                .unwrap();
        }

        // A went straight to the transport; nothing has completed yet
        assert_eq!(mock.calls(), [Call::StartWrite(TransferMode::Dma, std::vec![b'A'])]);
        assert!(LOG.lock().unwrap().is_empty());

        arbiter.on_transfer_complete();
        assert_eq!(*LOG.lock().unwrap(), [b'A']);
        assert_eq!(mock.calls().last(), Some(&Call::StartWrite(TransferMode::Dma, std::vec![b'B'])));

        arbiter.on_transfer_complete();
        arbiter.on_transfer_complete();
        assert_eq!(*LOG.lock().unwrap(), [b'A', b'B', b'C']);
        assert!(!arbiter.is_busy());
        assert_eq!(arbiter.pending(), 0);
    }

    #[test]
    fn busy_bus_defers_until_completion() {
        let (arbiter, mock) = make_arbiter();

        arbiter.write_async(TransferMode::Dma, leak(&[1]), None).unwrap();
        arbiter.write_async(TransferMode::Interrupt, leak(&[2]), None).unwrap();
        arbiter.read_async(TransferMode::Interrupt, leak_zeroed(3), None).unwrap();

        assert_eq!(mock.starts(), 1);
        assert_eq!(arbiter.pending(), 3);

        // Exactly one new start per completion
        arbiter.on_transfer_complete();
        assert_eq!(mock.starts(), 2);
        arbiter.on_transfer_complete();
        assert_eq!(mock.starts(), 3);
        arbiter.on_transfer_complete();
        assert_eq!(mock.starts(), 3);

        assert_eq!(
            mock.calls(),
            [
                Call::StartWrite(TransferMode::Dma, std::vec![1]),
                Call::StartWrite(TransferMode::Interrupt, std::vec![2]),
                Call::StartRead(TransferMode::Interrupt, 3),
            ]
        );
    }

    #[test]
    fn queue_depth_boundary() {
        let (arbiter, mock) = make_arbiter();
        assert_eq!(SpiArbiter::<MockTransport>::QUEUE_DEPTH, 4);

        for i in 0..4u8 {
            arbiter.write_async(TransferMode::Dma, leak(&[i]), None).unwrap();
        }
        assert_eq!(
            arbiter.write_async(TransferMode::Dma, leak(&[4]), None),
            Err(SpiError::QueueFull)
        );
        assert_eq!(arbiter.pending(), 4);
        assert_eq!(mock.starts(), 1);

        // Completing the in-flight one frees a slot
        arbiter.on_transfer_complete();
        arbiter.write_async(TransferMode::Dma, leak(&[5]), None).unwrap();
        assert_eq!(arbiter.pending(), 4);
    }

    #[cfg(not(any(feature = "contract-trap", feature = "contract-reset")))]
    #[test]
    fn uninitialized_transport_is_rejected() {
        let mock = MockTransport::new();
        let arbiter = SpiArbiter::new(mock.clone());

        assert_eq!(
            arbiter.write_async(TransferMode::Dma, leak(&[1]), None),
            Err(SpiError::NotInitialized)
        );
        assert_eq!(arbiter.write_blocking(&[1]), Err(SpiError::NotInitialized));
        assert!(!arbiter.is_busy());
        assert_eq!(arbiter.pending(), 0);
        assert!(mock.calls().is_empty());

        arbiter.init().unwrap();
        arbiter.write_async(TransferMode::Dma, leak(&[1]), None).unwrap();
        assert_eq!(mock.starts(), 1);
    }

    #[cfg(not(any(feature = "contract-trap", feature = "contract-reset")))]
    #[test]
    fn invalid_lengths_are_rejected() {
        let (arbiter, mock) = make_arbiter();

        assert_eq!(
            arbiter.write_async(TransferMode::Dma, leak(&[]), None),
            Err(SpiError::InvalidLength)
        );
        assert_eq!(
            arbiter.write_read_async(TransferMode::Dma, leak(&[1, 2]), leak_zeroed(1), None),
            Err(SpiError::InvalidLength)
        );
        assert_eq!(arbiter.read_blocking(&mut []), Err(SpiError::InvalidLength));
        assert_eq!(
            arbiter.write_read_blocking(&[1], &mut [0, 0]),
            Err(SpiError::InvalidLength)
        );
        assert!(mock.calls().is_empty());
        assert!(!arbiter.is_busy());
    }

    #[cfg(not(feature = "legacy-dispatch"))]
    #[test]
    fn refused_start_is_rolled_back() {
        let (arbiter, mock) = make_arbiter();
        mock.state().refuse_starts = 1;

        let result = arbiter.write_async(TransferMode::Dma, leak(&[1]), None);
        assert!(matches!(result, Err(SpiError::Transport(_))));
        assert_eq!(arbiter.pending(), 0);
        assert!(!arbiter.is_busy());

        // The bus is usable straight away
        arbiter.write_async(TransferMode::Dma, leak(&[2]), None).unwrap();
        assert_eq!(mock.calls(), [Call::StartWrite(TransferMode::Dma, std::vec![2])]);
    }

    #[cfg(feature = "legacy-dispatch")]
    #[test]
    fn refused_start_stays_queued_in_legacy_mode() {
        let (arbiter, mock) = make_arbiter();
        mock.state().refuse_starts = 1;

        let result = arbiter.write_async(TransferMode::Dma, leak(&[1]), None);
        assert!(matches!(result, Err(SpiError::Transport(_))));
        assert_eq!(arbiter.pending(), 1);
        assert!(arbiter.is_busy());

        // Later requests wait behind the phantom in-flight one
        arbiter.write_async(TransferMode::Dma, leak(&[2]), None).unwrap();
        assert_eq!(mock.starts(), 0);
    }

    #[cfg(not(feature = "legacy-dispatch"))]
    #[test]
    fn refused_chained_start_completes_with_error() {
        static LOG: Mutex<Vec<(u8, bool)>> = Mutex::new(Vec::new());
        fn record(done: Completed) {
            LOG.lock().unwrap().push((done.tx().unwrap()[0], done.is_ok()));
        }

        let (arbiter, mock) = make_arbiter();
        for id in 1..=3u8 {
            arbiter
                .write_async(TransferMode::Dma, leak(&[id]), Some(record))
                .unwrap();
        }

        mock.state().refuse_starts = 1;
        arbiter.on_transfer_complete();

        // 1 finished, 2 was refused by the transport, 3 took its place
        assert_eq!(*LOG.lock().unwrap(), [(1, true), (2, false)]);
        assert_eq!(mock.calls().last(), Some(&Call::StartWrite(TransferMode::Dma, std::vec![3])));

        arbiter.on_transfer_complete();
        assert_eq!(*LOG.lock().unwrap(), [(1, true), (2, false), (3, true)]);
        assert!(!arbiter.is_busy());
    }

    #[test]
    fn transfer_error_reaches_completion() {
        static STATUS: Mutex<Vec<core::result::Result<(), ErrorKind>>> = Mutex::new(Vec::new());
        fn record(done: Completed) {
            STATUS.lock().unwrap().push(done.status);
        }

        let (arbiter, mock) = make_arbiter();
        arbiter.write_async(TransferMode::Dma, leak(&[1]), Some(record)).unwrap();
        arbiter.write_async(TransferMode::Dma, leak(&[2]), Some(record)).unwrap();

        arbiter.on_transfer_error(ErrorKind::Overrun);
        assert_eq!(*STATUS.lock().unwrap(), [Err(ErrorKind::Overrun)]);
        assert_eq!(mock.starts(), 2);

        arbiter.on_transfer_complete();
        assert_eq!(*STATUS.lock().unwrap(), [Err(ErrorKind::Overrun), Ok(())]);
    }

    #[test]
    fn receive_buffers_are_handed_back() {
        static RX: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());
        fn record(done: Completed) {
            let rx = done.into_rx().unwrap();
            RX.lock().unwrap().push(rx.to_vec());
        }

        let (arbiter, mock) = make_arbiter();
        mock.state().fill = 0x5A;

        arbiter
            .write_read_async(TransferMode::Dma, leak(&[1, 2, 3]), leak_zeroed(3), Some(record))
            .unwrap();
        arbiter
            .read_async(TransferMode::Interrupt, leak_zeroed(2), Some(record))
            .unwrap();

        arbiter.on_transfer_complete();
        arbiter.on_transfer_complete();

        assert_eq!(*RX.lock().unwrap(), [std::vec![1, 2, 3], std::vec![0x5A, 0x5A]]);
    }

    #[test]
    fn completion_may_submit_follow_up() {
        static ARBITER: OnceLock<SpiArbiter<MockTransport>> = OnceLock::new();
        static LOG: Mutex<Vec<u8>> = Mutex::new(Vec::new());

        fn first_done(_: Completed) {
            LOG.lock().unwrap().push(1);
            let arbiter = ARBITER.get().unwrap();
            arbiter
                .write_async(TransferMode::Dma, leak(&[2]), Some(second_done))
                .unwrap();
        }
        fn second_done(_: Completed) {
            LOG.lock().unwrap().push(2);
        }

        let mock = MockTransport::initialized();
        let arbiter = ARBITER.get_or_init(|| SpiArbiter::new(mock.clone()));

        arbiter
            .write_async(TransferMode::Dma, leak(&[1]), Some(first_done))
            .unwrap();
        arbiter.on_transfer_complete();

        // The follow-up was queued from the callback and started by the handler
        assert_eq!(mock.starts(), 2);
        assert!(arbiter.is_busy());

        arbiter.on_transfer_complete();
        assert_eq!(*LOG.lock().unwrap(), [1, 2]);
        assert!(!arbiter.is_busy());
    }

    #[test]
    fn blocking_calls_bypass_the_queue() {
        let (arbiter, mock) = make_arbiter();
        mock.state().fill = 0xEE;

        arbiter.write_blocking(&[1, 2]).unwrap();
        let mut rx = [0u8; 2];
        arbiter.read_blocking(&mut rx).unwrap();
        let mut duplex = [0u8; 1];
        arbiter.write_read_blocking(&[7], &mut duplex).unwrap();

        assert_eq!(rx, [0xEE, 0xEE]);
        assert_eq!(duplex, [0xEE]);
        assert_eq!(
            mock.calls(),
            [
                Call::Write(std::vec![1, 2]),
                Call::Read(2),
                Call::Transfer(std::vec![7]),
            ]
        );
        assert!(!arbiter.is_busy());
        assert_eq!(arbiter.pending(), 0);
    }

    #[test]
    fn blocking_call_waits_for_in_flight_transfer() {
        let (arbiter, mock) = make_arbiter();
        arbiter.write_async(TransferMode::Dma, leak(&[1]), None).unwrap();

        std::thread::scope(|s| {
            let writer = s.spawn(|| arbiter.write_blocking(&[2]));

            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(!writer.is_finished());
            assert_eq!(mock.calls().len(), 1);

            arbiter.on_transfer_complete();
            writer.join().unwrap().unwrap();
        });

        assert_eq!(
            mock.calls(),
            [
                Call::StartWrite(TransferMode::Dma, std::vec![1]),
                Call::Write(std::vec![2]),
            ]
        );
        assert!(!arbiter.is_busy());
    }

    #[cfg(not(any(feature = "contract-trap", feature = "contract-reset")))]
    #[test]
    fn sleep_drops_queue_and_powers_down() {
        let (arbiter, mock) = make_arbiter();

        arbiter.sleep().unwrap();
        assert!(!arbiter.is_busy());
        assert_eq!(arbiter.pending(), 0);
        assert_eq!(mock.calls(), [Call::Sleep]);

        assert_eq!(
            arbiter.write_async(TransferMode::Dma, leak(&[1]), None),
            Err(SpiError::NotInitialized)
        );

        arbiter.init().unwrap();
        arbiter.write_async(TransferMode::Dma, leak(&[1]), None).unwrap();
        assert_eq!(mock.starts(), 1);
    }

    #[test]
    fn failed_transport_sleep_still_leaves_arbiter_idle() {
        let (arbiter, mock) = make_arbiter();
        arbiter.write_async(TransferMode::Dma, leak(&[1]), None).unwrap();
        arbiter.write_async(TransferMode::Dma, leak(&[2]), None).unwrap();
        mock.state().fail_sleep = true;

        std::thread::scope(|s| {
            let sleeper = s.spawn(|| arbiter.sleep());

            // Both requests still run before the transport powers down
            arbiter.on_transfer_complete();
            arbiter.on_transfer_complete();

            assert_eq!(
                sleeper.join().unwrap(),
                Err(SpiError::Transport(MockError(ErrorKind::Other)))
            );
        });

        assert!(!arbiter.is_busy());
        assert_eq!(arbiter.pending(), 0);
        assert_eq!(mock.starts(), 2);
        assert_eq!(mock.calls().last(), Some(&Call::Sleep));
    }

    #[test]
    fn request_queued_during_blocking_call_starts_when_it_ends() {
        static ARBITER: OnceLock<SpiArbiter<MockTransport>> = OnceLock::new();
        static DONE: Mutex<Vec<u8>> = Mutex::new(Vec::new());

        fn queue_behind() {
            let arbiter = ARBITER.get().unwrap();
            arbiter
                .write_async(TransferMode::Dma, leak(&[2]), Some(done))
                .unwrap();
            assert_eq!(arbiter.pending(), 1);
        }
        fn done(c: Completed) {
            if let Some(tx) = c.tx() {
                DONE.lock().unwrap().extend_from_slice(tx);
            }
        }

        let mock = MockTransport::initialized();
        mock.state().during_write = Some(queue_behind);
        let arbiter = ARBITER.get_or_init(|| SpiArbiter::new(mock.clone()));

        arbiter.write_blocking(&[1]).unwrap();

        assert_eq!(
            mock.calls(),
            [
                Call::Write(std::vec![1]),
                Call::StartWrite(TransferMode::Dma, std::vec![2]),
            ]
        );
        assert!(arbiter.is_busy());

        arbiter.on_transfer_complete();
        assert_eq!(*DONE.lock().unwrap(), [2]);
        assert!(!arbiter.is_busy());
        assert_eq!(arbiter.pending(), 0);
    }

    #[cfg(not(any(feature = "contract-trap", feature = "contract-reset")))]
    #[test]
    fn spurious_completion_is_absorbed() {
        let (arbiter, mock) = make_arbiter();
        arbiter.on_transfer_complete();
        assert!(!arbiter.is_busy());
        assert!(mock.calls().is_empty());
    }

    #[cfg(not(any(feature = "contract-trap", feature = "contract-reset")))]
    #[test]
    fn completion_during_blocking_call_leaves_queue_alone() {
        static ARBITER: OnceLock<SpiArbiter<MockTransport>> = OnceLock::new();
        static DONE: Mutex<usize> = Mutex::new(0);

        fn queue_then_interrupt() {
            let arbiter = ARBITER.get().unwrap();
            arbiter
                .write_async(TransferMode::Dma, leak(&[2]), Some(done))
                .unwrap();
            arbiter.write_async(TransferMode::Dma, leak(&[3]), None).unwrap();
            arbiter.on_transfer_complete();

            // Nothing was popped, started or released
            assert_eq!(arbiter.pending(), 2);
            assert!(arbiter.is_busy());
        }
        fn done(_: Completed) {
            *DONE.lock().unwrap() += 1;
        }

        let mock = MockTransport::initialized();
        mock.state().during_write = Some(queue_then_interrupt);
        let arbiter = ARBITER.get_or_init(|| SpiArbiter::new(mock.clone()));

        arbiter.write_blocking(&[1]).unwrap();
        assert_eq!(*DONE.lock().unwrap(), 0);
        assert_eq!(
            mock.calls(),
            [
                Call::Write(std::vec![1]),
                Call::StartWrite(TransferMode::Dma, std::vec![2]),
            ]
        );

        arbiter.on_transfer_complete();
        assert_eq!(*DONE.lock().unwrap(), 1);
        assert_eq!(mock.calls().last(), Some(&Call::StartWrite(TransferMode::Dma, std::vec![3])));
        arbiter.on_transfer_complete();
        assert!(!arbiter.is_busy());
    }

    #[test]
    fn arbiter_is_a_drop_in_spi_bus() {
        fn send_frame<B: SpiBus>(bus: &mut B, frame: &[u8]) -> core::result::Result<(), B::Error> {
            bus.write(frame)?;
            bus.flush()
        }

        let (arbiter, mock) = make_arbiter();
        let mut bus = &arbiter;

        send_frame(&mut bus, &[0x0C, 0x01]).unwrap();
        send_frame(&mut bus, &[]).unwrap();
        let mut words = [0x8F, 0x00];
        bus.transfer_in_place(&mut words).unwrap();

        assert_eq!(
            mock.calls(),
            [Call::Write(std::vec![0x0C, 0x01]), Call::Transfer(std::vec![0x8F, 0x00])]
        );
        assert!(!arbiter.is_busy());
    }
}
