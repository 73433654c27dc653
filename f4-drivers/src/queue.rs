//! Interrupt-safe single-consumer ring buffer.
//!
//! Holds pending work handed from any number of producer contexts (thread
//! mode, interrupts of any priority) to one fixed consumer, normally a
//! peripheral's completion interrupt.
//!
//! # Concurrency contract
//!
//! - [`push()`](IsrQueue::push) and [`clear()`](IsrQueue::clear) may be
//!   called from any context. They run under the queue's [`SpinLock`]
//!   (interrupts masked plus a test-and-set flag), since the underlying
//!   Lamport ring is only safe for one producer at a time.
//! - [`pop()`](IsrQueue::pop), [`peek()`](IsrQueue::peek) and
//!   [`head_mut()`](IsrQueue::head_mut) belong to the single consumer and
//!   take no lock. The caller guarantees that no two consumer calls overlap.
//! - `clear()` also removes items, so it must not overlap a consumer call.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::sync::SpinLock;

/// Fixed-capacity multi-producer single-consumer queue.
///
/// The usable capacity is `N - 1`: one slot is kept empty so that
/// `head == tail` always means empty and `head + 1 == tail` always means full.
pub struct IsrQueue<T, const N: usize> {
    buffer: [UnsafeCell<MaybeUninit<T>>; N],
    /// Write position (advanced by producers, under `producers`).
    head: AtomicUsize,
    /// Read position (advanced by the consumer only).
    tail: AtomicUsize,
    producers: SpinLock,
}

// SAFETY: values cross contexts, hence `T: Send`. Producers are serialized by
// `producers`, the consumer is unique by contract, and head/tail use
// acquire/release ordering so slot contents are visible before the index moves.
unsafe impl<T: Send, const N: usize> Sync for IsrQueue<T, N> {}
unsafe impl<T: Send, const N: usize> Send for IsrQueue<T, N> {}

impl<T, const N: usize> IsrQueue<T, N> {
    /// Usable capacity.
    pub const CAPACITY: usize = N - 1;

    /// Create an empty queue. `N` must be at least 2.
    pub const fn new() -> Self {
        assert!(N >= 2, "queue must have at least 2 slots (1 usable)");

        IsrQueue {
            // SAFETY: an array of uninitialized MaybeUninit<T> is always valid.
            buffer: unsafe {
                MaybeUninit::<[UnsafeCell<MaybeUninit<T>>; N]>::uninit().assume_init()
            },
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            producers: SpinLock::new(),
        }
    }

    /// Append `val` at the tail.
    ///
    /// Returns `Err(val)` if the queue is full, handing ownership back.
    pub fn push(&self, val: T) -> Result<(), T> {
        self.producers.lock(|| {
            let head = self.head.load(Ordering::Relaxed);
            let next_head = (head + 1) % N;

            if next_head == self.tail.load(Ordering::Acquire) {
                return Err(val);
            }

            // SAFETY: producers are serialized by the lock, and `next_head != tail`
            // means the consumer is not reading this slot.
            unsafe {
                (*self.buffer[head].get()).write(val);
            }

            self.head.store(next_head, Ordering::Release);
            Ok(())
        })
    }

    /// Remove the head item (consumer side).
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);

        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: sole consumer, and `tail != head` means the slot is initialized.
        let val = unsafe { (*self.buffer[tail].get()).assume_init_read() };

        self.tail.store((tail + 1) % N, Ordering::Release);
        Some(val)
    }

    /// Borrow the head item without removing it (consumer side).
    pub fn peek(&self) -> Option<&T> {
        let tail = self.tail.load(Ordering::Relaxed);

        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: sole consumer; producers never write the slot at `tail`
        // while it is occupied.
        Some(unsafe { (*self.buffer[tail].get()).assume_init_ref() })
    }

    /// Mutably borrow the head item without removing it (consumer side).
    ///
    /// # Safety
    ///
    /// The caller must be the queue's only consumer, and must not hold any
    /// other reference obtained from [`peek()`](Self::peek) or `head_mut()`
    /// while the returned one is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn head_mut(&self) -> Option<&mut T> {
        let tail = self.tail.load(Ordering::Relaxed);

        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        Some(unsafe { (*self.buffer[tail].get()).assume_init_mut() })
    }

    /// Drop every queued item.
    ///
    /// Takes the producer lock so no push interleaves; must not overlap a
    /// consumer call.
    pub fn clear(&self) {
        self.producers.lock(|| while self.pop().is_some() {});
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + 1) % N == tail
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + N - tail) % N
    }
}

impl<T, const N: usize> Default for IsrQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for IsrQueue<T, N> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
