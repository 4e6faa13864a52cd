//! Lock-free Block Ring
//!
//! SPSC handoff of fixed-size interleaved blocks between a hardware callback
//! and the processing thread, built on `rtrb`.
//!
//! The callback side only ever uses the `try_*` operations, which never block
//! and never allocate: a block either fits (or is available) in full, or the
//! call fails and nothing moves. The processing side uses the `*_wait`
//! operations, which poll with a short sleep between attempts.
//!
//! Like [`crate::BufferQueue`], the ring has a one-way "done" flag: once set,
//! pushes are dropped and pops drain what is left, then fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtrb::{Consumer, Producer, RingBuffer};

/// Sleep between attempts in the waiting operations
pub const POLL_INTERVAL: Duration = Duration::from_micros(250);

/// Why a non-blocking ring operation moved nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Not enough free space (push) or queued samples (pop) for a whole block
    WouldBlock,
    /// The ring was marked done; no more blocks will be accepted or produced
    Done,
    /// The block can never fit: it is larger than the ring's capacity
    TooLarge,
}

#[derive(Debug, Default)]
struct RingShared {
    done: AtomicBool,
}

impl RingShared {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn set_done(&self) {
        self.done.store(true, Ordering::Release);
    }
}

/// Create a ring holding `capacity` samples
///
/// Size it to a whole number of blocks: `queue_blocks × frames × channels`.
pub fn block_ring(capacity: usize) -> (BlockProducer, BlockConsumer) {
    let (producer, consumer) = RingBuffer::<f32>::new(capacity.max(1));
    let shared = Arc::new(RingShared::default());
    (
        BlockProducer {
            producer,
            shared: Arc::clone(&shared),
        },
        BlockConsumer { consumer, shared },
    )
}

/// Cheap handle that can mark a ring done from any thread
#[derive(Debug, Clone)]
pub struct RingCloser {
    shared: Arc<RingShared>,
}

impl RingCloser {
    /// Idempotent
    pub fn set_done(&self) {
        self.shared.set_done();
    }

    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }
}

/// Writing half of a block ring
pub struct BlockProducer {
    producer: Producer<f32>,
    shared: Arc<RingShared>,
}

impl BlockProducer {
    /// Copy all of `block` into the ring, or nothing
    ///
    /// # Real-time Safety
    /// No allocations, no locks, no syscalls.
    #[inline]
    pub fn try_push(&mut self, block: &[f32]) -> Result<(), RingError> {
        if self.shared.is_done() {
            return Err(RingError::Done);
        }
        if block.len() > self.producer.buffer().capacity() {
            return Err(RingError::TooLarge);
        }

        let mut chunk = self
            .producer
            .write_chunk(block.len())
            .map_err(|_| RingError::WouldBlock)?;

        // Rust pattern: the chunk may wrap around, so it exposes two slices
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&block[..split]);
        second.copy_from_slice(&block[split..]);
        chunk.commit_all();
        Ok(())
    }

    /// Push `block`, waiting for room
    ///
    /// Returns `false` if the block was dropped because the ring is done (or
    /// can never hold it).
    pub fn push_wait(&mut self, block: &[f32]) -> bool {
        loop {
            match self.try_push(block) {
                Ok(()) => return true,
                Err(RingError::WouldBlock) => thread::sleep(POLL_INTERVAL),
                Err(RingError::Done | RingError::TooLarge) => return false,
            }
        }
    }

    pub fn closer(&self) -> RingCloser {
        RingCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn set_done(&self) {
        self.shared.set_done();
    }

    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }

    /// Free space in samples
    pub fn free_slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Reading half of a block ring
pub struct BlockConsumer {
    consumer: Consumer<f32>,
    shared: Arc<RingShared>,
}

impl BlockConsumer {
    /// Fill all of `out` from the ring, or leave it untouched
    ///
    /// After the ring is done, remaining whole blocks still drain; only an
    /// empty (or partial) remainder reports [`RingError::Done`].
    ///
    /// # Real-time Safety
    /// No allocations, no locks, no syscalls.
    #[inline]
    pub fn try_pop_into(&mut self, out: &mut [f32]) -> Result<(), RingError> {
        if out.len() > self.consumer.buffer().capacity() {
            return Err(RingError::TooLarge);
        }

        // Read the flag first: anything pushed before `set_done` is visible
        let done = self.shared.is_done();
        let chunk = match self.consumer.read_chunk(out.len()) {
            Ok(chunk) => chunk,
            Err(_) if done => return Err(RingError::Done),
            Err(_) => return Err(RingError::WouldBlock),
        };

        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..].copy_from_slice(second);
        chunk.commit_all();
        Ok(())
    }

    /// Pop a whole block into `out`, waiting for one to arrive
    ///
    /// Returns `false` only once the ring is done and drained: the normal
    /// end-of-stream signal for the processing loop.
    pub fn pop_wait_into(&mut self, out: &mut [f32]) -> bool {
        loop {
            match self.try_pop_into(out) {
                Ok(()) => return true,
                Err(RingError::WouldBlock) => thread::sleep(POLL_INTERVAL),
                Err(RingError::Done | RingError::TooLarge) => return false,
            }
        }
    }

    pub fn closer(&self) -> RingCloser {
        RingCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn set_done(&self) {
        self.shared.set_done();
    }

    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }

    /// Queued samples
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_blocks() {
        let (mut tx, mut rx) = block_ring(12);
        tx.try_push(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        tx.try_push(&[2.0, 2.0, 2.0, 2.0]).unwrap();
        assert_eq!(rx.available(), 8);

        let mut out = [0.0; 4];
        rx.try_pop_into(&mut out).unwrap();
        assert_eq!(out, [1.0; 4]);
        rx.try_pop_into(&mut out).unwrap();
        assert_eq!(out, [2.0; 4]);
        assert_eq!(rx.try_pop_into(&mut out), Err(RingError::WouldBlock));
    }

    #[test]
    fn test_push_is_all_or_nothing() {
        let (mut tx, mut rx) = block_ring(6);
        tx.try_push(&[1.0; 4]).unwrap();

        // Only two slots left: nothing of the next block goes in
        assert_eq!(tx.try_push(&[2.0; 4]), Err(RingError::WouldBlock));
        assert_eq!(tx.free_slots(), 2);
        assert_eq!(rx.available(), 4);
    }

    #[test]
    fn test_pop_is_all_or_nothing() {
        let (mut tx, mut rx) = block_ring(8);
        tx.try_push(&[0.5; 3]).unwrap();

        let mut out = [9.0; 4];
        assert_eq!(rx.try_pop_into(&mut out), Err(RingError::WouldBlock));
        assert_eq!(out, [9.0; 4]);
        assert_eq!(rx.available(), 3);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let (mut tx, mut rx) = block_ring(6);
        let mut out = [0.0; 4];

        for round in 0..10 {
            let block: Vec<f32> = (0..4).map(|i| (round * 4 + i) as f32).collect();
            tx.try_push(&block).unwrap();
            rx.try_pop_into(&mut out).unwrap();
            assert_eq!(out.as_slice(), block.as_slice());
        }
    }

    #[test]
    fn test_too_large_block() {
        let (mut tx, mut rx) = block_ring(4);
        assert_eq!(tx.try_push(&[0.0; 5]), Err(RingError::TooLarge));
        assert!(!tx.push_wait(&[0.0; 5]));

        let mut out = [0.0; 5];
        assert_eq!(rx.try_pop_into(&mut out), Err(RingError::TooLarge));
    }

    #[test]
    fn test_done_drains_then_fails() {
        let (mut tx, mut rx) = block_ring(8);
        tx.try_push(&[1.0; 4]).unwrap();
        rx.closer().set_done();
        rx.set_done();

        assert!(tx.is_done());
        assert_eq!(tx.try_push(&[2.0; 4]), Err(RingError::Done));
        assert!(!tx.push_wait(&[2.0; 4]));

        let mut out = [0.0; 4];
        assert!(rx.pop_wait_into(&mut out));
        assert_eq!(out, [1.0; 4]);
        assert!(!rx.pop_wait_into(&mut out));
        assert_eq!(rx.try_pop_into(&mut out), Err(RingError::Done));
    }

    #[test]
    fn test_done_releases_waiting_consumer() {
        let (tx, mut rx) = block_ring(8);
        let closer = tx.closer();

        let consumer = thread::spawn(move || {
            let mut out = [0.0; 4];
            rx.pop_wait_into(&mut out)
        });

        thread::sleep(Duration::from_millis(20));
        closer.set_done();
        assert!(!consumer.join().unwrap());
    }

    #[test]
    fn test_waiting_handoff_across_threads() {
        let (mut tx, mut rx) = block_ring(8);

        let producer = thread::spawn(move || {
            for i in 0..100 {
                assert!(tx.push_wait(&[i as f32; 4]));
            }
            tx.set_done();
        });

        let mut out = [0.0; 4];
        let mut received = Vec::new();
        while rx.pop_wait_into(&mut out) {
            received.push(out[0]);
            assert!(out.iter().all(|&x| x == out[0]));
        }
        producer.join().unwrap();

        assert_eq!(received, (0..100).map(|i| i as f32).collect::<Vec<_>>());
    }
}
