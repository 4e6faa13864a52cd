//! Blocking Block Queue
//!
//! Bounded FIFO handoff of whole audio blocks between two threads, with
//! backpressure on the producer and a one-way "done" transition that wakes
//! everyone. Used on the offline batch path; the live hardware boundary uses
//! the lock-free [`crate::ring`] instead.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Ordered samples of one block: `frames × channels` interleaved
pub type AudioBlock = Vec<f32>;

struct State<T> {
    queue: VecDeque<T>,
    /// Lives under the same lock as the queue so a waiter can never miss it
    done: bool,
}

/// Bounded, blocking, thread-safe FIFO
///
/// Intended for one producer thread and one consumer thread.
pub struct BufferQueue<T = AudioBlock> {
    state: Mutex<State<T>>,
    has_data: Condvar,
    has_space: Condvar,
    capacity: usize,
}

impl<T> BufferQueue<T> {
    /// Empty queue holding at most `capacity` blocks (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                done: false,
            }),
            has_data: Condvar::new(),
            has_space: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a block, waiting for room
    ///
    /// After [`set_done`](Self::set_done) the block is dropped and this
    /// returns immediately.
    pub fn push(&self, block: T) {
        let mut state = self.state.lock();
        self.has_space
            .wait_while(&mut state, |s| !s.done && s.queue.len() >= self.capacity);

        if state.done {
            return;
        }

        state.queue.push_back(block);
        drop(state);
        self.has_data.notify_one();
    }

    /// Dequeue the oldest block, waiting for one to arrive
    ///
    /// Returns `None` only once the queue is both empty and done, which is
    /// the normal end-of-stream signal for a consumer loop.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        self.has_data
            .wait_while(&mut state, |s| !s.done && s.queue.is_empty());

        let block = state.queue.pop_front()?;
        drop(state);
        self.has_space.notify_one();
        Some(block)
    }

    /// Mark the queue finished and wake every waiter (idempotent)
    pub fn set_done(&self) {
        self.state.lock().done = true;
        self.has_data.notify_all();
        self.has_space.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
