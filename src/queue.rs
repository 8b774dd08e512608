//! # Frame Queue
//!
//! Bounded FIFO of completed frames. The queue itself does no locking; it
//! lives inside [`crate::context::SharedContext`] next to the recording state
//! so both are guarded by the same mutex.

use std::collections::VecDeque;

use crate::frame::Frame;

pub struct FrameQueue {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue at the back. Hands the frame back when the queue is at its high-water mark.
    pub fn push(&mut self, frame: Frame) -> Result<(), Frame> {
        if self.is_full() {
            return Err(frame);
        }
        self.frames.push_back(frame);
        Ok(())
    }

    pub fn try_pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every queued frame, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let stale = self.frames.len();
        self.frames.clear();
        stale
    }
}
