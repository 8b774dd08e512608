//! # Shared Acquisition Context
//!
//! The recording state and the frame queue live behind a single mutex so that
//! a state change and a queue operation can never interleave. Two condition
//! variables replace polling:
//! - `frame_ready`: signalled on push and on every state change (wakes the writer)
//! - `space_ready`: signalled on pop and on every state change (wakes a blocked sampler)
//!
//! The context is shared as `Arc<SharedContext>` between the node loop and the
//! writer thread of the current session.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::StartError;
use crate::frame::Frame;
use crate::queue::FrameQueue;

/// Snapshot of the recording state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingState {
    pub active: bool,
    pub filename: Option<String>,
    /// Bumped on every successful start
    pub session: u64,
}

/// Result of handing a completed frame to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Session ended while the frame was being filled (or while waiting for space)
    Discarded,
    /// Queue stayed full for the whole push timeout
    Dropped,
}

/// What the writer gets back when it asks for work
#[derive(Debug)]
pub enum WriterPoll {
    Frame(Frame),
    /// Session is over and everything it queued has been handed out
    Finished,
}

struct Shared {
    state: RecordingState,
    queue: FrameQueue,
}

pub struct SharedContext {
    shared: Mutex<Shared>,
    frame_ready: Condvar,
    space_ready: Condvar,
}

impl SharedContext {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            shared: Mutex::new(Shared {
                state: RecordingState::default(),
                queue: FrameQueue::new(queue_capacity),
            }),
            frame_ready: Condvar::new(),
            space_ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // Neither side leaves the state half-updated, so a poisoned lock is still usable.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_state_change(&self) {
        self.frame_ready.notify_all();
        self.space_ready.notify_all();
    }

    pub fn state(&self) -> RecordingState {
        self.lock().state.clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().state.active
    }

    /// Number of the running session, `None` when idle
    pub fn active_session(&self) -> Option<u64> {
        let shared = self.lock();
        shared.state.active.then_some(shared.state.session)
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Idle -> Recording. Clears frames left over from an earlier session.
    pub fn begin_session(&self, filename: &str) -> Result<u64, StartError> {
        let mut shared = self.lock();
        if shared.state.active {
            return Err(StartError::AlreadyActive);
        }

        let stale = shared.queue.clear();
        if stale > 0 {
            log::warn!("Discarded {} stale frames from a previous session", stale);
        }

        shared.state.active = true;
        shared.state.filename = Some(filename.to_string());
        shared.state.session += 1;
        let session = shared.state.session;
        drop(shared);

        self.notify_state_change();
        Ok(session)
    }

    /// Recording -> Idle. Returns `false` when nothing was active.
    pub fn end_session(&self) -> bool {
        let mut shared = self.lock();
        if !shared.state.active {
            return false;
        }
        shared.state.active = false;
        if !shared.queue.is_empty() {
            log::debug!("{} frames left for the writer", shared.queue.len());
        }
        drop(shared);

        self.notify_state_change();
        true
    }

    /// Force `session` idle after a fatal writer error. No-op if a newer session owns the state.
    pub fn fail_session(&self, session: u64) -> bool {
        let mut shared = self.lock();
        if shared.state.session != session || !shared.state.active {
            return false;
        }
        shared.state.active = false;
        drop(shared);

        self.notify_state_change();
        true
    }

    /// Enqueue a frame filled during `session`, blocking while the queue is full.
    ///
    /// The session check and the enqueue happen under one lock acquisition, so
    /// a stop (or a stop and restart) processed while the frame was filling
    /// always suppresses it.
    pub fn push_frame(&self, session: u64, frame: Frame, timeout: Duration) -> PushOutcome {
        // `None` means the timeout is too large to represent: wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut shared = self.lock();
        let mut frame = frame;

        loop {
            if !shared.state.active || shared.state.session != session {
                return PushOutcome::Discarded;
            }

            match shared.queue.push(frame) {
                Ok(()) => {
                    drop(shared);
                    self.frame_ready.notify_one();
                    return PushOutcome::Queued;
                }
                Err(rejected) => frame = rejected,
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return PushOutcome::Dropped;
                    }
                    deadline - now
                }
                None => timeout,
            };
            shared = self
                .space_ready
                .wait_timeout(shared, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Enqueue into whatever session is current
    #[cfg(test)]
    pub fn submit_frame(&self, frame: Frame, timeout: Duration) -> PushOutcome {
        let session = self.lock().state.session;
        self.push_frame(session, frame, timeout)
    }

    /// Next frame for the writer of `session`, waiting up to `poll` between re-checks.
    pub fn next_frame(&self, session: u64, poll: Duration) -> WriterPoll {
        let mut shared = self.lock();
        loop {
            if shared.state.session != session {
                // Superseded: the frames in the queue belong to someone else.
                return WriterPoll::Finished;
            }

            if let Some(frame) = shared.queue.try_pop() {
                drop(shared);
                self.space_ready.notify_one();
                return WriterPoll::Frame(frame);
            }

            if !shared.state.active {
                return WriterPoll::Finished;
            }

            shared = self
                .frame_ready
                .wait_timeout(shared, poll)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(ts: u64) -> Frame {
        Frame::from_rows(&[(ts, vec![1, 2, 3, 4])])
    }

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn test_begin_and_end_session() {
        let ctx = SharedContext::new(4);
        assert!(!ctx.is_active());

        let session = ctx.begin_session("run1.dat").unwrap();
        assert_eq!(session, 1);
        let state = ctx.state();
        assert!(state.active);
        assert_eq!(state.filename.as_deref(), Some("run1.dat"));

        assert_eq!(ctx.begin_session("run2.dat"), Err(StartError::AlreadyActive));
        assert!(ctx.end_session());
        assert!(!ctx.end_session());
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_frames_discarded_when_inactive() {
        let ctx = SharedContext::new(4);
        assert_eq!(ctx.submit_frame(frame(1), POLL), PushOutcome::Discarded);
        assert_eq!(ctx.queue_len(), 0);
    }

    #[test]
    fn test_begin_session_clears_stale_frames() {
        let ctx = SharedContext::new(8);
        ctx.begin_session("a.dat").unwrap();
        for ts in 0..3 {
            assert_eq!(ctx.submit_frame(frame(ts), POLL), PushOutcome::Queued);
        }
        ctx.end_session();
        assert_eq!(ctx.queue_len(), 3);

        ctx.begin_session("b.dat").unwrap();
        assert_eq!(ctx.queue_len(), 0);
    }

    #[test]
    fn test_full_queue_times_out() {
        let ctx = SharedContext::new(1);
        ctx.begin_session("a.dat").unwrap();
        assert_eq!(ctx.submit_frame(frame(1), POLL), PushOutcome::Queued);

        let started = Instant::now();
        assert_eq!(
            ctx.submit_frame(frame(2), Duration::from_millis(30)),
            PushOutcome::Dropped
        );
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(ctx.queue_len(), 1);
    }

    #[test]
    fn test_blocked_push_resumes_when_writer_pops() {
        let ctx = Arc::new(SharedContext::new(1));
        let session = ctx.begin_session("a.dat").unwrap();
        assert_eq!(ctx.submit_frame(frame(1), POLL), PushOutcome::Queued);

        let consumer = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ctx.next_frame(session, POLL)
            })
        };

        assert_eq!(
            ctx.submit_frame(frame(2), Duration::from_secs(5)),
            PushOutcome::Queued
        );
        match consumer.join().unwrap() {
            WriterPoll::Frame(f) => assert_eq!(f.sample(0).unwrap().timestamp_ms, 1),
            WriterPoll::Finished => panic!("expected a frame"),
        }
    }

    #[test]
    fn test_blocked_push_discarded_on_stop() {
        let ctx = Arc::new(SharedContext::new(1));
        ctx.begin_session("a.dat").unwrap();
        assert_eq!(ctx.submit_frame(frame(1), POLL), PushOutcome::Queued);

        let stopper = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ctx.end_session();
            })
        };

        assert_eq!(
            ctx.submit_frame(frame(2), Duration::from_secs(5)),
            PushOutcome::Discarded
        );
        stopper.join().unwrap();
    }

    #[test]
    fn test_huge_push_timeout_does_not_overflow() {
        let ctx = Arc::new(SharedContext::new(1));
        let session = ctx.begin_session("a.dat").unwrap();
        assert_eq!(ctx.push_frame(session, frame(1), Duration::MAX), PushOutcome::Queued);

        let stopper = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ctx.end_session();
            })
        };

        assert_eq!(
            ctx.push_frame(session, frame(2), Duration::MAX),
            PushOutcome::Discarded
        );
        stopper.join().unwrap();
    }

    #[test]
    fn test_frame_from_previous_session_is_discarded() {
        let ctx = SharedContext::new(4);
        let old = ctx.begin_session("a.dat").unwrap();
        ctx.end_session();
        let current = ctx.begin_session("b.dat").unwrap();
        assert_eq!(ctx.active_session(), Some(current));

        assert_eq!(ctx.push_frame(old, frame(1), POLL), PushOutcome::Discarded);
        assert_eq!(ctx.queue_len(), 0);
        assert_eq!(ctx.push_frame(current, frame(2), POLL), PushOutcome::Queued);

        ctx.end_session();
        assert_eq!(ctx.active_session(), None);
    }

    #[test]
    fn test_writer_drains_before_finishing() {
        let ctx = SharedContext::new(4);
        let session = ctx.begin_session("a.dat").unwrap();
        ctx.submit_frame(frame(1), POLL);
        ctx.submit_frame(frame(2), POLL);
        ctx.end_session();

        assert!(matches!(ctx.next_frame(session, POLL), WriterPoll::Frame(_)));
        assert!(matches!(ctx.next_frame(session, POLL), WriterPoll::Frame(_)));
        assert!(matches!(ctx.next_frame(session, POLL), WriterPoll::Finished));
        assert_eq!(ctx.queue_len(), 0);
    }

    #[test]
    fn test_superseded_writer_leaves_queue_alone() {
        let ctx = SharedContext::new(4);
        let old = ctx.begin_session("a.dat").unwrap();
        ctx.end_session();
        ctx.begin_session("b.dat").unwrap();
        ctx.submit_frame(frame(1), POLL);

        assert!(matches!(ctx.next_frame(old, POLL), WriterPoll::Finished));
        assert_eq!(ctx.queue_len(), 1);
    }

    #[test]
    fn test_fail_session_ignores_other_sessions() {
        let ctx = SharedContext::new(4);
        let first = ctx.begin_session("a.dat").unwrap();
        ctx.end_session();
        ctx.begin_session("b.dat").unwrap();

        assert!(!ctx.fail_session(first));
        assert!(ctx.is_active());
        assert!(ctx.fail_session(first + 1));
        assert!(!ctx.is_active());
    }
}
