//! # Sampler
//!
//! Fills one frame per call at a fixed sample interval, reading every channel
//! in order (reference first) for each sample.
//!
//! The recording state is checked twice per frame: before filling (an idle
//! node returns at once, otherwise the session number is captured) and again,
//! atomically with the enqueue, once the frame is complete. A stop that lands
//! mid-frame, even one followed by a new start, therefore discards that frame
//! instead of leaking it into another session.
//!
//! Timing: each sample sleeps `interval - elapsed`. A sample whose reads take
//! longer than the interval slips; the frame is always completed.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::context::{PushOutcome, SharedContext};
use crate::frame::{Frame, FrameBuffer};
use crate::hal::{AnalogSource, Clock};

/// What one sampler tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not recording, nothing sampled
    Idle,
    Queued,
    /// Recording stopped while the frame was filling
    Discarded,
    /// Queue stayed full past the push timeout
    Dropped,
}

impl From<PushOutcome> for TickOutcome {
    fn from(outcome: PushOutcome) -> Self {
        match outcome {
            PushOutcome::Queued => TickOutcome::Queued,
            PushOutcome::Discarded => TickOutcome::Discarded,
            PushOutcome::Dropped => TickOutcome::Dropped,
        }
    }
}

pub struct Sampler<A, C> {
    ctx: Arc<SharedContext>,
    source: A,
    clock: C,
    buffer: FrameBuffer,
    interval: Duration,
    push_timeout: Duration,
}

impl<A: AnalogSource, C: Clock> Sampler<A, C> {
    pub fn new(
        ctx: Arc<SharedContext>,
        source: A,
        clock: C,
        samples_per_frame: usize,
        channel_count: usize,
        interval: Duration,
        push_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            source,
            clock,
            buffer: FrameBuffer::new(samples_per_frame, channel_count),
            interval,
            push_timeout,
        }
    }

    #[cfg(test)]
    pub fn context(&self) -> &Arc<SharedContext> {
        &self.ctx
    }

    /// Fill one frame, or return `None` straight away when not recording.
    /// The frame comes back tagged with the session it was filled for.
    pub fn sample_frame(&mut self) -> Option<(u64, Frame)> {
        let session = self.ctx.active_session()?;

        let channel_count = self.buffer.channel_count();
        for idx in 0..self.buffer.samples_per_frame() {
            let started = Instant::now();
            let (timestamp, values) = self.buffer.slot_mut(idx);
            *timestamp = self.clock.now_ms();
            for (channel, value) in values.iter_mut().enumerate().take(channel_count) {
                *value = self.source.read(channel);
            }

            if let Some(remaining) = self.interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }

        Some((session, self.buffer.snapshot()))
    }

    /// Sample one frame and hand it to the queue
    pub fn run_once(&mut self) -> TickOutcome {
        let Some((session, frame)) = self.sample_frame() else {
            return TickOutcome::Idle;
        };

        let outcome = TickOutcome::from(self.ctx.push_frame(session, frame, self.push_timeout));
        match outcome {
            TickOutcome::Queued => {
                log::debug!(
                    "Completed and queued a {}-sample frame",
                    self.buffer.samples_per_frame()
                );
            }
            TickOutcome::Discarded => log::info!("Recording stopped during frame collection"),
            TickOutcome::Dropped => log::warn!(
                "Frame queue full for {:?}, dropping newest frame",
                self.push_timeout
            ),
            TickOutcome::Idle => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MonotonicClock;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Returns `channel * 1000 + read count`
    struct Counting {
        reads: i32,
    }

    impl AnalogSource for Counting {
        fn read(&mut self, channel: usize) -> i32 {
            self.reads += 1;
            channel as i32 * 1000 + self.reads
        }
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0
        }
    }

    /// Stops the session from inside the read loop, optionally starting a new one
    struct StopAfter {
        ctx: Arc<SharedContext>,
        remaining: Rc<Cell<usize>>,
        restart: bool,
    }

    impl AnalogSource for StopAfter {
        fn read(&mut self, _channel: usize) -> i32 {
            let left = self.remaining.get();
            if left == 1 {
                self.ctx.end_session();
                if self.restart {
                    self.ctx.begin_session("next.dat").unwrap();
                }
            }
            self.remaining.set(left.saturating_sub(1));
            0
        }
    }

    fn sampler<A: AnalogSource>(
        ctx: &Arc<SharedContext>,
        source: A,
        samples: usize,
    ) -> Sampler<A, FixedClock> {
        Sampler::new(
            Arc::clone(ctx),
            source,
            FixedClock(7),
            samples,
            4,
            Duration::from_millis(1),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_idle_tick_does_nothing() {
        let ctx = Arc::new(SharedContext::new(4));
        let mut sampler = sampler(&ctx, Counting { reads: 0 }, 3);

        assert!(sampler.sample_frame().is_none());
        assert_eq!(sampler.run_once(), TickOutcome::Idle);
        assert_eq!(sampler.source.reads, 0);
    }

    #[test]
    fn test_channels_read_in_order() {
        let ctx = Arc::new(SharedContext::new(4));
        ctx.begin_session("run1.dat").unwrap();
        let mut sampler = sampler(&ctx, Counting { reads: 0 }, 2);

        let (session, frame) = sampler.sample_frame().unwrap();
        assert_eq!(session, 1);
        assert_eq!(frame.len(), 2);
        let first = frame.sample(0).unwrap();
        assert_eq!(first.timestamp_ms, 7);
        assert_eq!(first.values, &[1, 1002, 2003, 3004]);
        let second = frame.sample(1).unwrap();
        assert_eq!(second.values, &[5, 1006, 2007, 3008]);
    }

    #[test]
    fn test_completed_frame_is_queued() {
        let ctx = Arc::new(SharedContext::new(4));
        ctx.begin_session("run1.dat").unwrap();
        let mut sampler = sampler(&ctx, Counting { reads: 0 }, 3);

        assert_eq!(sampler.run_once(), TickOutcome::Queued);
        assert_eq!(sampler.run_once(), TickOutcome::Queued);
        assert_eq!(ctx.queue_len(), 2);
    }

    #[test]
    fn test_stop_mid_frame_discards_frame() {
        let ctx = Arc::new(SharedContext::new(4));
        ctx.begin_session("run1.dat").unwrap();
        let remaining = Rc::new(Cell::new(6));
        let source = StopAfter {
            ctx: Arc::clone(&ctx),
            remaining: Rc::clone(&remaining),
            restart: false,
        };
        let mut sampler = sampler(&ctx, source, 5);

        assert_eq!(sampler.run_once(), TickOutcome::Discarded);
        // The frame still ran to completion: 5 samples x 4 channels
        assert_eq!(remaining.get(), 0);
        assert_eq!(ctx.queue_len(), 0);
        assert_eq!(sampler.run_once(), TickOutcome::Idle);
    }

    #[test]
    fn test_restart_mid_frame_keeps_frame_out_of_new_session() {
        let ctx = Arc::new(SharedContext::new(4));
        ctx.begin_session("run1.dat").unwrap();
        let remaining = Rc::new(Cell::new(3));
        let source = StopAfter {
            ctx: Arc::clone(&ctx),
            remaining: Rc::clone(&remaining),
            restart: true,
        };
        let mut sampler = sampler(&ctx, source, 2);

        assert_eq!(sampler.run_once(), TickOutcome::Discarded);
        assert_eq!(ctx.active_session(), Some(2));
        assert_eq!(ctx.queue_len(), 0);
    }

    #[test]
    fn test_full_queue_drops_frame() {
        let ctx = Arc::new(SharedContext::new(1));
        ctx.begin_session("run1.dat").unwrap();
        let mut sampler = sampler(&ctx, Counting { reads: 0 }, 1);

        assert_eq!(sampler.run_once(), TickOutcome::Queued);
        assert_eq!(sampler.run_once(), TickOutcome::Dropped);
        assert_eq!(ctx.queue_len(), 1);
    }

    #[test]
    fn test_rate_holding() {
        let ctx = Arc::new(SharedContext::new(4));
        ctx.begin_session("run1.dat").unwrap();
        let mut sampler = Sampler::new(
            Arc::clone(&ctx),
            Counting { reads: 0 },
            MonotonicClock::new(),
            100,
            4,
            Duration::from_millis(20),
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let (_, frame) = sampler.sample_frame().unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(1980), "too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2500), "drifted: {:?}", elapsed);

        let first = frame.sample(0).unwrap().timestamp_ms;
        let last = frame.sample(99).unwrap().timestamp_ms;
        assert!(last - first >= 99 * 20);
    }
}
