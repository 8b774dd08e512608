//! # Node Loop
//!
//! The cooperative main loop of the acquisition side. Each iteration:
//!
//! 1. handles at most one inbound message
//! 2. runs one sampler tick (a full frame while recording, nothing when idle)
//! 3. yields briefly
//! 4. emits a heartbeat once `status_interval` has elapsed
//!
//! Commands are only seen between frames, so while recording a stop takes
//! effect at the next frame boundary at the latest.

use crossbeam_channel::{Receiver, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::command::{Dispatcher, Message};
use crate::config::Config;
use crate::context::SharedContext;
use crate::hal::{AnalogSource, Clock};
use crate::recorder::Recorder;
use crate::sampler::{Sampler, TickOutcome};
use crate::status::{Status, StatusReporter};
use crate::storage::Storage;

pub struct Node<A, C> {
    sampler: Sampler<A, C>,
    recorder: Recorder,
    dispatcher: Dispatcher,
    reporter: StatusReporter,
    inbox: Receiver<Message>,
    status_interval: Duration,
    loop_yield: Duration,
    last_status: Instant,
}

impl<A: AnalogSource, C: Clock> Node<A, C> {
    pub fn new(
        config: &Config,
        storage: Arc<Storage>,
        source: A,
        clock: C,
        inbox: Receiver<Message>,
        reporter: StatusReporter,
    ) -> Self {
        let ctx = Arc::new(SharedContext::new(config.queue_capacity));
        let sampler = Sampler::new(
            Arc::clone(&ctx),
            source,
            clock,
            config.samples_per_frame,
            config.channel_count,
            config.sample_interval(),
            config.push_timeout(),
        );
        let recorder = Recorder::new(
            ctx,
            storage,
            reporter.clone(),
            config.channel_count,
            config.writer_poll(),
        );

        Self {
            sampler,
            recorder,
            dispatcher: Dispatcher::new(config.command_topic.clone(), reporter.clone()),
            reporter,
            inbox,
            status_interval: config.status_interval(),
            loop_yield: config.loop_yield(),
            last_status: Instant::now(),
        }
    }

    #[cfg(test)]
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// One loop iteration. Returns `false` once the inbox has no sender left.
    pub fn step(&mut self) -> bool {
        match self.inbox.try_recv() {
            Ok(message) => self.dispatcher.dispatch(&message, &mut self.recorder),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                log::error!("Command link closed");
                return false;
            }
        }

        if self.sampler.run_once() == TickOutcome::Dropped {
            self.reporter.report(Status::FrameDroppedQueueFull);
        }

        thread::sleep(self.loop_yield);

        if self.last_status.elapsed() >= self.status_interval {
            self.recorder.heartbeat();
            self.last_status = Instant::now();
        }
        true
    }

    /// Run until `shutdown` is raised or the link goes away, then stop any
    /// recording and wait for the writer to drain.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!("Node loop running");
        while !shutdown.load(Ordering::SeqCst) {
            if !self.step() {
                break;
            }
        }
        log::info!("Node loop exiting");
        if self.recorder.is_recording() {
            log::info!("Recording still active, stopping it");
        }
        self.recorder.shutdown();
    }
}
