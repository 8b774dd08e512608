//! # Recording State Machine
//!
//! Owns the recording lifecycle: `Idle <-> Recording`.
//!
//! ## Transitions
//! - `Idle --start(filename)--> Recording`: needs mounted storage and a plain
//!   file name; clears the frame queue and spawns a fresh writer
//! - `Recording --stop--> Idle`: the writer drains the queue and reports its
//!   own exit once done
//! - `start` while recording and `stop` while idle are no-ops that still
//!   acknowledge with a status
//!
//! ## Writer Lifecycle
//! A new `start` joins the previous session's writer before spawning the next
//! one, so two writers never share the queue. The writer was already told to
//! stop, so the join only waits for it to finish draining.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::context::SharedContext;
use crate::error::{StartError, WriterError};
use crate::status::{Status, StatusReporter};
use crate::storage::Storage;
use crate::writer::Writer;

pub struct Recorder {
    ctx: Arc<SharedContext>,
    storage: Arc<Storage>,
    reporter: StatusReporter,
    channel_count: usize,
    writer_poll: Duration,
    writer: Option<JoinHandle<Result<usize, WriterError>>>,
}

impl Recorder {
    pub fn new(
        ctx: Arc<SharedContext>,
        storage: Arc<Storage>,
        reporter: StatusReporter,
        channel_count: usize,
        writer_poll: Duration,
    ) -> Self {
        Self {
            ctx,
            storage,
            reporter,
            channel_count,
            writer_poll,
            writer: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.ctx.is_active()
    }

    /// Start a session writing to `filename` under the storage root
    pub fn start_recording(&mut self, filename: &str) -> Result<u64, StartError> {
        let result = self.try_start(filename);
        match &result {
            Ok(session) => {
                log::info!("Starting recording session {} to {}", session, filename);
                self.reporter.report(Status::RecordingStarted);
            }
            Err(e) => {
                log::warn!("Start ignored: {}", e);
                self.reporter.report(e.status());
            }
        }
        result
    }

    fn try_start(&mut self, filename: &str) -> Result<u64, StartError> {
        if self.ctx.is_active() {
            return Err(StartError::AlreadyActive);
        }
        if !self.storage.is_available() {
            return Err(StartError::StorageUnavailable);
        }
        let path: PathBuf = self.storage.resolve(filename)?;

        self.join_writer();

        let session = self.ctx.begin_session(filename)?;
        let writer = Writer::new(
            Arc::clone(&self.ctx),
            self.reporter.clone(),
            path,
            session,
            self.channel_count,
            self.writer_poll,
        );
        match writer.spawn() {
            Ok(handle) => {
                self.writer = Some(handle);
                Ok(session)
            }
            Err(e) => {
                self.ctx.fail_session(session);
                Err(StartError::WriterSpawn(e.to_string()))
            }
        }
    }

    /// Signal the current session to stop. Returns `false` if nothing was recording.
    pub fn stop_recording(&mut self) -> bool {
        let filename = self.ctx.state().filename.unwrap_or_default();
        if self.ctx.end_session() {
            log::info!("Stopping recording to {}", filename);
            self.reporter.report(Status::RecordingStoppingSignal);
            true
        } else {
            log::info!("No recording active. Ignoring stop command.");
            self.reporter.report(Status::NoRecordingActive);
            false
        }
    }

    pub fn check_connection(&self) {
        self.reporter.report(Status::Connected);
    }

    /// Periodic status. Skipped (returns `false`) when the outbox is busy.
    pub fn heartbeat(&self) -> bool {
        self.reporter
            .heartbeat(self.ctx.is_active(), self.storage.is_available())
    }

    /// Stop any session and wait for its writer to drain
    pub fn shutdown(&mut self) {
        if self.ctx.end_session() {
            log::info!(
                "Signaling recording thread to stop ({} frames queued)...",
                self.ctx.queue_len()
            );
        }
        self.join_writer();
    }

    fn join_writer(&mut self) {
        let Some(handle) = self.writer.take() else {
            return;
        };
        match handle.join() {
            Ok(Ok(frames)) => log::debug!("Previous writer exited after {} frames", frames),
            // Already reported by the writer itself
            Ok(Err(e)) => log::debug!("Previous writer exited with error: {}", e),
            Err(_) => log::error!("Writer thread panicked"),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}
