//! # Session Writer
//!
//! One writer thread per recording session. It drains the frame queue and
//! appends each frame as CSV to the session file.
//!
//! ## Lifecycle
//! 1. Open the file once in append mode; write the header if the file is new
//! 2. Take frames from the queue and append them, one write per frame
//! 3. When the session is stopped and the queue is empty, exit
//!
//! A failed open or write ends the session: the recording state is forced
//! idle, the error is reported, and the thread exits without retrying. Every
//! exit path closes the file and reports `recording_stopped_core1_exit`.

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::context::{SharedContext, WriterPoll};
use crate::error::WriterError;
use crate::frame::csv_header;
use crate::status::{Status, StatusReporter};

pub struct Writer {
    ctx: Arc<SharedContext>,
    reporter: StatusReporter,
    path: PathBuf,
    session: u64,
    channel_count: usize,
    poll: Duration,
    started_at: DateTime<Local>,
}

impl Writer {
    pub fn new(
        ctx: Arc<SharedContext>,
        reporter: StatusReporter,
        path: PathBuf,
        session: u64,
        channel_count: usize,
        poll: Duration,
    ) -> Self {
        Self {
            ctx,
            reporter,
            path,
            session,
            channel_count,
            poll,
            started_at: Local::now(),
        }
    }

    /// Start the writer on its own thread. The handle yields the number of frames written.
    pub fn spawn(self) -> io::Result<JoinHandle<Result<usize, WriterError>>> {
        thread::Builder::new()
            .name(format!("writer-{}", self.session))
            .spawn(move || self.run())
    }

    fn run(self) -> Result<usize, WriterError> {
        log::info!("Writer for session {} started for {}", self.session, self.path.display());

        let result = self.write_session();
        // Clean exits find the session already idle; this covers the error paths.
        self.ctx.fail_session(self.session);

        match &result {
            Ok(frames) => {
                let elapsed = Local::now().signed_duration_since(self.started_at);
                log::info!(
                    "Recording stopped and queue empty: {} frames in {}.{:03}s (started {})",
                    frames,
                    elapsed.num_seconds(),
                    elapsed.num_milliseconds().rem_euclid(1000),
                    self.started_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Err(e) => {
                log::error!("Session {} ({}): {}", self.session, self.path.display(), e);
                self.reporter.report(e.status());
            }
        }

        self.reporter.report(Status::RecordingStoppedCore1Exit);
        result
    }

    fn write_session(&self) -> Result<usize, WriterError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(WriterError::FileOpen)?;
        let is_new = file.metadata().map_err(WriterError::FileOpen)?.len() == 0;

        let mut out = BufWriter::new(file);
        if is_new {
            out.write_all(csv_header(self.channel_count).as_bytes())
                .and_then(|_| out.flush())
                .map_err(WriterError::Write)?;
        }

        self.drain_into(&mut out)
    }

    /// Append frames to `out` until the session is over and the queue is drained
    pub fn drain_into<W: Write>(&self, out: &mut W) -> Result<usize, WriterError> {
        let mut frames = 0;
        loop {
            match self.ctx.next_frame(self.session, self.poll) {
                WriterPoll::Frame(frame) => {
                    frame
                        .write_csv(out)
                        .and_then(|_| out.flush())
                        .map_err(WriterError::Write)?;
                    frames += 1;
                    log::debug!("Wrote {} samples to file", frame.len());
                }
                WriterPoll::Finished => return Ok(frames),
            }
        }
    }
}
