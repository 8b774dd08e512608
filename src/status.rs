//! # Status Reporting Module
//!
//! Every state change, error and heartbeat the node emits travels to the
//! controller as a short opaque token (e.g. `recording_started`).
//!
//! ## Key Types
//! - `Status`: One token, possibly carrying an error detail
//! - `StatusReporter`: Cloneable handle shared by the node loop and writer thread
//!
//! All reports go through one bounded outbox channel that the transport link
//! drains, so reports never interleave. Event reports block until queued and
//! are never dropped; heartbeats use `try_send` and are skipped when the outbox
//! is full.

use crossbeam_channel::{Sender, TrySendError};
use std::fmt;

/// Status tokens understood by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    BootedUp,
    Connected,
    ReconnectedIdle,
    RecordingStarted,
    RecordingAlreadyActive,
    RecordingStoppingSignal,
    NoRecordingActive,
    RecordingStoppedCore1Exit,
    ErrorSdNotMounted,
    ErrorMissingFilename,
    ErrorInvalidFilename,
    ErrorUnknownJsonCommand,
    ErrorNonJsonCommand,
    ErrorCommandInboxFull,
    WriteError(String),
    FileOpenError(String),
    ThreadError(String),
    FrameDroppedQueueFull,
    // Heartbeat
    RecordingActive,
    IdleSdReady,
    IdleNoSd,
}

impl Status {
    /// Wire token for this status
    pub fn token(&self) -> String {
        let token = match self {
            Status::BootedUp => "booted_up",
            Status::Connected => "connected",
            Status::ReconnectedIdle => "reconnected_idle",
            Status::RecordingStarted => "recording_started",
            Status::RecordingAlreadyActive => "recording_already_active",
            Status::RecordingStoppingSignal => "recording_stopping_signal",
            Status::NoRecordingActive => "no_recording_active",
            Status::RecordingStoppedCore1Exit => "recording_stopped_core1_exit",
            Status::ErrorSdNotMounted => "error_sd_not_mounted",
            Status::ErrorMissingFilename => "error_missing_filename",
            Status::ErrorInvalidFilename => "error_invalid_filename",
            Status::ErrorUnknownJsonCommand => "error_unknown_json_command",
            Status::ErrorNonJsonCommand => "error_non_json_command",
            Status::ErrorCommandInboxFull => "error_command_inbox_full",
            Status::WriteError(detail) => return format!("recording_write_error_{}", detail),
            Status::FileOpenError(detail) => {
                return format!("recording_file_open_error_{}", detail)
            }
            Status::ThreadError(detail) => return format!("recording_thread_error_{}", detail),
            Status::FrameDroppedQueueFull => "recording_frame_dropped_queue_full",
            Status::RecordingActive => "recording_active",
            Status::IdleSdReady => "idle_sd_ready",
            Status::IdleNoSd => "idle_no_sd",
        };
        token.to_string()
    }

    /// Heartbeat token derived from current state
    pub fn heartbeat(recording: bool, storage_available: bool) -> Self {
        if recording {
            Status::RecordingActive
        } else if storage_available {
            Status::IdleSdReady
        } else {
            Status::IdleNoSd
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Handle used by every component to emit statuses
#[derive(Clone)]
pub struct StatusReporter {
    sender: Sender<Status>,
}

impl StatusReporter {
    pub fn new(sender: Sender<Status>) -> Self {
        Self { sender }
    }

    /// Report an event. Blocks while the outbox is full.
    pub fn report(&self, status: Status) {
        log::info!("Status: {}", status);
        if let Err(e) = self.sender.send(status) {
            log::warn!("Status outbox closed, dropping '{}'", e.0);
        }
    }

    /// Best-effort heartbeat. Returns `false` when it was skipped.
    pub fn heartbeat(&self, recording: bool, storage_available: bool) -> bool {
        let status = Status::heartbeat(recording, storage_available);
        match self.sender.try_send(status) {
            Ok(()) => true,
            Err(TrySendError::Full(status)) => {
                log::debug!("Outbox full, skipping heartbeat '{}'", status);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
