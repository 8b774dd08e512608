//! # Command Dispatcher
//!
//! Decodes JSON command payloads from the controller and applies them to the
//! recorder.
//!
//! ```text
//! {"command": "start_recording", "filename": "run1.dat"}
//! {"command": "stop_recording"}
//! {"command": "check_pico_connection"}
//! ```
//!
//! Every message on the command topic ends in exactly one status report;
//! nothing here returns an error to the caller.

use serde_json::Value;

use crate::error::CommandError;
use crate::recorder::Recorder;
use crate::status::StatusReporter;

/// A message delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartRecording { filename: String },
    StopRecording,
    CheckConnection,
}

impl Command {
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        let value: Value = serde_json::from_slice(payload).map_err(|_| CommandError::NonJson)?;
        let Value::Object(fields) = value else {
            return Err(CommandError::NonJson);
        };

        let name = fields.get("command").and_then(Value::as_str).unwrap_or_default();
        match name {
            "start_recording" => {
                let filename = fields
                    .get("filename")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or(CommandError::MissingFilename)?;
                Ok(Command::StartRecording {
                    filename: filename.to_string(),
                })
            }
            "stop_recording" => Ok(Command::StopRecording),
            "check_pico_connection" | "check_connection" => Ok(Command::CheckConnection),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

pub struct Dispatcher {
    command_topic: String,
    reporter: StatusReporter,
}

impl Dispatcher {
    pub fn new(command_topic: impl Into<String>, reporter: StatusReporter) -> Self {
        Self {
            command_topic: command_topic.into(),
            reporter,
        }
    }

    pub fn dispatch(&self, message: &Message, recorder: &mut Recorder) {
        if message.topic != self.command_topic {
            log::debug!("Ignoring message on topic '{}'", message.topic);
            return;
        }
        log::info!(
            "Received message on '{}': '{}'",
            message.topic,
            String::from_utf8_lossy(&message.payload)
        );

        match Command::parse(&message.payload) {
            Ok(Command::StartRecording { filename }) => {
                // Outcome is reported by the recorder
                let _ = recorder.start_recording(&filename);
            }
            Ok(Command::StopRecording) => {
                recorder.stop_recording();
            }
            Ok(Command::CheckConnection) => recorder.check_connection(),
            Err(e) => {
                log::warn!("Rejected command: {}", e);
                self.reporter.report(e.status());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SharedContext;
    use crate::status::Status;
    use crate::storage::Storage;
    use crossbeam_channel::{unbounded, Receiver};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const TOPIC: &str = "pico/all/cmd";

    fn setup() -> (Dispatcher, Recorder, Receiver<Status>, TempDir) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(dir.path()));
        storage.mount();
        let (tx, rx) = unbounded();
        let reporter = StatusReporter::new(tx);
        let recorder = Recorder::new(
            Arc::new(SharedContext::new(4)),
            storage,
            reporter.clone(),
            4,
            Duration::from_millis(5),
        );
        (Dispatcher::new(TOPIC, reporter), recorder, rx, dir)
    }

    fn send(dispatcher: &Dispatcher, recorder: &mut Recorder, payload: &str) {
        dispatcher.dispatch(&Message::new(TOPIC, payload), recorder);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse(br#"{"command":"start_recording","filename":"run1.dat"}"#),
            Ok(Command::StartRecording {
                filename: "run1.dat".into()
            })
        );
        assert_eq!(
            Command::parse(br#"{"command":"stop_recording"}"#),
            Ok(Command::StopRecording)
        );
        assert_eq!(
            Command::parse(br#"{"command":"check_pico_connection"}"#),
            Ok(Command::CheckConnection)
        );
        assert_eq!(
            Command::parse(br#"{"command":"check_connection"}"#),
            Ok(Command::CheckConnection)
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse(b"start"), Err(CommandError::NonJson));
        assert_eq!(Command::parse(b"[1,2]"), Err(CommandError::NonJson));
        assert_eq!(Command::parse(&[0xff, 0xfe]), Err(CommandError::NonJson));
        assert_eq!(
            Command::parse(br#"{"command":"start_recording"}"#),
            Err(CommandError::MissingFilename)
        );
        assert_eq!(
            Command::parse(br#"{"command":"start_recording","filename":"  "}"#),
            Err(CommandError::MissingFilename)
        );
        assert_eq!(
            Command::parse(br#"{"command":"start_recording","filename":7}"#),
            Err(CommandError::MissingFilename)
        );
        assert_eq!(
            Command::parse(br#"{"command":"reboot"}"#),
            Err(CommandError::UnknownCommand("reboot".into()))
        );
        assert_eq!(
            Command::parse(br#"{"filename":"x"}"#),
            Err(CommandError::UnknownCommand(String::new()))
        );
    }

    #[test]
    fn test_every_command_gets_one_status() {
        let (dispatcher, mut recorder, rx, _dir) = setup();

        let cases = [
            ("not json", Status::ErrorNonJsonCommand),
            (r#"{"command":"start_recording"}"#, Status::ErrorMissingFilename),
            (r#"{"command":"dance"}"#, Status::ErrorUnknownJsonCommand),
            (r#"{"command":"check_pico_connection"}"#, Status::Connected),
            (r#"{"command":"stop_recording"}"#, Status::NoRecordingActive),
        ];
        for (payload, expected) in cases {
            send(&dispatcher, &mut recorder, payload);
            let got: Vec<Status> = rx.try_iter().collect();
            assert_eq!(got, vec![expected], "payload {}", payload);
        }
    }

    #[test]
    fn test_start_stop_via_dispatch() {
        let (dispatcher, mut recorder, rx, _dir) = setup();

        send(
            &dispatcher,
            &mut recorder,
            r#"{"command":"start_recording","filename":"run1.dat"}"#,
        );
        assert!(recorder.is_recording());
        assert_eq!(rx.try_recv().unwrap(), Status::RecordingStarted);

        send(&dispatcher, &mut recorder, r#"{"command":"stop_recording"}"#);
        assert!(!recorder.is_recording());
        assert_eq!(rx.recv().unwrap(), Status::RecordingStoppingSignal);
        assert_eq!(rx.recv().unwrap(), Status::RecordingStoppedCore1Exit);
    }

    #[test]
    fn test_other_topics_ignored() {
        let (dispatcher, mut recorder, rx, _dir) = setup();
        dispatcher.dispatch(
            &Message::new("pico/pico2/status", r#"{"command":"stop_recording"}"#),
            &mut recorder,
        );
        assert!(rx.try_recv().is_err());
    }
}
