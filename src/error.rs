//! # Error Types Module
//!
//! Centralized error handling for the acquisition node.
//! Each subsystem gets its own error type with proper context and error chaining.
//!
//! ## Error Types
//! - `ConfigError`: Configuration file I/O, parsing and validation errors
//! - `CommandError`: Malformed or incomplete remote commands (validation class)
//! - `StartError`: Rejected `start_recording` requests (precondition class)
//! - `WriterError`: File open/write failures, fatal to the current session only
//! - `LinkError`: Transport runtime failures, handled outside the core
//!
//! Every error that reaches the remote controller maps onto a status token,
//! see [`crate::status::Status`].

use std::fmt;

use crate::status::Status;

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// A value is out of range
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Errors raised while decoding an inbound command payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Payload is not a JSON object
    NonJson,
    /// `start_recording` without a usable `filename`
    MissingFilename,
    /// `command` names something we do not handle
    UnknownCommand(String),
}

impl CommandError {
    /// Status token reported back to the controller
    pub fn status(&self) -> Status {
        match self {
            CommandError::NonJson => Status::ErrorNonJsonCommand,
            CommandError::MissingFilename => Status::ErrorMissingFilename,
            CommandError::UnknownCommand(_) => Status::ErrorUnknownJsonCommand,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::NonJson => write!(f, "Command payload is not a JSON object"),
            CommandError::MissingFilename => {
                write!(f, "'start_recording' command missing 'filename'")
            }
            CommandError::UnknownCommand(name) => write!(f, "Unknown command type: {}", name),
        }
    }
}

impl std::error::Error for CommandError {}

/// Reasons a start request leaves the node idle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// A session is already running
    AlreadyActive,
    /// Storage was not mounted at boot
    StorageUnavailable,
    /// Filename is not a plain file name
    InvalidFilename(String),
    /// The writer thread could not be spawned
    WriterSpawn(String),
}

impl StartError {
    pub fn status(&self) -> Status {
        match self {
            StartError::AlreadyActive => Status::RecordingAlreadyActive,
            StartError::StorageUnavailable => Status::ErrorSdNotMounted,
            StartError::InvalidFilename(_) => Status::ErrorInvalidFilename,
            StartError::WriterSpawn(detail) => Status::ThreadError(detail.clone()),
        }
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::AlreadyActive => write!(f, "Recording already active"),
            StartError::StorageUnavailable => {
                write!(f, "Storage not mounted, cannot start recording")
            }
            StartError::InvalidFilename(name) => write!(f, "Invalid filename: {:?}", name),
            StartError::WriterSpawn(detail) => {
                write!(f, "Failed to spawn writer thread: {}", detail)
            }
        }
    }
}

impl std::error::Error for StartError {}

/// I/O failures inside the writer thread
#[derive(Debug)]
pub enum WriterError {
    /// Could not open (or prepare) the session file
    FileOpen(std::io::Error),
    /// Appending a frame failed
    Write(std::io::Error),
}

impl WriterError {
    pub fn status(&self) -> Status {
        match self {
            WriterError::FileOpen(e) => Status::FileOpenError(e.to_string()),
            WriterError::Write(e) => Status::WriteError(e.to_string()),
        }
    }
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterError::FileOpen(e) => write!(f, "Failed to open recording file: {}", e),
            WriterError::Write(e) => write!(f, "Failed to write frame: {}", e),
        }
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriterError::FileOpen(e) => Some(e),
            WriterError::Write(e) => Some(e),
        }
    }
}

/// Errors that can occur in the transport link
#[derive(Debug)]
pub enum LinkError {
    /// Failed to create Tokio runtime
    RuntimeCreation(String),
    /// The node loop dropped its end of the inbox
    Disconnected,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::RuntimeCreation(msg) => {
                write!(f, "Failed to create async runtime: {}", msg)
            }
            LinkError::Disconnected => write!(f, "Inbox receiver dropped"),
        }
    }
}

impl std::error::Error for LinkError {}
