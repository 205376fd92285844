//! Custom error types for the OPI runtime.
//!
//! This module defines the primary error type, `OpiError`, for the whole crate.
//! Using the `thiserror` crate, it provides one consistent way to report what can
//! go wrong between an inbound line and the reply that answers it.
//!
//! ## Error Hierarchy
//!
//! - **Validation** (`MissingParameter`, `EmptyList`, `TypeMismatch`, `OutOfRange`,
//!   `UnknownEnumValue`): an inbound message does not satisfy the parameter schema
//!   of its command. The handler is never invoked.
//! - **Sequencing** (`UnknownCommand`, `NotInitialized`, `PresentationInProgress`):
//!   the message is well formed but cannot be accepted in the current state.
//! - **`Protocol`**: the line could not be decoded into a message at all.
//! - **`InvalidStimulus`**: the fields of a PRESENT are individually valid but do
//!   not describe a consistent stimulus sequence.
//! - **`DeviceCommunication`**: the device, or the server it relays to, failed.
//! - **`SampleTimeout`**: no eye sample arrived in time. It is absorbed by the
//!   presentation engine and never reaches a client.
//! - **`Io`**: socket bind/accept failures.
//!
//! Every error that reaches a client becomes an error reply on the same session;
//! none of them ends the session.

use crate::parameter::Command;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type OpiResult<T> = std::result::Result<T, OpiError>;

/// Errors raised while decoding, validating and executing OPI commands.
#[derive(Error, Debug)]
pub enum OpiError {
    /// A required parameter is absent from the message.
    #[error("Parameter '{name}' is required by {command} but was not supplied")]
    MissingParameter {
        /// Parameter name.
        name: String,
        /// Command whose schema requires it.
        command: Command,
    },

    /// A list-valued parameter was supplied with no elements.
    #[error("Parameter '{0}' must be a non-empty list")]
    EmptyList(String),

    /// A value does not have the kind its parameter declares.
    #[error("Parameter '{name}' must be {expected}")]
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// Human readable description of the expected kind.
        expected: String,
    },

    /// A numeric value lies outside the declared bounds.
    #[error("Parameter '{name}' value {value} is outside [{min}, {max}]")]
    OutOfRange {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },

    /// An enumerated string is not one of the legal values.
    #[error("Parameter '{name}' value '{value}' is not one of: {}", .legal.join(", "))]
    UnknownEnumValue {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
        /// Legal values for the parameter.
        legal: Vec<String>,
    },

    /// The `command` field does not name a known command.
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// PRESENT arrived while a presentation is still running.
    #[error("A presentation is already in progress")]
    PresentationInProgress,

    /// The device must be initialized before the command is accepted.
    #[error("Device is not initialized; {0} requires INITIALIZE first")]
    NotInitialized(Command),

    /// The inbound line is not a valid message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The device or the downstream server could not be reached or misbehaved.
    #[error("Device communication failure: {0}")]
    DeviceCommunication(String),

    /// No eye sample for the given request timestamp arrived before the deadline.
    #[error("No eye sample arrived for request at {timestamp} ms")]
    SampleTimeout {
        /// Request timestamp in milliseconds.
        timestamp: u64,
    },

    /// PRESENT fields are inconsistent with each other.
    #[error("Invalid stimulus: {0}")]
    InvalidStimulus(String),

    /// Socket level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpiError {
    /// Stable, machine readable class of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingParameter { .. } => "MissingParameter",
            Self::EmptyList(_) => "EmptyList",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::OutOfRange { .. } => "OutOfRange",
            Self::UnknownEnumValue { .. } => "UnknownEnumValue",
            Self::UnknownCommand(_) => "UnknownCommand",
            Self::PresentationInProgress => "PresentationInProgress",
            Self::NotInitialized(_) => "NotInitialized",
            Self::Protocol(_) => "ProtocolError",
            Self::DeviceCommunication(_) => "DeviceCommunicationFailure",
            Self::SampleTimeout { .. } => "SampleTimeout",
            Self::InvalidStimulus(_) => "InvalidStimulus",
            Self::Io(_) => "Io",
        }
    }

    /// True for schema violations detected before any handler runs.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. }
                | Self::EmptyList(_)
                | Self::TypeMismatch { .. }
                | Self::OutOfRange { .. }
                | Self::UnknownEnumValue { .. }
        )
    }
}
