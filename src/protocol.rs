//! Line protocol: inbound messages and outbound reply packets.
//!
//! Each inbound line is a JSON object carrying a case-insensitive `command`
//! field plus the command's parameters. Each reply is one JSON line:
//!
//! ```text
//! {"error":false,"msg":{"seen":true,"time":412}}
//! {"error":true,"msg":"Parameter 'x' value 95 is outside [-30, 30]"}
//! {"error":false,"msg":"Device closed","close":true}
//! ```
//!
//! `close` is only serialized when it is true; decoding treats a missing
//! field as false.

use crate::error::{OpiError, OpiResult};
use crate::parameter::Command;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Packet
// =============================================================================

fn is_false(value: &bool) -> bool {
    !*value
}

/// One reply line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Whether the request failed.
    pub error: bool,
    /// Reply payload: an object on success, a message string on failure.
    pub msg: Value,
    /// Whether the session ends after this reply.
    #[serde(default, skip_serializing_if = "is_false")]
    pub close: bool,
}

impl Packet {
    /// Successful reply.
    pub fn ok(msg: impl Into<Value>) -> Self {
        Self {
            error: false,
            msg: msg.into(),
            close: false,
        }
    }

    /// Successful reply that also ends the session.
    pub fn ok_close(msg: impl Into<Value>) -> Self {
        Self {
            error: false,
            msg: msg.into(),
            close: true,
        }
    }

    /// Failed reply carrying a message.
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            error: true,
            msg: Value::String(msg.into()),
            close: false,
        }
    }

    /// Encode as a single line without the trailing newline.
    ///
    /// Any newline inside the encoded payload is removed so the reply can never
    /// span more than one line.
    pub fn to_line(&self) -> String {
        // Serializing a struct of bool and Value cannot fail.
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":true,"msg":"{e}"}}"#))
            .replace(['\n', '\r'], "")
    }

    /// Decode a reply line.
    pub fn from_line(line: &str) -> OpiResult<Self> {
        serde_json::from_str(line.trim())
            .map_err(|e| OpiError::Protocol(format!("Cannot decode reply: {e}")))
    }
}

impl From<OpiError> for Packet {
    fn from(err: OpiError) -> Self {
        Packet::error(err.to_string())
    }
}

// =============================================================================
// Message
// =============================================================================

/// A decoded inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Requested command.
    pub command: Command,
    /// All remaining fields of the JSON object.
    pub fields: Map<String, Value>,
}

impl Message {
    /// Build a message from a command and its fields.
    pub fn new(command: Command, fields: Map<String, Value>) -> Self {
        Self { command, fields }
    }

    /// Decode one inbound line.
    ///
    /// Returns `Protocol` when the line is not a JSON object or has no
    /// `command`, and `UnknownCommand` when `command` names nothing known.
    pub fn decode(line: &str) -> OpiResult<Self> {
        let value: Value = serde_json::from_str(line.trim())
            .map_err(|e| OpiError::Protocol(format!("Cannot decode message: {e}")))?;
        let Value::Object(mut fields) = value else {
            return Err(OpiError::Protocol(
                "Message must be a JSON object".to_string(),
            ));
        };
        let command = match fields.remove("command") {
            None => {
                return Err(OpiError::Protocol(
                    "Message does not contain field 'command'".to_string(),
                ))
            }
            Some(Value::String(name)) => name.parse::<Command>()?,
            Some(other) => return Err(OpiError::UnknownCommand(other.to_string())),
        };
        Ok(Self { command, fields })
    }

    /// Encode back to a single line, `command` included.
    pub fn to_line(&self) -> String {
        Value::Object(self.to_object()).to_string()
    }

    fn to_object(&self) -> Map<String, Value> {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert("command".into(), Value::from(self.command.as_str()));
        object.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        object
    }

    /// Validated view of the fields handed to device handlers.
    pub fn into_args(self) -> Args {
        Args::new(self.command, self.fields)
    }
}

// =============================================================================
// Args
// =============================================================================

/// Validated command arguments with typed accessors.
///
/// List accessors accept a scalar as a one-element list, matching clients
/// that unbox length-1 vectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Args {
    command: Option<Command>,
    fields: Map<String, Value>,
}

impl Args {
    /// Arguments for `command` taken from `fields`.
    pub fn new(command: Command, fields: Map<String, Value>) -> Self {
        Self {
            command: Some(command),
            fields,
        }
    }

    /// Raw field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn missing(&self, name: &str) -> OpiError {
        OpiError::MissingParameter {
            name: name.to_string(),
            command: self.command.unwrap_or(Command::Query),
        }
    }

    fn mismatch(name: &str, expected: &str) -> OpiError {
        OpiError::TypeMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Required number.
    pub fn number(&self, name: &str) -> OpiResult<f64> {
        self.opt_number(name)?.ok_or_else(|| self.missing(name))
    }

    /// Optional number.
    pub fn opt_number(&self, name: &str) -> OpiResult<Option<f64>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) if items.len() == 1 => items[0]
                .as_f64()
                .map(Some)
                .ok_or_else(|| Self::mismatch(name, "a number")),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| Self::mismatch(name, "a number")),
        }
    }

    /// Required string.
    pub fn text(&self, name: &str) -> OpiResult<String> {
        self.opt_text(name)?.ok_or_else(|| self.missing(name))
    }

    /// Optional string.
    pub fn opt_text(&self, name: &str) -> OpiResult<Option<String>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) if items.len() == 1 => items[0]
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| Self::mismatch(name, "a string")),
            Some(value) => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| Self::mismatch(name, "a string")),
        }
    }

    /// Required list of numbers.
    pub fn numbers(&self, name: &str) -> OpiResult<Vec<f64>> {
        self.opt_numbers(name)?.ok_or_else(|| self.missing(name))
    }

    /// Optional list of numbers.
    pub fn opt_numbers(&self, name: &str) -> OpiResult<Option<Vec<f64>>> {
        self.list(name, |v| v.as_f64(), "a list of numbers")
    }

    /// Required list of strings.
    pub fn texts(&self, name: &str) -> OpiResult<Vec<String>> {
        self.opt_texts(name)?.ok_or_else(|| self.missing(name))
    }

    /// Optional list of strings.
    pub fn opt_texts(&self, name: &str) -> OpiResult<Option<Vec<String>>> {
        self.list(name, |v| v.as_str().map(str::to_string), "a list of strings")
    }

    fn list<T>(
        &self,
        name: &str,
        convert: impl Fn(&Value) -> Option<T>,
        expected: &str,
    ) -> OpiResult<Option<Vec<T>>> {
        let items = match self.get(name) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(items)) => items.iter().map(&convert).collect::<Option<Vec<T>>>(),
            Some(value) => convert(value).map(|item| vec![item]),
        };
        items
            .map(Some)
            .ok_or_else(|| Self::mismatch(name, expected))
    }
}
