//! Declarative command parameter schemas.
//!
//! Every device describes the arguments of its five commands with static
//! [`ParameterSpec`] tables. The dispatcher walks a table in declaration order
//! and checks each inbound field with [`ParameterSpec::check`] before any
//! handler runs, so handlers can read their arguments without re-validating.
//!
//! # Example
//!
//! ```rust
//! use rust_opi::parameter::{ParameterKind, ParameterSpec};
//! use serde_json::json;
//!
//! const LUM: ParameterSpec = ParameterSpec::number("lum", 0.0, 3183.099)
//!     .describe("Stimulus luminance (cd/m^2).");
//!
//! assert!(LUM.check(&json!(100.0)).is_ok());
//! assert!(LUM.check(&json!(-1.0)).is_err());
//! assert_eq!(LUM.kind, ParameterKind::Number);
//! ```

use crate::error::{OpiError, OpiResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Command
// =============================================================================

/// The five commands of the OPI protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    /// Describe the device and its state.
    Query,
    /// Open the device for use.
    Initialize,
    /// Change background and fixation.
    Setup,
    /// Present a stimulus sequence and wait for the response.
    Present,
    /// Release the device and end the session.
    Close,
}

impl Command {
    /// All commands in protocol order.
    pub const ALL: [Command; 5] = [
        Command::Query,
        Command::Initialize,
        Command::Setup,
        Command::Present,
        Command::Close,
    ];

    /// Wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Query => "QUERY",
            Command::Initialize => "INITIALIZE",
            Command::Setup => "SETUP",
            Command::Present => "PRESENT",
            Command::Close => "CLOSE",
        }
    }

    /// Whether the device must be initialized before this command is accepted.
    pub fn requires_initialized(&self) -> bool {
        matches!(self, Command::Setup | Command::Present | Command::Close)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = OpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| OpiError::UnknownCommand(s.to_string()))
    }
}

// =============================================================================
// ParameterSpec
// =============================================================================

/// Kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// A single number.
    Number,
    /// A single string.
    Text,
    /// A single string drawn from a fixed set, compared case-insensitively.
    Choice(&'static [&'static str]),
    /// A non-empty list of numbers.
    NumberList,
    /// A non-empty list of strings.
    TextList,
    /// A non-empty list of strings drawn from a fixed set.
    ChoiceList(&'static [&'static str]),
}

impl ParameterKind {
    /// Whether the parameter carries a list.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            ParameterKind::NumberList | ParameterKind::TextList | ParameterKind::ChoiceList(_)
        )
    }

    fn element_description(&self) -> &'static str {
        match self {
            ParameterKind::Number | ParameterKind::NumberList => "a number",
            ParameterKind::Text | ParameterKind::TextList => "a string",
            ParameterKind::Choice(_) | ParameterKind::ChoiceList(_) => "one of the named values",
        }
    }
}

/// Static description of one command argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    /// Field name in the inbound message.
    pub name: &'static str,
    /// Accepted value kind.
    pub kind: ParameterKind,
    /// Inclusive lower bound for numeric kinds.
    pub min: f64,
    /// Inclusive upper bound for numeric kinds.
    pub max: f64,
    /// Whether the field may be omitted.
    pub optional: bool,
    /// Human readable description, reported by QUERY.
    pub desc: &'static str,
}

impl ParameterSpec {
    const fn base(name: &'static str, kind: ParameterKind) -> Self {
        Self {
            name,
            kind,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            optional: false,
            desc: "",
        }
    }

    /// A bounded number.
    pub const fn number(name: &'static str, min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            ..Self::base(name, ParameterKind::Number)
        }
    }

    /// A bounded list of numbers.
    pub const fn number_list(name: &'static str, min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            ..Self::base(name, ParameterKind::NumberList)
        }
    }

    /// A free-form string.
    pub const fn text(name: &'static str) -> Self {
        Self::base(name, ParameterKind::Text)
    }

    /// A list of free-form strings.
    pub const fn text_list(name: &'static str) -> Self {
        Self::base(name, ParameterKind::TextList)
    }

    /// A string restricted to `legal`.
    pub const fn choice(name: &'static str, legal: &'static [&'static str]) -> Self {
        Self::base(name, ParameterKind::Choice(legal))
    }

    /// A list of strings restricted to `legal`.
    pub const fn choice_list(name: &'static str, legal: &'static [&'static str]) -> Self {
        Self::base(name, ParameterKind::ChoiceList(legal))
    }

    /// Mark the parameter optional.
    pub const fn optional(self) -> Self {
        Self {
            optional: true,
            ..self
        }
    }

    /// Attach a description.
    pub const fn describe(self, desc: &'static str) -> Self {
        Self { desc, ..self }
    }

    /// Check `value` against this spec.
    ///
    /// A scalar supplied for a list kind is checked as a one-element list.
    pub fn check(&self, value: &Value) -> OpiResult<()> {
        match (self.kind, value) {
            (kind, Value::Array(items)) if kind.is_list() => {
                if items.is_empty() {
                    return Err(OpiError::EmptyList(self.name.to_string()));
                }
                items.iter().try_for_each(|item| self.check_element(item))
            }
            (kind, Value::Array(_)) => Err(self.mismatch(kind.element_description())),
            _ => self.check_element(value),
        }
    }

    fn check_element(&self, value: &Value) -> OpiResult<()> {
        match self.kind {
            ParameterKind::Number | ParameterKind::NumberList => {
                let number = value
                    .as_f64()
                    .ok_or_else(|| self.mismatch(self.kind.element_description()))?;
                if number < self.min || number > self.max {
                    return Err(OpiError::OutOfRange {
                        name: self.name.to_string(),
                        value: number,
                        min: self.min,
                        max: self.max,
                    });
                }
                Ok(())
            }
            ParameterKind::Text | ParameterKind::TextList => value
                .as_str()
                .map(|_| ())
                .ok_or_else(|| self.mismatch(self.kind.element_description())),
            ParameterKind::Choice(legal) | ParameterKind::ChoiceList(legal) => {
                let text = value
                    .as_str()
                    .ok_or_else(|| self.mismatch("a string"))?;
                if legal.iter().any(|l| l.eq_ignore_ascii_case(text)) {
                    Ok(())
                } else {
                    Err(OpiError::UnknownEnumValue {
                        name: self.name.to_string(),
                        value: text.to_string(),
                        legal: legal.iter().map(|l| l.to_string()).collect(),
                    })
                }
            }
        }
    }

    fn mismatch(&self, expected: &str) -> OpiError {
        let expected = if self.kind.is_list() {
            format!("a list of which each element is {expected}")
        } else {
            expected.to_string()
        };
        OpiError::TypeMismatch {
            name: self.name.to_string(),
            expected,
        }
    }

    /// JSON description of the parameter, used by QUERY replies.
    pub fn describe_json(&self) -> Value {
        let mut entry = serde_json::Map::new();
        entry.insert("name".into(), Value::from(self.name));
        entry.insert("optional".into(), Value::from(self.optional));
        entry.insert("list".into(), Value::from(self.kind.is_list()));
        if let ParameterKind::Choice(legal) | ParameterKind::ChoiceList(legal) = self.kind {
            entry.insert("values".into(), Value::from(legal.to_vec()));
        }
        if self.min.is_finite() {
            entry.insert("min".into(), Value::from(self.min));
        }
        if self.max.is_finite() {
            entry.insert("max".into(), Value::from(self.max));
        }
        if !self.desc.is_empty() {
            entry.insert("desc".into(), Value::from(self.desc));
        }
        Value::Object(entry)
    }
}

/// Ordered parameter list of one command.
pub type CommandSchema = &'static [ParameterSpec];

/// Parameter schemas of all five commands of one device.
#[derive(Debug, Clone, Copy)]
pub struct CommandTable {
    /// QUERY arguments.
    pub query: CommandSchema,
    /// INITIALIZE arguments.
    pub initialize: CommandSchema,
    /// SETUP arguments.
    pub setup: CommandSchema,
    /// PRESENT arguments.
    pub present: CommandSchema,
    /// CLOSE arguments.
    pub close: CommandSchema,
}

impl CommandTable {
    /// A table where no command takes arguments.
    pub const EMPTY: CommandTable = CommandTable {
        query: &[],
        initialize: &[],
        setup: &[],
        present: &[],
        close: &[],
    };

    /// Schema for `command`.
    pub fn parameters(&self, command: Command) -> CommandSchema {
        match command {
            Command::Query => self.query,
            Command::Initialize => self.initialize,
            Command::Setup => self.setup,
            Command::Present => self.present,
            Command::Close => self.close,
        }
    }

    /// Describe every command that takes arguments, keyed by command name.
    pub fn describe_json(&self) -> Value {
        let mut commands = serde_json::Map::new();
        for command in Command::ALL {
            let schema = self.parameters(command);
            if !schema.is_empty() {
                let specs = schema.iter().map(ParameterSpec::describe_json).collect();
                commands.insert(command.as_str().to_string(), Value::Array(specs));
            }
        }
        Value::Object(commands)
    }
}
