//! Schema-driven command dispatch.
//!
//! The dispatcher turns one inbound line into exactly one reply packet:
//!
//! 1. decode the line into a [`Message`],
//! 2. validate its fields against the device's schema for that command,
//!    stopping at the first violation,
//! 3. refuse SETUP/PRESENT/CLOSE on a device that is not initialized,
//! 4. call the matching handler.
//!
//! Any error along the way becomes an error reply; none of them ends the
//! session.

use crate::error::{OpiError, OpiResult};
use crate::instrument::Device;
use crate::parameter::{Command, CommandSchema};
use crate::protocol::{Message, Packet};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Stateless validator and router.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dispatcher;

impl Dispatcher {
    /// New dispatcher.
    pub fn new() -> Self {
        Self
    }

    /// Check `fields` against `schema` in declaration order.
    pub fn validate(
        schema: CommandSchema,
        command: Command,
        fields: &Map<String, Value>,
    ) -> OpiResult<()> {
        for spec in schema {
            match fields.get(spec.name) {
                None | Some(Value::Null) if spec.optional => continue,
                None | Some(Value::Null) => {
                    return Err(OpiError::MissingParameter {
                        name: spec.name.to_string(),
                        command,
                    })
                }
                Some(value) => spec.check(value)?,
            }
        }
        Ok(())
    }

    /// Validate `message` and run it on `device`.
    pub async fn dispatch(&self, device: &mut dyn Device, message: Message) -> OpiResult<Packet> {
        let command = message.command;
        Self::validate(device.commands().parameters(command), command, &message.fields)?;
        if command.requires_initialized() && !device.is_initialized() {
            return Err(OpiError::NotInitialized(command));
        }

        debug!(device = device.name(), %command, "Dispatching");
        let args = message.into_args();
        match command {
            Command::Query => device.query().await,
            Command::Initialize => device.initialize(&args).await,
            Command::Setup => device.setup(&args).await,
            Command::Present => device.present(&args).await,
            Command::Close => device.close().await,
        }
    }

    /// Decode, dispatch and fold any failure into an error reply.
    pub async fn process_line(&self, device: &mut dyn Device, line: &str) -> Packet {
        let result = match Message::decode(line) {
            Ok(message) => self.dispatch(device, message).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            if e.is_validation() {
                info!(kind = e.kind(), error = %e, "Request rejected");
            } else {
                warn!(kind = e.kind(), error = %e, "Request failed");
            }
            Packet::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::MockInstrument;
    use crate::parameter::ParameterSpec;
    use serde_json::json;
    use tracing_test::traced_test;

    const SCHEMA: &[ParameterSpec] = &[
        ParameterSpec::number("x", -30.0, 30.0),
        ParameterSpec::choice("eye", &["left", "right"]),
        ParameterSpec::number_list("t", 0.0, 1000.0).optional(),
    ];

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_validation_is_fail_fast_in_order() {
        let err = Dispatcher::validate(SCHEMA, Command::Present, &fields(json!({"eye": "up"})))
            .unwrap_err();
        assert!(matches!(err, OpiError::MissingParameter { ref name, .. } if name == "x"));

        let err = Dispatcher::validate(
            SCHEMA,
            Command::Present,
            &fields(json!({"x": 31, "eye": "up"})),
        )
        .unwrap_err();
        assert!(matches!(err, OpiError::OutOfRange { .. }));
    }

    #[test]
    fn test_optional_and_extra_fields() {
        assert!(Dispatcher::validate(
            SCHEMA,
            Command::Present,
            &fields(json!({"x": 0, "eye": "LEFT", "extra": true}))
        )
        .is_ok());
        assert!(matches!(
            Dispatcher::validate(
                SCHEMA,
                Command::Present,
                &fields(json!({"x": 0, "eye": "left", "t": []}))
            ),
            Err(OpiError::EmptyList(_))
        ));
    }

    #[tokio::test]
    async fn test_valid_message_invokes_one_handler() {
        let mut device = MockInstrument::new();
        let calls = device.calls();
        let dispatcher = Dispatcher::new();

        let reply = dispatcher
            .process_line(&mut device, r#"{"command":"initialize"}"#)
            .await;
        assert!(!reply.error);
        assert_eq!(calls.lock().as_slice(), &[Command::Initialize]);
    }

    #[tokio::test]
    async fn test_missing_parameter_skips_handler() {
        let mut device = MockInstrument::new();
        let calls = device.calls();
        let dispatcher = Dispatcher::new();
        dispatcher
            .process_line(&mut device, r#"{"command":"INITIALIZE"}"#)
            .await;

        let reply = dispatcher
            .process_line(&mut device, r#"{"command":"PRESENT","y":0,"lum":10,"t":200,"w":1500}"#)
            .await;
        assert!(reply.error);
        assert!(reply.msg.as_str().unwrap().contains("'x'"));
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_uninitialized_device_rejects_present() {
        let mut device = MockInstrument::new();
        let reply = Dispatcher::new()
            .process_line(
                &mut device,
                r#"{"command":"PRESENT","x":0,"y":0,"lum":10,"t":200,"w":1500}"#,
            )
            .await;
        assert!(reply.error);
        assert!(reply.msg.as_str().unwrap().contains("INITIALIZE first"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_validation_failures_logged_apart_from_request_failures() {
        let mut device = MockInstrument::new();
        let dispatcher = Dispatcher::new();

        dispatcher
            .process_line(&mut device, r#"{"command":"SETUP","bgLum":-1}"#)
            .await;
        assert!(logs_contain("Request rejected"));
        assert!(!logs_contain("Request failed"));

        dispatcher
            .process_line(&mut device, r#"{"command":"SETUP","bgLum":10}"#)
            .await;
        assert!(logs_contain("Request failed"));
        assert!(logs_contain("NotInitialized"));
    }

    #[tokio::test]
    async fn test_protocol_errors_become_replies() {
        let mut device = MockInstrument::new();
        let dispatcher = Dispatcher::new();
        for line in ["{", r#"{"x":1}"#, r#"{"command":"jump"}"#] {
            let reply = dispatcher.process_line(&mut device, line).await;
            assert!(reply.error, "{line} should fail");
            assert!(!reply.close);
        }
        assert!(device.calls().lock().is_empty());
    }
}
