//! A mock instrument that answers every command directly.
//!
//! No presentation engine is involved: PRESENT returns at once with a
//! deterministic result (seen when the luminance reaches the threshold). Every
//! handler call is recorded so dispatch behaviour can be asserted.
use crate::error::OpiResult;
use crate::instrument::Device;
use crate::parameter::{Command, CommandTable, ParameterSpec};
use crate::protocol::{Args, Packet};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const MOCK_SETUP: &[ParameterSpec] = &[ParameterSpec::number("bgLum", 0.0, 3183.099)
    .optional()
    .describe("Background luminance (cd/m^2).")];

const MOCK_PRESENT: &[ParameterSpec] = &[
    ParameterSpec::number("x", -30.0, 30.0).describe("x co-ordinate of stimulus (degrees)."),
    ParameterSpec::number("y", -30.0, 30.0).describe("y co-ordinate of stimulus (degrees)."),
    ParameterSpec::number("lum", 0.0, 3183.099).describe("Stimulus luminance (cd/m^2)."),
    ParameterSpec::number("t", 0.0, 10_000.0).describe("Presentation time (ms)."),
    ParameterSpec::number("w", 0.0, 10_000.0).describe("Response window (ms)."),
];

static MOCK_COMMANDS: CommandTable = CommandTable {
    setup: MOCK_SETUP,
    present: MOCK_PRESENT,
    ..CommandTable::EMPTY
};

/// Reaction time reported for seen stimuli (ms).
const MOCK_REACTION_MS: f64 = 300.0;

/// Device double that replies without any hardware.
pub struct MockInstrument {
    initialized: bool,
    threshold: f64,
    calls: Arc<Mutex<Vec<Command>>>,
}

impl Default for MockInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInstrument {
    /// Mock that sees everything at or above 10 cd/m^2.
    pub fn new() -> Self {
        Self::with_threshold(10.0)
    }

    /// Mock with a custom luminance threshold.
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            initialized: false,
            threshold,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared log of handler invocations.
    pub fn calls(&self) -> Arc<Mutex<Vec<Command>>> {
        self.calls.clone()
    }

    fn record(&self, command: Command) {
        self.calls.lock().push(command);
    }
}

#[async_trait]
impl Device for MockInstrument {
    fn name(&self) -> &str {
        "mock"
    }

    fn commands(&self) -> &'static CommandTable {
        &MOCK_COMMANDS
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    async fn query(&mut self) -> OpiResult<Packet> {
        self.record(Command::Query);
        Ok(Packet::ok(json!({
            "machine": self.name(),
            "initialized": self.initialized,
            "threshold": self.threshold,
        })))
    }

    async fn initialize(&mut self, _args: &Args) -> OpiResult<Packet> {
        self.record(Command::Initialize);
        info!("Mock instrument initialized");
        self.initialized = true;
        Ok(Packet::ok(json!({"machine": self.name()})))
    }

    async fn setup(&mut self, args: &Args) -> OpiResult<Packet> {
        self.record(Command::Setup);
        let bg_lum = args.opt_number("bgLum")?.unwrap_or(10.0);
        Ok(Packet::ok(json!({"bgLum": bg_lum})))
    }

    async fn present(&mut self, args: &Args) -> OpiResult<Packet> {
        self.record(Command::Present);
        let lum = args.number("lum")?;
        let window = args.number("w")?;
        let seen = lum >= self.threshold;
        let time = if seen {
            MOCK_REACTION_MS.min(window)
        } else {
            window
        };
        Ok(Packet::ok(json!({"seen": seen, "time": time.round() as u64})))
    }

    async fn close(&mut self) -> OpiResult<Packet> {
        self.record(Command::Close);
        info!("Mock instrument closed");
        self.initialized = false;
        Ok(Packet::ok_close(json!({"machine": self.name()})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    fn args(line: &str) -> Args {
        Message::decode(line).unwrap().into_args()
    }

    #[tokio::test]
    async fn test_present_threshold() {
        let mut mock = MockInstrument::with_threshold(50.0);
        mock.initialize(&Args::default()).await.unwrap();

        let bright = mock
            .present(&args(r#"{"command":"PRESENT","x":0,"y":0,"lum":80,"t":200,"w":1500}"#))
            .await
            .unwrap();
        assert_eq!(bright.msg["seen"], true);
        assert_eq!(bright.msg["time"], 300);

        let dim = mock
            .present(&args(r#"{"command":"PRESENT","x":0,"y":0,"lum":20,"t":200,"w":1500}"#))
            .await
            .unwrap();
        assert_eq!(dim.msg["seen"], false);
        assert_eq!(dim.msg["time"], 1500);
    }

    #[tokio::test]
    async fn test_close_sets_flag_and_uninitializes() {
        let mut mock = MockInstrument::new();
        mock.initialize(&Args::default()).await.unwrap();
        let reply = mock.close().await.unwrap();
        assert!(reply.close);
        assert!(!mock.is_initialized());
        assert_eq!(
            mock.calls().lock().as_slice(),
            &[Command::Initialize, Command::Close]
        );
    }
}
