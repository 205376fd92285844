//! Relay device: forwards commands to a downstream OPI server.
//!
//! INITIALIZE carries the downstream `ip` and `port`; the relay connects,
//! forwards the initialize, and from then on passes every request through as
//! one JSON line and hands the downstream reply back unchanged. The relay
//! does not validate SETUP or PRESENT itself; the downstream server does.

use crate::error::{OpiError, OpiResult};
use crate::instrument::Device;
use crate::parameter::{Command, CommandTable, ParameterSpec};
use crate::protocol::{Args, Message, Packet};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const RELAY_INITIALIZE: &[ParameterSpec] = &[
    ParameterSpec::text("ip").describe("Address of the downstream OPI server."),
    ParameterSpec::number("port", 1.0, 65535.0).describe("Port of the downstream OPI server."),
];

static RELAY_COMMANDS: CommandTable = CommandTable {
    initialize: RELAY_INITIALIZE,
    ..CommandTable::EMPTY
};

/// Default bound on one downstream exchange.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(30);

struct Connection {
    peer: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn exchange(&mut self, message: &Message, limit: Duration) -> OpiResult<Packet> {
        let mut line = message.to_line();
        line.push('\n');
        let io = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await?;
            let mut reply = String::new();
            let n = self.reader.read_line(&mut reply).await?;
            Ok::<_, std::io::Error>((n, reply))
        };

        let (n, reply) = timeout(limit, io)
            .await
            .map_err(|_| {
                OpiError::DeviceCommunication(format!(
                    "{} did not answer {} within {:?}",
                    self.peer, message.command, limit
                ))
            })?
            .map_err(|e| OpiError::DeviceCommunication(format!("{}: {e}", self.peer)))?;
        if n == 0 {
            return Err(OpiError::DeviceCommunication(format!(
                "{} closed the connection",
                self.peer
            )));
        }
        debug!(peer = %self.peer, reply = reply.trim_end(), "Downstream reply");
        Packet::from_line(&reply)
            .map_err(|e| OpiError::DeviceCommunication(format!("{}: {e}", self.peer)))
    }
}

/// Forwards OPI requests to another OPI server.
pub struct Relay {
    connection: Option<Connection>,
    io_timeout: Duration,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_TIMEOUT)
    }
}

impl Relay {
    /// Relay whose downstream exchanges give up after `io_timeout`.
    pub fn new(io_timeout: Duration) -> Self {
        Self {
            connection: None,
            io_timeout,
        }
    }

    async fn forward(&mut self, command: Command, fields: Map<String, Value>) -> OpiResult<Packet> {
        let limit = self.io_timeout;
        let connection = self
            .connection
            .as_mut()
            .ok_or(OpiError::NotInitialized(command))?;
        let result = connection
            .exchange(&Message::new(command, fields), limit)
            .await;
        if let Err(e) = &result {
            warn!(error = %e, "Dropping downstream connection");
            self.connection = None;
        }
        result
    }
}

#[async_trait]
impl Device for Relay {
    fn name(&self) -> &str {
        "relay"
    }

    fn commands(&self) -> &'static CommandTable {
        &RELAY_COMMANDS
    }

    fn is_initialized(&self) -> bool {
        self.connection.is_some()
    }

    async fn query(&mut self) -> OpiResult<Packet> {
        if self.connection.is_none() {
            return Ok(Packet::ok(json!({
                "machine": self.name(),
                "initialized": false,
            })));
        }
        self.forward(Command::Query, Map::new()).await
    }

    async fn initialize(&mut self, args: &Args) -> OpiResult<Packet> {
        let ip = args.text("ip")?;
        let port = args.number("port")? as u16;
        let peer = format!("{ip}:{port}");

        let stream = timeout(self.io_timeout, TcpStream::connect(&peer))
            .await
            .map_err(|_| OpiError::DeviceCommunication(format!("Timed out connecting to {peer}")))?
            .map_err(|e| OpiError::DeviceCommunication(format!("Cannot connect to {peer}: {e}")))?;
        let (read_half, writer) = stream.into_split();
        self.connection = Some(Connection {
            peer: peer.clone(),
            reader: BufReader::new(read_half),
            writer,
        });
        info!(%peer, "Relay connected");

        let mut fields = args.fields().clone();
        fields.remove("ip");
        fields.remove("port");
        let reply = self.forward(Command::Initialize, fields).await?;
        if reply.error {
            warn!(%peer, msg = %reply.msg, "Downstream refused INITIALIZE; disconnecting");
            self.connection = None;
        }
        Ok(reply)
    }

    async fn setup(&mut self, args: &Args) -> OpiResult<Packet> {
        self.forward(Command::Setup, args.fields().clone()).await
    }

    async fn present(&mut self, args: &Args) -> OpiResult<Packet> {
        self.forward(Command::Present, args.fields().clone()).await
    }

    async fn close(&mut self) -> OpiResult<Packet> {
        let reply = self.forward(Command::Close, Map::new()).await;
        self.connection = None;
        info!("Relay disconnected");
        reply.map(|packet| Packet::ok_close(packet.msg))
    }
}
