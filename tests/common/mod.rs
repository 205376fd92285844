//! Shared helpers for session-level tests.

#![allow(dead_code)]

use rust_opi::config::DisplayConfig;
use rust_opi::host::UpdateLoop;
use rust_opi::instrument::display::Display;
use rust_opi::presentation::{EngineHandle, PresentationEngine, RecordingRenderer, SampleTiming};
use rust_opi::protocol::Packet;
use rust_opi::timing::SystemClock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Engine ticking on its own thread, with a recording renderer.
pub struct TestDisplay {
    pub handle: EngineHandle,
    pub renderer: RecordingRenderer,
    pub update_loop: UpdateLoop,
}

impl TestDisplay {
    pub fn start() -> Self {
        let renderer = RecordingRenderer::new();
        let (engine, handle) = PresentationEngine::new(
            renderer.clone(),
            Arc::new(SystemClock::new()),
            None,
            SampleTiming::default(),
        );
        let update_loop = UpdateLoop::spawn(engine, Duration::from_millis(2));
        Self {
            handle,
            renderer,
            update_loop,
        }
    }

    pub fn device(&self) -> Box<Display> {
        Box::new(Display::new(self.handle.clone(), DisplayConfig::default()))
    }
}

/// Line-oriented OPI client.
pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next reply, or None once the server hung up.
    pub async fn reply(&mut self) -> Option<Packet> {
        let line = tokio::time::timeout(Duration::from_secs(10), self.lines.next_line())
            .await
            .unwrap()
            .ok()??;
        Some(Packet::from_line(&line).unwrap())
    }

    pub async fn request(&mut self, line: &str) -> Packet {
        self.send(line).await;
        self.reply().await.unwrap()
    }
}
