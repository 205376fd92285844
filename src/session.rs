//! Single-connection session server.
//!
//! A [`Session`] owns one listening socket and serves exactly one client:
//!
//! ```text
//!   LISTENING ──accept──▶ CONNECTED ──close reply / EOF / I/O error / shutdown──▶ CLOSED
//! ```
//!
//! The listener is dropped as soon as the client is accepted. Each inbound line
//! gets exactly one reply line. On the way out the device is interrupted and,
//! if still initialized, closed.

use crate::dispatch::Dispatcher;
use crate::error::OpiResult;
use crate::instrument::Device;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Bound on closing the device during teardown.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the client.
    Listening,
    /// Serving the client.
    Connected,
    /// Finished; socket and device released.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Listening => "LISTENING",
            SessionState::Connected => "CONNECTED",
            SessionState::Closed => "CLOSED",
        })
    }
}

/// One listening socket serving one client.
pub struct Session {
    id: Uuid,
    local_addr: SocketAddr,
    state: watch::Receiver<SessionState>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Bind `addr` and start serving `device` in the background.
    pub async fn bind(addr: impl ToSocketAddrs, device: Box<dyn Device>) -> OpiResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let id = Uuid::new_v4();
        let (state_tx, state) = watch::channel(SessionState::Listening);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let span = info_span!("session", %id, machine = device.name());
        let task = tokio::spawn(run(listener, device, state_tx, shutdown_rx).instrument(span));
        info!(%id, %local_addr, "Session listening");

        Ok(Self {
            id,
            local_addr,
            state,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// Session identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Address the listener was bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches CLOSED on its own or by shutdown.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // An error means the task is gone, which only happens after CLOSED.
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Stop the session and wait until its task has fully exited.
    ///
    /// Calling it again, or after the session closed on its own, is a no-op.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                error!(id = %self.id, error = %e, "Session task failed");
            }
        }
    }
}

/// Resolves once shutdown is requested or the owning [`Session`] is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run(
    listener: TcpListener,
    mut device: Box<dyn Device>,
    state: watch::Sender<SessionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let accepted = tokio::select! {
        accepted = listener.accept() => Some(accepted),
        _ = shutdown_requested(&mut shutdown) => None,
    };
    drop(listener);

    match accepted {
        Some(Ok((stream, peer))) => {
            info!(%peer, "Client connected");
            state.send_replace(SessionState::Connected);
            serve(stream, device.as_mut(), &mut shutdown).await;
        }
        Some(Err(e)) => error!(error = %e, "Accept failed"),
        None => info!("Shutdown before a client connected"),
    }

    teardown(device.as_mut()).await;
    state.send_replace(SessionState::Closed);
    info!("Session closed");
}

async fn serve(stream: TcpStream, device: &mut dyn Device, shutdown: &mut watch::Receiver<bool>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let dispatcher = Dispatcher::new();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown_requested(shutdown) => {
                info!("Shutdown requested");
                return;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Client disconnected");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = tokio::select! {
            reply = dispatcher.process_line(device, &line) => reply,
            _ = shutdown_requested(shutdown) => {
                info!("Shutdown requested while a command was running");
                return;
            }
        };
        debug!(error = reply.error, close = reply.close, "Reply");

        let mut out = reply.to_line();
        out.push('\n');
        let written = async {
            write_half.write_all(out.as_bytes()).await?;
            write_half.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "Write failed");
            return;
        }
        if reply.close {
            info!("Client closed the device");
            return;
        }
    }
}

async fn teardown(device: &mut dyn Device) {
    device.interrupt();
    if !device.is_initialized() {
        return;
    }
    match tokio::time::timeout(TEARDOWN_TIMEOUT, device.close()).await {
        Ok(Ok(_)) => info!("Device closed during teardown"),
        Ok(Err(e)) => warn!(error = %e, "Device close failed during teardown"),
        Err(_) => warn!("Device close timed out during teardown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::MockInstrument;
    use crate::parameter::Command;

    #[tokio::test]
    async fn test_shutdown_before_connect() {
        let session = Session::bind("127.0.0.1:0", Box::new(MockInstrument::new()))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Listening);
        assert_ne!(session.local_addr().port(), 0);

        session.shutdown().await;
        assert_eq!(session.state(), SessionState::Closed);
        session.shutdown().await;
        session.closed().await;
    }

    #[tokio::test]
    async fn test_listener_released_after_accept() {
        let session = Session::bind("127.0.0.1:0", Box::new(MockInstrument::new()))
            .await
            .unwrap();
        let addr = session.local_addr();
        let _client = TcpStream::connect(addr).await.unwrap();

        let mut state = session.state.clone();
        state
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(TcpStream::connect(addr).await.is_err());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_teardown_closes_initialized_device() {
        let device = MockInstrument::new();
        let calls = device.calls();
        let session = Session::bind("127.0.0.1:0", Box::new(device)).await.unwrap();

        let stream = TcpStream::connect(session.local_addr()).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        write_half
            .write_all(b"{\"command\":\"INITIALIZE\"}\n")
            .await
            .unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(reply.contains("\"error\":false"));

        drop(write_half);
        session.closed().await;
        session.shutdown().await;
        assert_eq!(
            calls.lock().as_slice(),
            &[Command::Initialize, Command::Close]
        );
    }
}
