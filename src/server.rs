//! WebSocket server seam
//!
//! Framing, handshakes and HTTP routing belong to the hosting server. The
//! gateway only needs to push text frames, close sockets and move the
//! per-key WebSocket endpoints around.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::session::SocketId;

/// Outbound side of the WebSocket server
pub trait WsSink {
    /// Send one text frame to `fd`
    fn send_text(&mut self, fd: SocketId, text: &str) -> GatewayResult<()>;

    /// Close the socket `fd`
    fn close(&mut self, fd: SocketId);
}

/// Dynamic endpoint routing (`/ws<key>`)
pub trait EndpointRegistry {
    fn register_endpoint(&mut self, path: &str) -> GatewayResult<()>;

    fn unregister_endpoint(&mut self, path: &str);
}

/// In-memory server that records everything the gateway does
#[derive(Debug, Default)]
pub struct RecordingServer {
    sent: Vec<(SocketId, String)>,
    closed: Vec<SocketId>,
    endpoints: Vec<String>,
    unreachable: HashSet<SocketId>,
}

impl RecordingServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame sent so far, in order
    pub fn sent(&self) -> &[(SocketId, String)] {
        &self.sent
    }

    /// Frames sent to `fd`
    pub fn sent_to(&self, fd: SocketId) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|(to, _)| *to == fd)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    /// Take and clear the sent log
    pub fn take_sent(&mut self) -> Vec<(SocketId, String)> {
        std::mem::take(&mut self.sent)
    }

    pub fn closed(&self) -> &[SocketId] {
        &self.closed
    }

    /// Currently registered endpoints
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Make sends to `fd` fail until [`restore`](Self::restore)
    pub fn make_unreachable(&mut self, fd: SocketId) {
        self.unreachable.insert(fd);
    }

    pub fn restore(&mut self, fd: SocketId) {
        self.unreachable.remove(&fd);
    }
}

impl WsSink for RecordingServer {
    fn send_text(&mut self, fd: SocketId, text: &str) -> GatewayResult<()> {
        if self.unreachable.contains(&fd) || self.closed.contains(&fd) {
            return Err(GatewayError::transport(format!("socket {fd} unreachable")));
        }
        debug!("WS {} <- {} bytes", fd, text.len());
        self.sent.push((fd, text.to_string()));
        Ok(())
    }

    fn close(&mut self, fd: SocketId) {
        if !self.closed.contains(&fd) {
            self.closed.push(fd);
        }
    }
}

impl EndpointRegistry for RecordingServer {
    fn register_endpoint(&mut self, path: &str) -> GatewayResult<()> {
        if self.endpoints.iter().any(|p| p == path) {
            return Err(GatewayError::transport(format!("endpoint {path} already registered")));
        }
        self.endpoints.push(path.to_string());
        Ok(())
    }

    fn unregister_endpoint(&mut self, path: &str) {
        self.endpoints.retain(|p| p != path);
    }
}
