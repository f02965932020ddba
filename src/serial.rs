//! # Serial Link
//!
//! The Modbus master talks to the field bus through [`SerialLink`]. A link is
//! opened for one request/response cycle and closed afterwards; while open,
//! received bytes are collected by the link and drained with
//! [`SerialLink::poll_read`] from the scheduler tick, which never blocks.
//!
//! - [`ScriptedLink`]: in-memory link replaying canned replies or computing
//!   them with a responder closure (tests, simulation)
//! - [`RtuLink`]: tokio-serial port with a per-cycle worker task
//!   (requires the `rtu` feature)

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

/// Byte transport to the meter
pub trait SerialLink {
    /// Start receiving. Bytes arriving before `open` are discarded.
    fn open(&mut self) -> GatewayResult<()>;

    /// Stop receiving and drop anything not yet read
    fn close(&mut self);

    /// Queue one complete RTU frame. Character and frame gaps are the link's job.
    fn transmit(&mut self, frame: &[u8]) -> GatewayResult<()>;

    /// Copy received bytes into `buf` without blocking; returns the count
    fn poll_read(&mut self, buf: &mut [u8]) -> usize;

    fn is_open(&self) -> bool;
}

/// Computes the reply to a transmitted frame; `None` means silence
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// In-memory serial link.
///
/// Replies are taken from the responder if one is installed, otherwise from
/// the queue filled with [`push_reply`](Self::push_reply) and
/// [`push_silence`](Self::push_silence). An empty queue means silence.
#[derive(Default)]
pub struct ScriptedLink {
    open: bool,
    replies: VecDeque<Option<Vec<u8>>>,
    responder: Option<Responder>,
    pending: VecDeque<u8>,
    sent: Vec<Vec<u8>>,
    open_count: usize,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link that answers every frame through `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queue the reply to the next transmitted frame
    pub fn push_reply(&mut self, bytes: impl Into<Vec<u8>>) {
        self.replies.push_back(Some(bytes.into()));
    }

    /// Let the next transmitted frame go unanswered
    pub fn push_silence(&mut self) {
        self.replies.push_back(None);
    }

    /// Every frame transmitted so far
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// How many times the link was opened
    pub fn open_count(&self) -> usize {
        self.open_count
    }
}

impl fmt::Debug for ScriptedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedLink")
            .field("open", &self.open)
            .field("queued_replies", &self.replies.len())
            .field("has_responder", &self.responder.is_some())
            .field("pending", &self.pending.len())
            .field("sent", &self.sent.len())
            .finish()
    }
}

impl SerialLink for ScriptedLink {
    fn open(&mut self) -> GatewayResult<()> {
        self.open = true;
        self.open_count += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.pending.clear();
    }

    fn transmit(&mut self, frame: &[u8]) -> GatewayResult<()> {
        if !self.open {
            return Err(GatewayError::transport("serial link is closed"));
        }
        self.sent.push(frame.to_vec());
        let reply = match self.responder.as_mut() {
            Some(responder) => responder(frame),
            None => self.replies.pop_front().flatten(),
        };
        if let Some(reply) = reply {
            debug!("Scripted reply: {} bytes", reply.len());
            self.pending.extend(reply);
        }
        Ok(())
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        count
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ============================================================================
// RTU serial port
// ============================================================================

#[cfg(feature = "rtu")]
pub use rtu::RtuLink;

#[cfg(feature = "rtu")]
mod rtu {
    use std::time::Duration;

    use bytes::{Bytes, BytesMut};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_serial::{SerialPortBuilderExt, SerialStream};
    use tracing::{debug, warn};

    use super::SerialLink;
    use crate::config::GatewayConfig;
    use crate::error::{GatewayError, GatewayResult};

    struct Worker {
        frames: mpsc::UnboundedSender<Vec<u8>>,
        received: mpsc::UnboundedReceiver<Bytes>,
        handle: JoinHandle<()>,
    }

    /// Serial port link (8 data bits, even parity, 1 stop bit).
    ///
    /// `open` spawns a worker on the current tokio runtime that owns the
    /// port for the duration of one request/response cycle. The worker is
    /// the only writer of received bytes; the scheduler drains them from
    /// the channel in `poll_read`.
    pub struct RtuLink {
        path: String,
        baud_rate: u32,
        char_delay: Duration,
        frame_delay: Duration,
        worker: Option<Worker>,
        buffered: BytesMut,
    }

    impl RtuLink {
        pub fn new(path: impl Into<String>, config: &GatewayConfig) -> Self {
            Self {
                path: path.into(),
                baud_rate: config.baud_rate,
                char_delay: Duration::from_millis(config.char_delay_ms),
                frame_delay: Duration::from_millis(config.frame_delay_ms),
                worker: None,
                buffered: BytesMut::with_capacity(256),
            }
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl SerialLink for RtuLink {
        fn open(&mut self) -> GatewayResult<()> {
            if self.worker.is_some() {
                return Ok(());
            }
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| GatewayError::transport(format!("no tokio runtime: {e}")))?;
            let _guard = runtime.enter();
            let port = tokio_serial::new(&self.path, self.baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::Even)
                .stop_bits(tokio_serial::StopBits::One)
                .open_native_async()
                .map_err(|e| {
                    GatewayError::transport(format!("failed to open {}: {e}", self.path))
                })?;

            let (frames_tx, frames_rx) = mpsc::unbounded_channel();
            let (bytes_tx, bytes_rx) = mpsc::unbounded_channel();
            let handle = runtime.spawn(run_worker(
                port,
                frames_rx,
                bytes_tx,
                self.char_delay,
                self.frame_delay,
            ));
            debug!("RTU worker started on {}", self.path);
            self.worker = Some(Worker {
                frames: frames_tx,
                received: bytes_rx,
                handle,
            });
            Ok(())
        }

        fn close(&mut self) {
            if let Some(worker) = self.worker.take() {
                worker.handle.abort();
                debug!("RTU worker stopped on {}", self.path);
            }
            self.buffered.clear();
        }

        fn transmit(&mut self, frame: &[u8]) -> GatewayResult<()> {
            let worker = self
                .worker
                .as_ref()
                .ok_or_else(|| GatewayError::transport("serial link is closed"))?;
            worker
                .frames
                .send(frame.to_vec())
                .map_err(|_| GatewayError::transport("serial worker has exited"))
        }

        fn poll_read(&mut self, buf: &mut [u8]) -> usize {
            if let Some(worker) = self.worker.as_mut() {
                while let Ok(chunk) = worker.received.try_recv() {
                    self.buffered.extend_from_slice(&chunk);
                }
            }
            let count = buf.len().min(self.buffered.len());
            let chunk = self.buffered.split_to(count);
            buf[..count].copy_from_slice(&chunk);
            count
        }

        fn is_open(&self) -> bool {
            self.worker.is_some()
        }
    }

    impl Drop for RtuLink {
        fn drop(&mut self) {
            self.close();
        }
    }

    async fn run_worker(
        mut port: SerialStream,
        mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
        received: mpsc::UnboundedSender<Bytes>,
        char_delay: Duration,
        frame_delay: Duration,
    ) {
        let mut buf = BytesMut::with_capacity(256);
        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    tokio::time::sleep(frame_delay).await;
                    for byte in frame {
                        tokio::time::sleep(char_delay).await;
                        if let Err(e) = port.write_all(&[byte]).await {
                            warn!("RTU write failed: {}", e);
                            return;
                        }
                    }
                }
                read = port.read_buf(&mut buf) => {
                    match read {
                        Ok(0) => break,
                        Ok(_) => {
                            if received.send(buf.split().freeze()).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("RTU read failed: {}", e);
                            break;
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transmit_requires_open_link() {
        let mut link = ScriptedLink::new();
        assert!(link.transmit(&[0x01]).is_err());

        link.open().unwrap();
        assert!(link.transmit(&[0x01]).is_ok());
        assert_eq!(link.sent(), &[vec![0x01]]);
        assert_eq!(link.open_count(), 1);
    }

    #[test]
    fn test_replies_in_order() {
        let mut link = ScriptedLink::new();
        link.push_reply(vec![0xAA, 0xBB, 0xCC]);
        link.push_silence();
        link.open().unwrap();

        link.transmit(&[0x01]).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(link.poll_read(&mut buf), 2);
        assert_eq!(buf, [0xAA, 0xBB]);
        assert_eq!(link.poll_read(&mut buf), 1);
        assert_eq!(buf[0], 0xCC);

        link.transmit(&[0x02]).unwrap();
        assert_eq!(link.poll_read(&mut buf), 0);
    }

    #[test]
    fn test_close_drops_pending_bytes() {
        let mut link = ScriptedLink::new();
        link.push_reply(vec![0x01, 0x02]);
        link.open().unwrap();
        link.transmit(&[0x00]).unwrap();
        link.close();

        let mut buf = [0u8; 4];
        assert_eq!(link.poll_read(&mut buf), 0);
        assert!(!link.is_open());
    }

    #[test]
    fn test_responder_echo() {
        let mut link = ScriptedLink::with_responder(|frame| Some(frame.to_vec()));
        link.open().unwrap();
        link.transmit(&[0x01, 0x06]).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(link.poll_read(&mut buf), 2);
        assert_eq!(&buf[..2], &[0x01, 0x06]);
    }
}
