//! # Client Session Table
//!
//! Fixed-capacity table of WebSocket client sessions. Each session owns two
//! bounded ring buffers of text messages (inbound and outbound) that are only
//! touched by the scheduler, plus the bookkeeping used for authentication,
//! fairness and idle eviction.
//!
//! ## Registration
//!
//! A handshake claims the first free slot and receives a monotonically
//! increasing entry number. A full table does not reject the connection;
//! instead the live session with the smallest entry number becomes the
//! eviction candidate and is sent a close notice on its next send turn.

use heapless::Deque;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::constants::{MAX_BYSTANDERS, MAX_MESSAGE_LEN, QUEUE_DEPTH};
use crate::error::{GatewayError, GatewayResult};

/// Socket descriptor handed out by the WebSocket server
pub type SocketId = i32;

/// Access tier granted by a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessLevel {
    #[default]
    Supervisor,
    Administrator,
}

impl AccessLevel {
    /// Value persisted in the settings store
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Supervisor => "0",
            Self::Administrator => "1",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => Self::Administrator,
            _ => Self::Supervisor,
        }
    }

    /// Name used in JSON views
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Administrator => "administrator",
        }
    }
}

// ============================================================================
// Message queue
// ============================================================================

/// Bounded FIFO of text messages
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    inner: Deque<String, QUEUE_DEPTH>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Fails when full or when the message is too long.
    pub fn push(&mut self, message: impl Into<String>) -> GatewayResult<()> {
        let message = message.into();
        if message.len() > MAX_MESSAGE_LEN {
            return Err(GatewayError::invalid_data(format!(
                "message of {} bytes exceeds {}",
                message.len(),
                MAX_MESSAGE_LEN
            )));
        }
        self.inner.push_back(message).map_err(|_| GatewayError::QueueFull {
            capacity: QUEUE_DEPTH,
        })
    }

    #[inline]
    pub fn pop(&mut self) -> Option<String> {
        self.inner.pop_front()
    }

    #[inline]
    pub fn front(&self) -> Option<&String> {
        self.inner.front()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Queued messages, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.inner.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }
}

// ============================================================================
// Session
// ============================================================================

/// One-shot acknowledgements of the views pushed during startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmFlags {
    pub rdmeter: bool,
    pub setting: bool,
    pub wrmeter: bool,
    pub infor: bool,
    pub inform: bool,
}

/// One WebSocket client
#[derive(Debug, Clone)]
pub struct Session {
    pub fd: SocketId,
    /// Plain HTTP sockets of the same browser tab, closed with the session
    pub bystanders: heapless::Vec<SocketId, MAX_BYSTANDERS>,
    /// Key presented in the last authenticated message
    pub key: u32,
    pub authenticated: bool,
    pub access: AccessLevel,
    pub in_count: u32,
    pub out_count: u32,
    pub last_inbound_ms: u64,
    pub last_outbound_ms: u64,
    pub last_heartbeat_ms: u64,
    /// Startup handshake finished; heartbeats may flow
    pub startup_done: bool,
    /// A bulk state dump is in progress
    pub get_started: bool,
    pub confirmed: ConfirmFlags,
    /// A message was sent and no inbound traffic has arrived since
    pub awaiting_response: bool,
    pub outbound: MessageQueue,
    pub inbound: MessageQueue,
    pub wants_electrical: bool,
    pub wants_infoconfig: bool,
    /// Registration sequence number
    pub entry_number: u64,
}

impl Session {
    pub fn new(fd: SocketId, entry_number: u64, now_ms: u64) -> Self {
        Self {
            fd,
            bystanders: heapless::Vec::new(),
            key: 0,
            authenticated: false,
            access: AccessLevel::Supervisor,
            in_count: 0,
            out_count: 0,
            last_inbound_ms: now_ms,
            last_outbound_ms: now_ms,
            last_heartbeat_ms: now_ms,
            startup_done: false,
            get_started: false,
            confirmed: ConfirmFlags::default(),
            awaiting_response: false,
            outbound: MessageQueue::new(),
            inbound: MessageQueue::new(),
            wants_electrical: false,
            wants_infoconfig: false,
            entry_number,
        }
    }

    /// Queue an outbound message, logging when it has to be dropped
    pub fn queue(&mut self, message: impl Into<String>) {
        if let Err(e) = self.outbound.push(message) {
            warn!("Session {}: outbound message dropped: {}", self.fd, e);
        }
    }

    /// Drop queued outbound messages and the pending electrical push
    pub fn reset_outbound(&mut self) {
        self.outbound.clear();
        self.wants_electrical = false;
    }

    pub fn reset_inbound(&mut self) {
        self.inbound.clear();
    }

    pub fn is_administrator(&self) -> bool {
        self.authenticated && self.access == AccessLevel::Administrator
    }
}

// ============================================================================
// Session table
// ============================================================================

/// Result of a handshake registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Accepted { slot: usize },
    /// No free slot; the connection stays open without a session
    Overflow,
}

/// Recipients of a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    AllExcept(SocketId),
}

#[derive(Debug, Clone)]
pub struct SessionTable {
    slots: Vec<Option<Session>>,
    next_entry: u64,
    evict_candidate: Option<SocketId>,
    inbound_cursor: usize,
    outbound_cursor: usize,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            next_entry: 0,
            evict_candidate: None,
            inbound_cursor: 0,
            outbound_cursor: 0,
        }
    }

    /// Claim the first free slot for `fd`.
    ///
    /// When the table is full afterwards and no candidate is pending, the
    /// oldest live session is marked for a close notice.
    pub fn register(&mut self, fd: SocketId, bystanders: &[SocketId], now_ms: u64) -> Registration {
        let registration = match self.slots.iter().position(Option::is_none) {
            Some(slot) => {
                let mut session = Session::new(fd, self.next_entry, now_ms);
                self.next_entry += 1;
                for &bystander in bystanders.iter().take(MAX_BYSTANDERS) {
                    let _ = session.bystanders.push(bystander);
                }
                info!(
                    "Session {} registered in slot {} (entry {})",
                    fd, slot, session.entry_number
                );
                self.slots[slot] = Some(session);
                Registration::Accepted { slot }
            }
            None => {
                warn!("Session table full, socket {} left unregistered", fd);
                Registration::Overflow
            }
        };

        if self.is_full() && self.evict_candidate.is_none() {
            self.evict_candidate = self.oldest().map(|session| session.fd);
            if let Some(candidate) = self.evict_candidate {
                info!("Session {} marked for close notice", candidate);
            }
        }
        registration
    }

    fn oldest(&self) -> Option<&Session> {
        self.iter().min_by_key(|session| session.entry_number)
    }

    /// Remove the session for `fd`, returning it so the caller can close its sockets
    pub fn remove(&mut self, fd: SocketId) -> Option<Session> {
        let slot = self.slot_of(fd)?;
        let session = self.slots[slot].take();
        if self.evict_candidate == Some(fd) {
            self.evict_candidate = None;
        }
        debug!("Session {} removed from slot {}", fd, slot);
        session
    }

    pub fn slot_of(&self, fd: SocketId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|session| session.fd == fd))
    }

    pub fn get(&self, fd: SocketId) -> Option<&Session> {
        self.iter().find(|session| session.fd == fd)
    }

    pub fn get_mut(&mut self, fd: SocketId) -> Option<&mut Session> {
        self.iter_mut().find(|session| session.fd == fd)
    }

    #[inline]
    pub fn slot(&self, slot: usize) -> Option<&Session> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[inline]
    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut Session> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.slots.iter_mut().flatten()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Live authenticated administrator sessions
    pub fn administrators(&self) -> usize {
        self.iter().filter(|session| session.is_administrator()).count()
    }

    #[inline]
    pub fn evict_candidate(&self) -> Option<SocketId> {
        self.evict_candidate
    }

    /// Forget the candidate once its close notice went out
    pub fn clear_evict_candidate(&mut self) {
        self.evict_candidate = None;
    }

    /// Queue a received text message for later processing
    pub fn enqueue_inbound(&mut self, fd: SocketId, text: &str) -> GatewayResult<()> {
        let session = self
            .get_mut(fd)
            .ok_or_else(|| GatewayError::protocol(format!("no session for socket {fd}")))?;
        session.inbound.push(text)
    }

    /// Queue `message` on every session in `audience`
    pub fn broadcast(&mut self, audience: Audience, message: &str) {
        for session in self.iter_mut() {
            if audience == Audience::AllExcept(session.fd) {
                continue;
            }
            session.queue(message);
        }
    }

    /// Slot whose inbound queue is served this tick; advances round-robin
    pub fn next_inbound_slot(&mut self) -> usize {
        let slot = self.inbound_cursor;
        self.inbound_cursor = (self.inbound_cursor + 1) % self.capacity().max(1);
        slot
    }

    /// Next occupied slot at or after the outbound cursor; the cursor moves
    /// past it so freed slots never consume a send opportunity
    pub fn next_outbound_slot(&mut self) -> Option<usize> {
        let capacity = self.capacity();
        let slot = (0..capacity)
            .map(|offset| (self.outbound_cursor + offset) % capacity)
            .find(|&slot| self.slots[slot].is_some())?;
        self.outbound_cursor = (slot + 1) % capacity;
        Some(slot)
    }

    /// Sessions silent in both directions for longer than the idle timeout
    pub fn idle_sessions(
        &self,
        now_ms: u64,
        config: &GatewayConfig,
    ) -> impl Iterator<Item = SocketId> + '_ {
        let config = *config;
        self.iter()
            .filter(move |session| {
                config.is_idle(
                    now_ms.saturating_sub(session.last_inbound_ms),
                    now_ms.saturating_sub(session.last_outbound_ms),
                )
            })
            .map(|session| session.fd)
    }
}

// ============================================================================
// Tests
// ============================================================================
