use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::channel::changed_leaves;
use crate::channel::transport::{Transport, TransportError, TransportFactory};
use crate::emit::channel::ChannelOptions;
use crate::layout::FieldLayout;
use crate::protocol::{ChannelRole, ConnectionState, Frame, StatusCode};
use crate::target::ContextSpec;

const HANDSHAKE_YIELD: Duration = Duration::from_millis(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("channel {channel}: handshake timed out after {timeout_ms} ms")]
    HandshakeTimeout { channel: String, timeout_ms: u32 },

    #[error("channel {channel}: peer layout {peer_fingerprint:016x} rejected")]
    Rejected {
        channel: String,
        peer_fingerprint: u64,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("channel {channel}: closed by peer")]
    PeerClosed { channel: String },

    #[error("operation not allowed in state {state:?}")]
    InvalidState { state: ConnectionState },

    #[error("channel {channel}: handshake cancelled")]
    Cancelled { channel: String },
}

impl ConnectionError {
    /// Status the generated C entry points return for the same failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ConnectionError::HandshakeTimeout { .. }
            | ConnectionError::PeerClosed { .. }
            | ConnectionError::Cancelled { .. } => StatusCode::ErrConnection,
            ConnectionError::Rejected { .. } => StatusCode::ErrRejected,
            ConnectionError::Transport(_) => StatusCode::ErrTransport,
            ConnectionError::InvalidState { .. } => StatusCode::ErrState,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldAccessError {
    #[error("no leaf field {path}")]
    UnknownField { path: String },

    #[error("field {path} is {expected} bytes, got {actual}")]
    SizeMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("subscriber mirror is read-only")]
    ReadOnly,
}

/// Lets another thread abandon an in-flight handshake.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One side of a channel, driven the way the generated C drives it.
pub struct ChannelEndpoint<F: TransportFactory> {
    channel: String,
    alias: String,
    role: ChannelRole,
    layout: FieldLayout,
    options: ChannelOptions,
    factory: F,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    value: Vec<u8>,
    previous: Vec<u8>,
    changed: Vec<bool>,
    cancel: CancelHandle,
}

impl<F: TransportFactory> ChannelEndpoint<F> {
    pub fn new(layout: FieldLayout, context: &ContextSpec, options: ChannelOptions, factory: F) -> Self {
        let size = layout.size as usize;
        let leaves = layout.leaves.len();
        ChannelEndpoint {
            channel: layout.type_name.clone(),
            alias: context.alias.clone(),
            role: context.role,
            layout,
            options,
            factory,
            transport: None,
            state: ConnectionState::Uninitialized,
            value: vec![0; size],
            previous: vec![0; size],
            changed: vec![false; leaves],
            cancel: CancelHandle::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Opens the transport and runs the bounded handshake.
    pub fn init(&mut self) -> Result<(), ConnectionError> {
        if !matches!(
            self.state,
            ConnectionState::Uninitialized | ConnectionState::Aborted
        ) {
            return Err(ConnectionError::InvalidState { state: self.state });
        }
        self.value.fill(0);
        self.previous.fill(0);
        self.changed.fill(false);
        self.cancel.clear();

        let transport = match self.factory.open(&self.channel, &self.alias, self.role) {
            Ok(t) => t,
            Err(err) => {
                self.state = ConnectionState::Aborted;
                return Err(err.into());
            }
        };
        self.transport = Some(transport);
        self.state = ConnectionState::Connecting;
        tracing::debug!(
            channel = %self.channel,
            alias = %self.alias,
            role = self.role.as_str(),
            "handshake started"
        );

        let result = match self.role {
            ChannelRole::Publisher => self.handshake_publisher(),
            ChannelRole::Subscriber => self.handshake_subscriber(),
        };
        match result {
            Ok(()) => {
                self.state = ConnectionState::Operational;
                tracing::info!(
                    channel = %self.channel,
                    role = self.role.as_str(),
                    fingerprint = %self.layout.fingerprint,
                    "channel operational"
                );
                Ok(())
            }
            Err(err @ ConnectionError::Cancelled { .. }) => {
                self.release();
                self.state = ConnectionState::Uninitialized;
                Err(err)
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    pub fn cyclic_update(&mut self) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Operational {
            return Err(ConnectionError::InvalidState { state: self.state });
        }
        let result = match self.role {
            ChannelRole::Publisher => self.publish(),
            ChannelRole::Subscriber => self.receive(),
        };
        if let Err(err) = &result {
            self.abort(err);
        }
        result
    }

    /// Always succeeds; from `Aborted` it only resets the state.
    pub fn terminate(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Uninitialized => return Ok(()),
            ConnectionState::Aborted => {
                self.state = ConnectionState::Uninitialized;
                return Ok(());
            }
            _ => {}
        }
        self.state = ConnectionState::Disconnecting;
        if let Some(t) = self.transport.as_mut() {
            if let Err(err) = t.send(&Frame::Bye.encode()) {
                tracing::debug!(channel = %self.channel, error = %err, "bye not delivered");
            }
        }
        self.release();
        self.changed.fill(false);
        self.state = ConnectionState::Uninitialized;
        tracing::debug!(channel = %self.channel, role = self.role.as_str(), "terminated");
        Ok(())
    }

    /// Whether the leaf at `path` changed in the last cyclic update.
    pub fn changed(&self, path: &str) -> Option<bool> {
        let idx = self.layout.leaves.iter().position(|l| l.path == path)?;
        self.changed.get(idx).copied()
    }

    pub fn changed_paths(&self) -> Vec<&str> {
        self.layout
            .leaves
            .iter()
            .zip(&self.changed)
            .filter(|(_, c)| **c)
            .map(|(l, _)| l.path.as_str())
            .collect()
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn read_field(&self, path: &str) -> Option<&[u8]> {
        let leaf = self.layout.leaf(path)?;
        let start = leaf.offset as usize;
        self.value.get(start..start + leaf.size as usize)
    }

    pub fn write_field(&mut self, path: &str, bytes: &[u8]) -> Result<(), FieldAccessError> {
        if self.role == ChannelRole::Subscriber {
            return Err(FieldAccessError::ReadOnly);
        }
        let leaf = self
            .layout
            .leaf(path)
            .ok_or_else(|| FieldAccessError::UnknownField {
                path: path.to_string(),
            })?;
        if bytes.len() != leaf.size as usize {
            return Err(FieldAccessError::SizeMismatch {
                path: path.to_string(),
                expected: leaf.size as usize,
                actual: bytes.len(),
            });
        }
        let start = leaf.offset as usize;
        self.value[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn handshake_publisher(&mut self) -> Result<(), ConnectionError> {
        let fingerprint = self.layout.fingerprint_u64();
        let announce = Frame::Announce {
            fingerprint,
            size: self.layout.size,
        };
        let started = Instant::now();
        let interval = Duration::from_millis(u64::from(self.options.announce_interval_ms));
        let mut last_announce = started;
        self.send(&announce)?;

        loop {
            if self.cancel.take() {
                return Err(self.cancelled());
            }
            match self.poll_raw()? {
                Some(raw) => match Frame::decode(&raw) {
                    Some(Frame::Ack { fingerprint: fp }) if fp == fingerprint => return Ok(()),
                    Some(Frame::Ack { fingerprint: fp }) | Some(Frame::Reject { fingerprint: fp }) => {
                        return Err(ConnectionError::Rejected {
                            channel: self.channel.clone(),
                            peer_fingerprint: fp,
                        });
                    }
                    _ => {}
                },
                None => thread::sleep(HANDSHAKE_YIELD),
            }
            self.check_deadline(started)?;
            let now = Instant::now();
            if now.duration_since(last_announce) >= interval {
                self.send(&announce)?;
                last_announce = now;
            }
        }
    }

    fn handshake_subscriber(&mut self) -> Result<(), ConnectionError> {
        let started = Instant::now();
        loop {
            if self.cancel.take() {
                return Err(self.cancelled());
            }
            match self.poll_raw()? {
                Some(raw) => {
                    if let Some(Frame::Announce { fingerprint, size }) = Frame::decode(&raw) {
                        return self.answer_announce(fingerprint, size);
                    }
                }
                None => thread::sleep(HANDSHAKE_YIELD),
            }
            self.check_deadline(started)?;
        }
    }

    /// ACKs a matching announcement, REJECTs anything else.
    fn answer_announce(&mut self, fingerprint: u64, size: u32) -> Result<(), ConnectionError> {
        let ours = self.layout.fingerprint_u64();
        if fingerprint == ours && size == self.layout.size {
            return self.send(&Frame::Ack { fingerprint: ours });
        }
        tracing::warn!(
            channel = %self.channel,
            ours = %self.layout.fingerprint,
            theirs = %format!("{fingerprint:016x}"),
            size,
            "layout mismatch"
        );
        let _ = self.send(&Frame::Reject { fingerprint: ours });
        Err(ConnectionError::Rejected {
            channel: self.channel.clone(),
            peer_fingerprint: fingerprint,
        })
    }

    fn publish(&mut self) -> Result<(), ConnectionError> {
        while let Some(raw) = self.poll_raw()? {
            match Frame::decode(&raw) {
                Some(Frame::Bye) => return Err(self.peer_closed()),
                Some(Frame::Reject { fingerprint }) => {
                    return Err(ConnectionError::Rejected {
                        channel: self.channel.clone(),
                        peer_fingerprint: fingerprint,
                    });
                }
                _ => {}
            }
        }
        self.changed = changed_leaves(&self.layout, &self.value, &self.previous);
        self.send(&Frame::Data(self.value.clone()))?;
        self.previous.copy_from_slice(&self.value);
        Ok(())
    }

    fn receive(&mut self) -> Result<(), ConnectionError> {
        let mut newest: Option<Vec<u8>> = None;
        while let Some(raw) = self.poll_raw()? {
            match Frame::decode(&raw) {
                Some(Frame::Data(bytes)) if bytes.len() == self.value.len() => newest = Some(bytes),
                Some(Frame::Announce { fingerprint, size }) => self.answer_announce(fingerprint, size)?,
                Some(Frame::Bye) => return Err(self.peer_closed()),
                _ => {}
            }
        }
        match newest {
            Some(bytes) => {
                self.changed = changed_leaves(&self.layout, &bytes, &self.value);
                self.previous = std::mem::replace(&mut self.value, bytes);
            }
            None => self.changed.fill(false),
        }
        Ok(())
    }

    fn check_deadline(&self, started: Instant) -> Result<(), ConnectionError> {
        let timeout = Duration::from_millis(u64::from(self.options.handshake_timeout_ms));
        if started.elapsed() >= timeout {
            return Err(ConnectionError::HandshakeTimeout {
                channel: self.channel.clone(),
                timeout_ms: self.options.handshake_timeout_ms,
            });
        }
        Ok(())
    }

    fn transport(&mut self) -> Result<&mut Box<dyn Transport>, ConnectionError> {
        let state = self.state;
        self.transport
            .as_mut()
            .ok_or(ConnectionError::InvalidState { state })
    }

    fn send(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        self.transport()?.send(&frame.encode())?;
        Ok(())
    }

    fn poll_raw(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        Ok(self.transport()?.poll()?)
    }

    fn release(&mut self) {
        if let Some(mut t) = self.transport.take() {
            t.close();
        }
    }

    fn abort(&mut self, err: &ConnectionError) {
        tracing::warn!(
            channel = %self.channel,
            role = self.role.as_str(),
            error = %err,
            "channel aborted"
        );
        self.release();
        self.state = ConnectionState::Aborted;
    }

    fn cancelled(&self) -> ConnectionError {
        ConnectionError::Cancelled {
            channel: self.channel.clone(),
        }
    }

    fn peer_closed(&self) -> ConnectionError {
        ConnectionError::PeerClosed {
            channel: self.channel.clone(),
        }
    }
}

impl<F: TransportFactory> Drop for ChannelEndpoint<F> {
    fn drop(&mut self) {
        self.release();
    }
}
