use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::protocol::ChannelRole;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport: {0}")]
pub struct TransportError(pub String);

/// One opened side of a named channel. `poll` never blocks.
pub trait Transport: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
    fn poll(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
    fn close(&mut self);
}

pub trait TransportFactory {
    fn open(
        &self,
        channel: &str,
        alias: &str,
        role: ChannelRole,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

#[derive(Default)]
struct BusState {
    /// Inbound frames keyed by channel and receiving role.
    queues: BTreeMap<(String, ChannelRole), VecDeque<Vec<u8>>>,
    broken: BTreeSet<String>,
    opens: BTreeMap<String, usize>,
    closes: BTreeMap<String, usize>,
}

/// In-memory bus connecting the two sides of each named channel.
///
/// Cloning shares the bus. Tests use [`LoopbackBus::break_channel`] to make
/// every later operation on a channel fail.
#[derive(Clone, Default)]
pub struct LoopbackBus {
    state: Arc<Mutex<BusState>>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BusState>, TransportError> {
        lock(&self.state)
    }

    pub fn break_channel(&self, channel: &str) {
        if let Ok(mut st) = self.lock() {
            st.broken.insert(channel.to_string());
        }
    }

    /// Frames waiting to be polled by `role` on `channel`.
    pub fn pending(&self, channel: &str, role: ChannelRole) -> usize {
        self.lock()
            .ok()
            .and_then(|st| st.queues.get(&(channel.to_string(), role)).map(VecDeque::len))
            .unwrap_or(0)
    }

    /// Injects a raw frame as if the peer of `to` had sent it.
    pub fn inject(&self, channel: &str, to: ChannelRole, frame: Vec<u8>) {
        if let Ok(mut st) = self.lock() {
            st.queues
                .entry((channel.to_string(), to))
                .or_default()
                .push_back(frame);
        }
    }

    /// Transports opened on `channel` that have not been closed.
    pub fn open_transports(&self, channel: &str) -> usize {
        self.lock()
            .map(|st| {
                let opened = st.opens.get(channel).copied().unwrap_or(0);
                let closed = st.closes.get(channel).copied().unwrap_or(0);
                opened.saturating_sub(closed)
            })
            .unwrap_or(0)
    }
}

fn lock(state: &Mutex<BusState>) -> Result<MutexGuard<'_, BusState>, TransportError> {
    state
        .lock()
        .map_err(|_| TransportError("loopback bus poisoned".to_string()))
}

impl TransportFactory for LoopbackBus {
    fn open(
        &self,
        channel: &str,
        alias: &str,
        role: ChannelRole,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut st = self.lock()?;
        if st.broken.contains(channel) {
            return Err(TransportError(format!("channel {channel} unavailable")));
        }
        // A fresh attach starts with an empty inbox.
        st.queues.insert((channel.to_string(), role), VecDeque::new());
        *st.opens.entry(channel.to_string()).or_default() += 1;
        tracing::trace!(channel, alias, role = role.as_str(), "loopback open");
        Ok(Box::new(LoopbackTransport {
            state: Arc::clone(&self.state),
            channel: channel.to_string(),
            role,
            closed: false,
        }))
    }
}

struct LoopbackTransport {
    state: Arc<Mutex<BusState>>,
    channel: String,
    role: ChannelRole,
    closed: bool,
}

impl LoopbackTransport {
    fn usable(&self, st: &BusState) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError("transport closed".to_string()));
        }
        if st.broken.contains(&self.channel) {
            return Err(TransportError(format!("channel {} broken", self.channel)));
        }
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut st = lock(&self.state)?;
        self.usable(&st)?;
        st.queues
            .entry((self.channel.clone(), self.role.peer()))
            .or_default()
            .push_back(frame.to_vec());
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut st = lock(&self.state)?;
        self.usable(&st)?;
        Ok(st
            .queues
            .get_mut(&(self.channel.clone(), self.role))
            .and_then(VecDeque::pop_front))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(mut st) = lock(&self.state) {
            *st.closes.entry(self.channel.clone()).or_default() += 1;
        }
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.close();
    }
}
