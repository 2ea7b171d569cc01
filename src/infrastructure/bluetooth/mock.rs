//! Simulated BLE transport
//!
//! Records every write with its (tokio) timestamp and lets callers inject
//! notifications and failures. Used by the demo binary and the tests.

use crate::error::TransportError;
use crate::infrastructure::bluetooth::protocol::DiscoveryFilter;
use crate::infrastructure::bluetooth::transport::Transport;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// A write captured by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub service: &'static str,
    pub characteristic: &'static str,
    pub bytes: Vec<u8>,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct WriteFailure {
    // Writes to let through before failing
    after: usize,
}

#[derive(Default)]
struct MockState {
    connected: bool,
    device_name: String,
    fail_connect: Option<String>,
    fail_notifications: Vec<&'static str>,
    fail_writes: HashMap<&'static str, WriteFailure>,
    subscribers: HashMap<&'static str, mpsc::UnboundedSender<Vec<u8>>>,
    writes: Vec<RecordedWrite>,
}

pub struct MockTransport {
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_device_name("RS_MOCK01")
    }

    /// Mock advertising under `device_name`; connect fails unless the
    /// discovery filter matches it
    pub fn with_device_name(device_name: &str) -> Self {
        Self {
            state: Mutex::new(MockState {
                device_name: device_name.to_string(),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_connect(&self, reason: &str) {
        self.lock().fail_connect = Some(reason.to_string());
    }

    pub fn fail_notifications(&self, characteristic: &'static str) {
        self.lock().fail_notifications.push(characteristic);
    }

    /// Fail writes to `characteristic` once `after` more writes went through
    pub fn fail_writes(&self, characteristic: &'static str, after: usize) {
        let mut state = self.lock();
        let already = state
            .writes
            .iter()
            .filter(|w| w.characteristic == characteristic)
            .count();
        state.fail_writes.insert(
            characteristic,
            WriteFailure {
                after: already + after,
            },
        );
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_connect = None;
        state.fail_notifications.clear();
        state.fail_writes.clear();
    }

    /// Push a notification to the subscriber of `characteristic`.
    ///
    /// Returns false when nobody is subscribed.
    pub fn notify(&self, characteristic: &'static str, bytes: Vec<u8>) -> bool {
        match self.lock().subscribers.get(characteristic) {
            Some(sender) => sender.send(bytes).is_ok(),
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    pub fn writes_to(&self, characteristic: &str) -> Vec<RecordedWrite> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.characteristic == characteristic)
            .cloned()
            .collect()
    }
}

impl Transport for MockTransport {
    async fn connect(&self, filter: &DiscoveryFilter) -> Result<(), TransportError> {
        let mut state = self.lock();
        if let Some(reason) = &state.fail_connect {
            return Err(TransportError::Connect(reason.clone()));
        }
        if !filter.matches(&state.device_name) {
            return Err(TransportError::Connect(format!(
                "No device matching {:?}",
                filter.name_prefixes
            )));
        }

        debug!("Mock connected to {}", state.device_name);
        state.connected = true;
        Ok(())
    }

    async fn start_notifications(
        &self,
        _service: &'static str,
        characteristic: &'static str,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_notifications.contains(&characteristic) {
            return Err(TransportError::Notify {
                characteristic: characteristic.to_string(),
                reason: "simulated failure".to_string(),
            });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.insert(characteristic, sender);
        Ok(receiver)
    }

    async fn write(
        &self,
        service: &'static str,
        characteristic: &'static str,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(failure) = state.fail_writes.get(characteristic).copied() {
            let written = state
                .writes
                .iter()
                .filter(|w| w.characteristic == characteristic)
                .count();
            if written >= failure.after {
                return Err(TransportError::Write {
                    characteristic: characteristic.to_string(),
                    reason: "simulated failure".to_string(),
                });
            }
        }

        debug!("Mock write to {}: {:02X?}", characteristic, bytes);
        state.writes.push(RecordedWrite {
            service,
            characteristic,
            bytes,
            at: Instant::now(),
        });
        Ok(())
    }
}
