use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;

use super::models::{ConnectionStatus, ManagerState, ScaleReading};
use super::parser::ParsedLine;
use crate::serial::SerialConfig;

#[derive(Debug)]
struct StoreInner {
    state: ManagerState,
    active_config: Option<SerialConfig>,
    packet_count: u64,
    last_reading: Option<Arc<ScaleReading>>,
}

/// Latest reading and connection metadata, shared between the reader task and API callers.
///
/// All fields sit behind one lock so a snapshot never pairs `connected = true` with a
/// missing `active_config`. Readings are stored as `Arc`s and swapped whole.
pub struct StatusStore {
    configured_port: String,
    configured_baudrate: u32,
    inner: RwLock<StoreInner>,
    reading_tx: watch::Sender<Option<Arc<ScaleReading>>>,
}

impl StatusStore {
    pub fn new(base: &SerialConfig) -> Self {
        let (reading_tx, _reading_rx) = watch::channel(None);
        Self {
            configured_port: base.port.clone(),
            configured_baudrate: base.baudrate,
            inner: RwLock::new(StoreInner {
                state: ManagerState::Idle,
                active_config: None,
                packet_count: 0,
                last_reading: None,
            }),
            reading_tx,
        }
    }

    /// Snapshot of the whole connection status
    pub fn current_status(&self) -> ConnectionStatus {
        let inner = self.read();
        ConnectionStatus {
            connected: inner.state == ManagerState::Connected,
            configured_port: self.configured_port.clone(),
            configured_baudrate: self.configured_baudrate,
            active_config: inner.active_config.clone(),
            packet_count: inner.packet_count,
            last_reading: inner.last_reading.as_deref().cloned(),
        }
    }

    pub fn current_reading(&self) -> Option<Arc<ScaleReading>> {
        self.read().last_reading.clone()
    }

    pub fn state(&self) -> ManagerState {
        self.read().state
    }

    /// Receiver that sees every new reading
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ScaleReading>>> {
        self.reading_tx.subscribe()
    }

    pub(crate) fn set_probing(&self) {
        let mut inner = self.write();
        inner.state = ManagerState::Probing;
        inner.active_config = None;
    }

    pub(crate) fn set_connected(&self, config: SerialConfig) {
        let mut inner = self.write();
        inner.state = ManagerState::Connected;
        inner.active_config = Some(config);
    }

    pub(crate) fn set_disconnected(&self, next: ManagerState) {
        let mut inner = self.write();
        inner.state = next;
        inner.active_config = None;
    }

    /// Account for one complete line. Bumps the packet count whether or not the line
    /// parsed; a parsed line also becomes the new reading. Returns the new packet count.
    pub(crate) fn record_line(&self, parsed: Option<ParsedLine>) -> u64 {
        let mut inner = self.write();
        inner.packet_count += 1;
        let sequence = inner.packet_count;

        if let Some(parsed) = parsed {
            let reading = Arc::new(ScaleReading::from_parsed(parsed, sequence));
            log::debug!(
                "Reading #{}: {} {} (stable={})",
                sequence,
                reading.weight_value,
                reading.unit,
                reading.stable
            );
            inner.last_reading = Some(reading.clone());
            self.reading_tx.send_replace(Some(reading));
        }

        sequence
    }

    // A poisoned lock only means a writer panicked mid-update of plain data; keep serving it.
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
