use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::models::{ConnectionStatus, ManagerState, ScaleHealth, ScaleReading};
use super::parser::parse_scale_line;
use super::poller::spawn_poller;
use super::status::StatusStore;
use super::{Result, ScaleError};
use crate::config::ScaleSettings;
use crate::serial::{
    build_candidates, AvailablePort, LineAssembler, PortOpener, ScaleLink, SerialConfig, SerialError,
    SystemPorts,
};

/// The open device of one connection session. `None` while probing or after teardown.
pub(crate) type PortSlot = Arc<Mutex<Option<Box<dyn ScaleLink>>>>;

const READ_CHUNK_SIZE: usize = 1024;
const READ_POLL_STEP: Duration = Duration::from_millis(10);
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One running supervisor and the handles needed to stop it
struct Session {
    cancel_tx: watch::Sender<bool>,
    slot: PortSlot,
    task: JoinHandle<()>,
}

/// Keeps one scale indicator connected for as long as it is started.
///
/// `start()` spawns a supervising task that probes candidate line settings until one opens,
/// reads and parses lines while connected, and after any failure waits the reconnect
/// interval and probes again. Only `stop()` ends it. Status and readings are available at
/// any time through the shared [`StatusStore`] without touching the reader.
pub struct ScaleConnection {
    settings: ScaleSettings,
    base_config: SerialConfig,
    opener: Arc<dyn PortOpener>,
    store: Arc<StatusStore>,
    session: Mutex<Option<Session>>,
    shutting_down: AtomicBool,
}

impl ScaleConnection {
    /// Connection using the host's serial ports
    pub fn new(settings: ScaleSettings) -> Result<Self> {
        let opener = SystemPorts::new(settings.read_timeout(), settings.open_timeout());
        Self::with_opener(settings, Arc::new(opener))
    }

    /// Connection using a custom device backend
    pub fn with_opener(settings: ScaleSettings, opener: Arc<dyn PortOpener>) -> Result<Self> {
        settings.validate()?;
        let base_config = settings.base_config()?;
        let store = Arc::new(StatusStore::new(&base_config));

        Ok(Self {
            settings,
            base_config,
            opener,
            store,
            session: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Spawn the supervising task on the current Tokio runtime.
    /// Does nothing if a session is already running.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ScaleError::NoRuntime)?;

        let mut session = self.lock_session();
        if let Some(running) = session.as_ref() {
            if !running.task.is_finished() {
                log::debug!("Scale connection for {} already running", self.base_config.port);
                return Ok(());
            }
        }

        self.shutting_down.store(false, Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let slot: PortSlot = Arc::new(Mutex::new(None));

        let supervisor = Supervisor {
            base_config: self.base_config.clone(),
            opener: self.opener.clone(),
            store: self.store.clone(),
            slot: slot.clone(),
            cancel_rx,
            reconnect_interval: self.settings.reconnect_interval(),
            poll_interval: self.settings.poll_interval(),
            enable_poll: self.settings.enable_poll,
            read_timeout: self.settings.read_timeout(),
        };
        let task = runtime.spawn(supervisor.run());

        *session = Some(Session { cancel_tx, slot, task });
        log::info!("Scale connection task started for {}", self.base_config.port);
        Ok(())
    }

    /// Stop the connection. Idempotent and callable from any thread.
    ///
    /// The device is closed before this returns; the supervising task notices the
    /// cancellation at its next suspension point and exits without probing again.
    pub fn stop(&self) {
        drop(self.cancel_session());
    }

    /// `stop()` and then wait for the supervising task to finish
    pub async fn shutdown(&self) {
        if let Some(task) = self.cancel_session() {
            if timeout(SHUTDOWN_JOIN_TIMEOUT, task).await.is_err() {
                log::warn!("Scale connection task did not exit within {:?}", SHUTDOWN_JOIN_TIMEOUT);
            }
        }
    }

    fn cancel_session(&self) -> Option<JoinHandle<()>> {
        // Held until the store reads Idle, so a concurrent start() cannot slip a session in first.
        let mut current = self.lock_session();
        self.shutting_down.store(true, Ordering::SeqCst);

        match current.take() {
            Some(session) => {
                // Cancel, close and mark disconnected under the slot lock so the supervisor
                // cannot install a freshly opened port in between.
                let mut port = session.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let _ = session.cancel_tx.send(true);
                if port.take().is_some() {
                    log::info!("Closed serial port {}", self.base_config.port);
                }
                self.store.set_disconnected(ManagerState::Idle);
                log::info!("Scale connection for {} stopped", self.base_config.port);
                Some(session.task)
            }
            None => {
                self.store.set_disconnected(ManagerState::Idle);
                None
            }
        }
    }

    pub fn current_status(&self) -> ConnectionStatus {
        self.store.current_status()
    }

    pub fn health(&self) -> ScaleHealth {
        ScaleHealth::from(&self.store.current_status())
    }

    pub fn current_reading(&self) -> Option<Arc<ScaleReading>> {
        self.store.current_reading()
    }

    pub fn state(&self) -> ManagerState {
        self.store.state()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ScaleReading>>> {
        self.store.subscribe()
    }

    pub fn settings(&self) -> &ScaleSettings {
        &self.settings
    }

    /// Serial devices visible to the host; not tied to the connection state
    pub fn list_available_ports(&self) -> Result<Vec<AvailablePort>> {
        Ok(self.opener.available_ports()?)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ScaleConnection {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the supervising task of one session
struct Supervisor {
    base_config: SerialConfig,
    opener: Arc<dyn PortOpener>,
    store: Arc<StatusStore>,
    slot: PortSlot,
    cancel_rx: watch::Receiver<bool>,
    reconnect_interval: Duration,
    poll_interval: Duration,
    enable_poll: bool,
    read_timeout: Duration,
}

impl Supervisor {
    async fn run(self) {
        let candidates = build_candidates(&self.base_config);

        while !self.is_cancelled() {
            self.while_live(|_| self.store.set_probing());

            if let Some(config) = self.probe(&candidates).await {
                log::info!("Connected: {}", config);
                let poller = self
                    .enable_poll
                    .then(|| spawn_poller(self.slot.clone(), self.poll_interval, self.cancel_rx.clone()));

                let outcome = self.read_loop().await;

                if let Some(poller) = poller {
                    poller.abort();
                }
                self.while_live(|port| {
                    port.take();
                    self.store.set_probing();
                });
                match outcome {
                    Ok(()) => log::info!("Disconnected from {}", config.port),
                    Err(e) => log::error!("Read error on {}: {}", config.port, e),
                }
            } else if !self.is_cancelled() {
                log::warn!("No candidate configuration could open {}", self.base_config.port);
            }

            if self.is_cancelled() {
                break;
            }
            log::info!("Reconnect in {}ms...", self.reconnect_interval.as_millis());
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_interval) => {}
                _ = cancelled(self.cancel_rx.clone()) => break,
            }
        }

        log::info!("Scale connection task for {} exiting", self.base_config.port);
    }

    /// Try every candidate in order; the first that opens becomes the session's port
    async fn probe(&self, candidates: &[SerialConfig]) -> Option<SerialConfig> {
        for config in candidates {
            if self.is_cancelled() {
                return None;
            }
            log::info!("Connecting to {} @ {} baud...", config.port, config.baudrate);

            let opened = tokio::select! {
                res = self.opener.open(config) => res,
                _ = cancelled(self.cancel_rx.clone()) => return None,
            };

            match opened {
                Ok(link) => {
                    return self
                        .while_live(|port| {
                            *port = Some(link);
                            self.store.set_connected(config.clone());
                        })
                        .map(|_| config.clone());
                }
                Err(e) => log::debug!("Failed to connect with {}: {}", config, e),
            }
        }
        None
    }

    /// Read, split and record lines until the port fails or the session is cancelled
    async fn read_loop(&self) -> std::result::Result<(), SerialError> {
        let mut assembler = LineAssembler::new();
        let mut buf = [0u8; READ_CHUNK_SIZE];

        loop {
            let read = tokio::select! {
                res = read_chunk(&self.slot, &mut buf, self.read_timeout) => res,
                _ = cancelled(self.cancel_rx.clone()) => return Ok(()),
            };

            match read {
                Ok(n) => {
                    for line in assembler.push(&buf[..n]) {
                        if self.is_cancelled() {
                            return Ok(());
                        }
                        let parsed = parse_scale_line(&line);
                        if parsed.is_none() {
                            log::debug!("Unparsed line: {}", line.trim());
                        }
                        self.store.record_line(parsed);
                    }
                }
                Err(SerialError::Timeout) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `f` on the port slot unless the session was cancelled.
    /// The cancellation check and `f` happen under the slot lock, which `stop()` also takes.
    fn while_live<R>(&self, f: impl FnOnce(&mut Option<Box<dyn ScaleLink>>) -> R) -> Option<R> {
        let mut port = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *self.cancel_rx.borrow() {
            return None;
        }
        Some(f(&mut port))
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

/// Wait up to `read_timeout` for data and read it
async fn read_chunk(slot: &PortSlot, buf: &mut [u8], read_timeout: Duration) -> std::result::Result<usize, SerialError> {
    let deadline = Instant::now() + read_timeout;
    loop {
        {
            let mut port = slot.lock().map_err(|_| SerialError::NotConnected)?;
            let link = port.as_mut().ok_or(SerialError::NotConnected)?;
            if link.bytes_to_read()? > 0 {
                let n = link.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
            }
        }
        if Instant::now() >= deadline {
            return Err(SerialError::Timeout);
        }
        tokio::time::sleep(READ_POLL_STEP).await;
    }
}

/// Resolves once the session is cancelled or its owner is gone
async fn cancelled(mut cancel_rx: watch::Receiver<bool>) {
    loop {
        let stop = *cancel_rx.borrow_and_update();
        if stop {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            return;
        }
    }
}
