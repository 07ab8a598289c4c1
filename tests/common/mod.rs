// In-memory serial device used to drive the connection manager without hardware.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scale_link_lib::config::ScaleSettings;
use scale_link_lib::serial::{AvailablePort, Parity, PortOpener, ScaleLink, SerialConfig, SerialError};

#[derive(Default)]
pub struct DeviceState {
    pub inbound: Mutex<VecDeque<u8>>,
    pub written: Mutex<Vec<Vec<u8>>>,
    pub attempts: Mutex<Vec<SerialConfig>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub hang_opens: AtomicBool,
    pub write_delay_ms: AtomicU64,
    pub writes_started: AtomicUsize,
    pub opens: AtomicUsize,
    pub live_links: AtomicUsize,
    pub read_polls: AtomicUsize,
}

/// Device that only opens with the listed line settings
#[derive(Clone)]
pub struct MockDevice {
    accepts: Vec<(u32, u8, Parity, u8)>,
    pub state: Arc<DeviceState>,
}

impl MockDevice {
    pub fn accepting(accepts: &[(u32, u8, Parity, u8)]) -> Self {
        Self {
            accepts: accepts.to_vec(),
            state: Arc::new(DeviceState::default()),
        }
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.state.inbound.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn inbound_is_empty(&self) -> bool {
        self.state.inbound.lock().unwrap().is_empty()
    }

    pub fn attempts(&self) -> Vec<SerialConfig> {
        self.state.attempts.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.written.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn live_links(&self) -> usize {
        self.state.live_links.load(Ordering::SeqCst)
    }

    pub fn read_polls(&self) -> usize {
        self.state.read_polls.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Opens record the attempt and then never complete
    pub fn set_hang_opens(&self, hang: bool) {
        self.state.hang_opens.store(hang, Ordering::SeqCst);
    }

    /// Each write blocks this long while the caller holds the port
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn writes_started(&self) -> usize {
        self.state.writes_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortOpener for MockDevice {
    async fn open(&self, config: &SerialConfig) -> Result<Box<dyn ScaleLink>, SerialError> {
        self.state.attempts.lock().unwrap().push(config.clone());
        if self.state.hang_opens.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.accepts.contains(&config.line_key()) {
            self.state.opens.fetch_add(1, Ordering::SeqCst);
            self.state.live_links.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockLink { state: self.state.clone() }))
        } else {
            Err(SerialError::ConnectionFailed(format!("no response at {}", config)))
        }
    }

    fn available_ports(&self) -> Result<Vec<AvailablePort>, SerialError> {
        Ok(vec![AvailablePort {
            port: "SIM0".to_string(),
            description: "Simulated indicator".to_string(),
            hwid: "SIM".to_string(),
        }])
    }
}

pub struct MockLink {
    state: Arc<DeviceState>,
}

impl ScaleLink for MockLink {
    fn bytes_to_read(&mut self) -> Result<u32, SerialError> {
        self.state.read_polls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_reads.load(Ordering::SeqCst) {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "cable pulled",
            )));
        }
        Ok(self.state.inbound.lock().unwrap().len() as u32)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let mut inbound = self.state.inbound.lock().unwrap();
        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SerialError> {
        self.state.writes_started.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write refused",
            )));
        }
        self.state.written.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.state.live_links.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Settings with short intervals so tests run quickly
pub fn fast_settings(enable_poll: bool) -> ScaleSettings {
    ScaleSettings {
        port: "SIM0".to_string(),
        baudrate: 2400,
        bytesize: 8,
        stopbits: 1,
        parity: "N".to_string(),
        reconnect_ms: 40,
        poll_ms: 15,
        enable_poll,
        read_timeout_ms: 30,
        open_timeout_ms: 200,
        auto_start: false,
        log_level: "debug".to_string(),
    }
}

/// Poll `check` every 5ms until it holds or `limit` passes
pub async fn wait_until<F: Fn() -> bool>(check: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
