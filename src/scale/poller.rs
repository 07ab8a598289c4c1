use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::manager::PortSlot;
use crate::serial::SerialError;

/// Keep-alive and weight-request sequences, sent one per interval in this order
pub const POLL_COMMANDS: [&[u8]; 4] = [b"\r", b"\n", b"SI\r\n", b"S\r\n"];

/// Start the poller for the port currently held in `slot`.
///
/// The task ends on its own when a write fails (including the slot being emptied on
/// teardown) or when `cancel_rx` flips to true. It never forces a reconnect itself.
pub(crate) fn spawn_poller(slot: PortSlot, interval: Duration, mut cancel_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sent: usize = 0;
        loop {
            if *cancel_rx.borrow() {
                break;
            }

            let cmd = POLL_COMMANDS[sent % POLL_COMMANDS.len()];
            if let Err(e) = write_command(&slot, cmd) {
                log::error!("Poll error: {}", e);
                break;
            }
            sent += 1;
            log::debug!("Sent poll command {:?}", String::from_utf8_lossy(cmd));

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = cancel_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        log::debug!("Poller exiting after {} commands", sent);
    })
}

fn write_command(slot: &PortSlot, cmd: &[u8]) -> Result<(), SerialError> {
    let mut guard = slot.lock().map_err(|_| SerialError::NotConnected)?;
    let link = guard.as_mut().ok_or(SerialError::NotConnected)?;
    link.write(cmd)
}
