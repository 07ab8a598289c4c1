use std::collections::HashSet;

use super::{Parity, SerialConfig};

/// Line settings most SGW-series indicators ship with, tried after the configured one.
/// (baudrate, bytesize, parity, stopbits)
pub const COMMON_DEFAULTS: [(u32, u8, Parity, u8); 5] = [
    (2400, 8, Parity::None, 1),
    (2400, 7, Parity::Even, 1),
    (9600, 8, Parity::None, 1),
    (4800, 8, Parity::None, 1),
    (1200, 7, Parity::Even, 1),
];

/// Build the ordered list of configurations to probe.
///
/// The base config always comes first and untouched; the common defaults follow on the
/// base port. Entries whose line settings were already seen are dropped, so a default that
/// equals the base never appears twice.
pub fn build_candidates(base: &SerialConfig) -> Vec<SerialConfig> {
    let defaults = COMMON_DEFAULTS
        .iter()
        .map(|&(baudrate, bytesize, parity, stopbits)| SerialConfig {
            port: base.port.clone(),
            baudrate,
            bytesize,
            stopbits,
            parity,
        });

    let mut seen = HashSet::new();
    std::iter::once(base.clone())
        .chain(defaults)
        .filter(|candidate| seen.insert(candidate.line_key()))
        .collect()
}
