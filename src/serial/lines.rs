//! Receive-side line assembly for 7-bit ASCII indicators.

/// Hard cap on an unterminated buffer before it is cut back
pub const MAX_PARTIAL_LEN: usize = 8192;
/// Length kept from the tail when the cap is hit
pub const TRIMMED_PARTIAL_LEN: usize = 4096;

/// Clear bit 7 of every byte and decode as ASCII.
/// Links wired 7E1 on an 8N1 port deliver the parity bit in the top bit; masking it recovers the text.
pub fn normalize_chunk(chunk: &[u8]) -> String {
    chunk.iter().map(|b| char::from(b & 0x7F)).collect()
}

/// Accumulates raw serial chunks and hands out complete lines.
///
/// A line is complete once a `\n` or `\r` follows it. Whatever trails the last terminator
/// stays buffered until a later chunk completes it.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: String,
    trims: u64,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every non-blank line completed by it, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.push_str(&normalize_chunk(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find(['\n', '\r']) {
            let line: String = self.partial.drain(..=pos).take(pos).collect();
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }

        if self.partial.len() > MAX_PARTIAL_LEN {
            let cut = self.partial.len() - TRIMMED_PARTIAL_LEN;
            self.partial.drain(..cut);
            self.trims += 1;
            log::warn!(
                "Receive buffer exceeded {} chars without a line terminator, kept last {}",
                MAX_PARTIAL_LEN,
                TRIMMED_PARTIAL_LEN
            );
        }

        lines
    }

    /// Text received after the last terminator
    pub fn pending(&self) -> &str {
        &self.partial
    }

    /// Number of times the unterminated buffer was cut back
    pub fn trims(&self) -> u64 {
        self.trims
    }
}
