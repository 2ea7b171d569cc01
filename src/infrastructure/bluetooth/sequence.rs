//! Per-characteristic sequence numbers
//!
//! Every characteristic the controller writes to carries its own one-byte
//! counter. The drone drops frames whose sequence number goes backwards, so a
//! number is drawn once per new command and never for a retry.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct SequenceRegistry {
    counters: HashMap<String, u8>,
}

impl SequenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number for `characteristic`.
    ///
    /// Counts 1..=255 and wraps back to 1: sequence 0 is never sent.
    pub fn next(&mut self, characteristic: &str) -> u8 {
        let counter = self
            .counters
            .entry(characteristic.to_string())
            .or_insert(0);

        if *counter == u8::MAX {
            *counter = 0;
        }
        *counter += 1;
        *counter
    }

    /// Last number handed out for `characteristic`
    pub fn current(&self, characteristic: &str) -> Option<u8> {
        self.counters.get(characteristic).copied()
    }

    /// Start all counters over, used by a new handshake
    pub fn reset(&mut self) {
        self.counters.clear();
    }
}
