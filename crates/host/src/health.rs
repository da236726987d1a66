//! Saúde de um link serial, compartilhada entre a thread do link e a de exibição.

use scope_core::decoder::DecoderStats;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Contadores atômicos de um link.
#[derive(Debug, Default)]
pub struct LinkHealth {
    connected: AtomicBool,
    packets: AtomicU64,
    samples: AtomicU64,
    desyncs: AtomicU64,
    bytes_discarded: AtomicU64,
    batches_dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl LinkHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Soma o progresso do decodificador desde o último registro.
    pub fn record_decoder(&self, delta: &DecoderStats) {
        self.packets.fetch_add(delta.packets, Ordering::Relaxed);
        self.desyncs.fetch_add(delta.desyncs, Ordering::Relaxed);
        self.bytes_discarded
            .fetch_add(delta.bytes_discarded, Ordering::Relaxed);
    }

    pub fn record_samples(&self, count: usize) {
        self.samples.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, batches: usize) {
        self.batches_dropped
            .fetch_add(batches as u64, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            packets: self.packets.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            desyncs: self.desyncs.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Cópia pontual dos contadores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub connected: bool,
    pub packets: u64,
    pub samples: u64,
    pub desyncs: u64,
    pub bytes_discarded: u64,
    pub batches_dropped: u64,
    pub reconnects: u64,
}

impl fmt::Display for HealthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.connected { "conectado" } else { "desconectado" };
        write!(
            f,
            "{state} | {} pacotes | {} amostras | {} desync | {} bytes descartados | {} lotes perdidos | {} reconexões",
            self.packets,
            self.samples,
            self.desyncs,
            self.bytes_discarded,
            self.batches_dropped,
            self.reconnects
        )
    }
}
