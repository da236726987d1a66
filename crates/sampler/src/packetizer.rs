//! Agrupa conversões em pacotes de 5 bytes e os transmite.

use crate::adc::AdcSource;
use scope_core::protocol::{Packet, ProtocolError, SAMPLES_PER_PACKET, pack_samples};
use scope_core::types::RawSample;
use std::io::{ErrorKind, Write};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Intervalo entre relatórios periódicos de transmissão.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Acumula 4 amostras consecutivas.
#[derive(Debug, Default)]
pub struct Packetizer {
    pending: [RawSample; SAMPLES_PER_PACKET],
    filled: usize,
}

impl Packetizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adiciona uma amostra; devolve o pacote quando o quarteto fecha.
    ///
    /// Em caso de erro o quarteto incompleto é descartado.
    pub fn push(&mut self, sample: RawSample) -> Result<Option<Packet>, ProtocolError> {
        self.pending[self.filled] = sample;
        self.filled += 1;
        if self.filled < SAMPLES_PER_PACKET {
            return Ok(None);
        }
        self.filled = 0;
        pack_samples(self.pending).map(Some)
    }
}

/// Contadores do transmissor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    pub samples: u64,
    pub packets_sent: u64,
    /// Pacotes perdidos por falha de escrita (nunca retransmitidos).
    pub write_failures: u64,
    /// Quartetos descartados por amostra fora da faixa.
    pub encode_failures: u64,
}

impl TxStats {
    fn packets_attempted(&self) -> u64 {
        self.packets_sent + self.write_failures + self.encode_failures
    }
}

/// Laço convert → pack → write.
///
/// Roda até `max_packets` pacotes (ou para sempre com `None`). Só retorna
/// erro quando o destino foi fechado (`BrokenPipe`).
pub fn pump<A: AdcSource, W: Write>(
    adc: &mut A,
    out: &mut W,
    max_packets: Option<u64>,
    stats: &mut TxStats,
) -> std::io::Result<()> {
    let mut packetizer = Packetizer::new();
    let mut last_report = Instant::now();

    while max_packets.is_none_or(|max| stats.packets_attempted() < max) {
        let sample = adc.convert();
        stats.samples += 1;

        let packet = match packetizer.push(sample) {
            Ok(Some(packet)) => packet,
            Ok(None) => continue,
            Err(e) => {
                stats.encode_failures += 1;
                warn!("Quarteto descartado: {e}");
                continue;
            }
        };

        match out.write_all(&packet).and_then(|()| out.flush()) {
            Ok(()) => stats.packets_sent += 1,
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                error!("Destino fechado: {e}");
                return Err(e);
            }
            Err(e) => {
                stats.write_failures += 1;
                if stats.write_failures == 1 || stats.write_failures % 1000 == 0 {
                    error!("Falha ao escrever pacote ({} perdidos): {e}", stats.write_failures);
                }
            }
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            last_report = Instant::now();
            info!(
                "→ {} pacotes enviados | {} amostras | {} perdidos",
                stats.packets_sent, stats.samples, stats.write_failures
            );
        }
    }

    Ok(())
}
