//! Protocolo serial entre o firmware e o host.
//!
//! Cada pacote carrega 4 amostras de 10 bits em 5 bytes, sem header e sem
//! delimitador entre pacotes:
//!
//! ```text
//! ┌──────────┬─────────────────┬─────────────────┬─────────────────┬──────────┐
//! │ byte0    │ byte1           │ byte2           │ byte3           │ byte4    │
//! │ s0[7:0]  │ s1[5:0] s0[9:8] │ s2[3:0] s1[9:6] │ s3[1:0] s2[9:4] │ s3[9:2]  │
//! └──────────┴─────────────────┴─────────────────┴─────────────────┴──────────┘
//! ```
//!
//! Bit 0 é o menos significativo de cada byte.

use crate::types::{RawSample, SAMPLE_MAX};

/// Bytes por pacote.
pub const PACKET_SIZE: usize = 5;

/// Amostras por pacote.
pub const SAMPLES_PER_PACKET: usize = 4;

/// Baud rate fixo do link serial.
pub const DEFAULT_BAUD_RATE: u32 = 250_000;

/// Um pacote no fio.
pub type Packet = [u8; PACKET_SIZE];

/// Erros do protocolo.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Amostra {index} fora da faixa de 10 bits: {value} (máximo {SAMPLE_MAX})")]
    SampleOutOfRange { index: usize, value: RawSample },

    #[error("Alinhamento perdido: deslocamento {offset} varia {best} contra {current} no atual")]
    StreamDesync { offset: usize, current: u64, best: u64 },
}

/// Empacota 4 amostras consecutivas em um pacote de 5 bytes.
pub fn pack_samples(samples: [RawSample; SAMPLES_PER_PACKET]) -> Result<Packet, ProtocolError> {
    if let Some((index, &value)) = samples.iter().enumerate().find(|(_, s)| **s > SAMPLE_MAX) {
        return Err(ProtocolError::SampleOutOfRange { index, value });
    }

    let [s0, s1, s2, s3] = samples;
    Ok([
        (s0 & 0xFF) as u8,
        ((s0 >> 8) & 0x03 | (s1 & 0x3F) << 2) as u8,
        ((s1 >> 6) & 0x0F | (s2 & 0x0F) << 4) as u8,
        ((s2 >> 4) & 0x3F | (s3 & 0x03) << 6) as u8,
        ((s3 >> 2) & 0xFF) as u8,
    ])
}

/// Desempacota um pacote alinhado em 4 amostras de 10 bits.
///
/// Todo padrão de 40 bits é válido, então esta função nunca falha e nunca
/// produz valores acima de [`SAMPLE_MAX`].
pub fn unpack_packet(packet: &Packet) -> [RawSample; SAMPLES_PER_PACKET] {
    let b = packet.map(RawSample::from);
    [
        b[0] | (b[1] & 0x03) << 8,
        (b[1] >> 2) | (b[2] & 0x0F) << 6,
        (b[2] >> 4) | (b[3] & 0x3F) << 4,
        (b[3] >> 6) | b[4] << 2,
    ]
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
