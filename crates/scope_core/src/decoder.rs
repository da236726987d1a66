//! Decodificador do fluxo serial sem framing.
//!
//! O protocolo não tem marcador de início de pacote, então o alinhamento é
//! recuperado estatisticamente: um sinal analógico amostrado varia pouco entre
//! amostras vizinhas, enquanto uma leitura desalinhada mistura bits altos e
//! baixos de amostras diferentes e produz saltos grandes.
//!
//! - **Busca**: com `lookahead_packets` pacotes pendentes, cada um dos 5
//!   deslocamentos possíveis é pontuado pela variação total (soma de |Δ|) das
//!   amostras decodificadas. O menor vence; empates ficam com o menor
//!   deslocamento.
//! - **Rastreamento**: um pacote é suspeito se algum salto passa do limite,
//!   que é o maior entre `max_step` e [`STEP_FACTOR`] vezes o passo típico do
//!   sinal. O passo típico vem da última busca e só diminui entre buscas.
//! - **Verificação**: depois de `desync_after` pacotes suspeitos seguidos os 5
//!   deslocamentos são pontuados de novo a partir do pacote retido. Só há
//!   realinhamento (e `StreamDesync`) se outro deslocamento variar menos que
//!   3/4 do atual; senão o pacote é entregue e o alinhamento continua.
//!
//! Sinais quase constantes são ambíguos e podem travar num deslocamento errado
//! até o sinal voltar a variar. Acima de ~1/7 da taxa de amostragem a
//! variação total deixa de distinguir o alinhamento correto.

use crate::protocol::{PACKET_SIZE, Packet, ProtocolError, SAMPLES_PER_PACKET, unpack_packet};
use crate::types::RawSample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Múltiplo do passo típico a partir do qual um salto é suspeito.
pub const STEP_FACTOR: u64 = 3;

/// Parâmetros da heurística de alinhamento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    /// Menor limite de salto (em códigos) para marcar um pacote como suspeito.
    pub max_step: u16,
    /// Pacotes avaliados por deslocamento na busca e na verificação.
    pub lookahead_packets: usize,
    /// Pacotes suspeitos consecutivos que disparam a verificação.
    pub desync_after: usize,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            max_step: 128,
            lookahead_packets: 8,
            desync_after: 3,
        }
    }
}

/// Contadores acumulados do decodificador.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Pacotes decodificados e entregues.
    pub packets: u64,
    /// Alinhamentos perdidos e recuperados durante o rastreamento.
    pub desyncs: u64,
    /// Bytes descartados para realinhar.
    pub bytes_discarded: u64,
    /// Vezes em que a busca ou a verificação precisou pular bytes.
    pub realignments: u64,
}

impl DecoderStats {
    /// Contadores acumulados desde `earlier`.
    pub fn since(&self, earlier: &DecoderStats) -> DecoderStats {
        DecoderStats {
            packets: self.packets.saturating_sub(earlier.packets),
            desyncs: self.desyncs.saturating_sub(earlier.desyncs),
            bytes_discarded: self.bytes_discarded.saturating_sub(earlier.bytes_discarded),
            realignments: self.realignments.saturating_sub(earlier.realignments),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Searching,
    Locked,
    Verifying,
}

/// Decodificador incremental de um link serial.
#[derive(Debug)]
pub struct StreamDecoder {
    settings: DecoderSettings,
    pending: VecDeque<u8>,
    state: State,
    last_sample: Option<RawSample>,
    suspicious_run: usize,
    /// Passo médio entre amostras vizinhas, em códigos.
    typical_step: u64,
    stats: DecoderStats,
}

impl StreamDecoder {
    /// Decodificador que ainda não conhece o alinhamento (ex.: porta aberta
    /// com o firmware já transmitindo).
    pub fn new(settings: DecoderSettings) -> Self {
        Self::with_state(settings, State::Searching)
    }

    /// Decodificador que assume que o primeiro byte recebido inicia um pacote.
    pub fn aligned(settings: DecoderSettings) -> Self {
        Self::with_state(settings, State::Locked)
    }

    fn with_state(settings: DecoderSettings, state: State) -> Self {
        let lookahead_packets = settings.lookahead_packets.max(1);
        Self {
            settings: DecoderSettings {
                lookahead_packets,
                ..settings
            },
            pending: VecDeque::with_capacity(lookahead_packets * PACKET_SIZE * 2),
            state,
            last_sample: None,
            suspicious_run: 0,
            typical_step: 0,
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// `false` enquanto a busca inicial não terminou.
    pub fn is_locked(&self) -> bool {
        self.state != State::Searching
    }

    /// Bytes aguardando um pacote completo ou a janela de busca.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Alimenta bytes recebidos e acrescenta em `out` as amostras decodificadas.
    ///
    /// Retorna quantas amostras foram produzidas nesta chamada.
    pub fn push_bytes(&mut self, bytes: &[u8], out: &mut Vec<RawSample>) -> usize {
        let before = out.len();
        self.pending.extend(bytes);

        loop {
            let progressed = match self.state {
                State::Searching => self.search_alignment(),
                State::Verifying => self.verify_alignment(out),
                State::Locked => self.track_packet(out),
            };
            if !progressed {
                break;
            }
        }

        out.len() - before
    }

    fn window_ready(&self) -> bool {
        self.pending.len() >= self.settings.lookahead_packets * PACKET_SIZE + PACKET_SIZE - 1
    }

    /// Diferenças entre amostras vizinhas na janela de busca.
    fn window_steps(&self) -> u64 {
        (self.settings.lookahead_packets * SAMPLES_PER_PACKET - 1) as u64
    }

    /// Pontuação dos 5 deslocamentos e o vencedor.
    fn rank_offsets(&self) -> ([u64; PACKET_SIZE], usize) {
        let scores: [u64; PACKET_SIZE] = std::array::from_fn(|offset| self.score_offset(offset));
        let best = (0..PACKET_SIZE)
            .min_by_key(|&offset| (scores[offset], offset))
            .unwrap_or(0);
        (scores, best)
    }

    /// Retorna `false` enquanto não houver bytes suficientes para a janela.
    fn search_alignment(&mut self) -> bool {
        if !self.window_ready() {
            return false;
        }

        let (scores, offset) = self.rank_offsets();
        debug!("Busca de alinhamento: {scores:?}, deslocamento {offset}");
        self.skip_bytes(offset);
        self.lock(scores[offset]);
        self.last_sample = None;
        true
    }

    /// Confere o alinhamento atual contra os outros deslocamentos a partir do
    /// pacote retido.
    fn verify_alignment(&mut self, out: &mut Vec<RawSample>) -> bool {
        if !self.window_ready() {
            return false;
        }

        let (scores, offset) = self.rank_offsets();
        let current = scores[0];
        let best = scores[offset];

        if offset > 0 && best * 4 < current * 3 {
            self.stats.desyncs += 1;
            let err = ProtocolError::StreamDesync { offset, current, best };
            warn!("{err}; realinhando");
            self.skip_bytes(offset);
            self.lock(best);
            self.last_sample = None;
            return true;
        }

        debug!("Alinhamento confirmado (variação {current})");
        self.lock(current);
        if let Some(packet) = self.take_packet() {
            self.emit(unpack_packet(&packet), out);
        }
        true
    }

    fn lock(&mut self, variation: u64) {
        self.state = State::Locked;
        self.suspicious_run = 0;
        self.typical_step = variation / self.window_steps();
    }

    /// Variação total das amostras com o deslocamento dado.
    fn score_offset(&self, offset: usize) -> u64 {
        let mut variation = 0u64;
        let mut previous: Option<RawSample> = None;

        for index in 0..self.settings.lookahead_packets {
            let start = offset + index * PACKET_SIZE;
            let mut packet = [0u8; PACKET_SIZE];
            for (slot, byte) in packet.iter_mut().zip(self.pending.range(start..start + PACKET_SIZE)) {
                *slot = *byte;
            }
            for sample in unpack_packet(&packet) {
                if let Some(prev) = previous {
                    variation += u64::from(prev.abs_diff(sample));
                }
                previous = Some(sample);
            }
        }

        variation
    }

    fn skip_bytes(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.stats.realignments += 1;
        debug!("Realinhando: descartando {count} byte(s)");
        for _ in 0..count {
            if self.pending.pop_front().is_some() {
                self.stats.bytes_discarded += 1;
            }
        }
    }

    fn peek_packet(&self) -> Option<Packet> {
        if self.pending.len() < PACKET_SIZE {
            return None;
        }
        let mut packet = [0u8; PACKET_SIZE];
        for (slot, byte) in packet.iter_mut().zip(self.pending.iter()) {
            *slot = *byte;
        }
        Some(packet)
    }

    fn take_packet(&mut self) -> Option<Packet> {
        let packet = self.peek_packet()?;
        self.pending.drain(..PACKET_SIZE);
        Some(packet)
    }

    /// Retorna `false` quando não há pacote completo.
    fn track_packet(&mut self, out: &mut Vec<RawSample>) -> bool {
        let Some(packet) = self.peek_packet() else {
            return false;
        };
        let samples = unpack_packet(&packet);
        let limit = u64::from(self.settings.max_step).max(STEP_FACTOR * self.typical_step);

        let mut previous = self.last_sample;
        let mut suspicious = false;
        let mut variation = 0u64;
        let mut steps = 0u64;
        for &sample in &samples {
            if let Some(prev) = previous {
                let step = u64::from(prev.abs_diff(sample));
                suspicious |= step > limit;
                variation += step;
                steps += 1;
            }
            previous = Some(sample);
        }

        if suspicious && self.suspicious_run + 1 >= self.settings.desync_after.max(1) {
            debug!("{} pacotes suspeitos seguidos; verificando alinhamento", self.suspicious_run + 1);
            self.state = State::Verifying;
            return true;
        }

        self.pending.drain(..PACKET_SIZE);
        if suspicious {
            self.suspicious_run += 1;
        } else {
            self.suspicious_run = 0;
            // O passo típico só cai entre buscas; subir exige uma verificação
            let mean = variation / steps.max(1);
            if mean < self.typical_step {
                self.typical_step -= (self.typical_step - mean) / 8;
            }
        }
        self.emit(samples, out);
        true
    }

    fn emit(&mut self, samples: [RawSample; SAMPLES_PER_PACKET], out: &mut Vec<RawSample>) {
        out.extend_from_slice(&samples);
        self.last_sample = Some(samples[SAMPLES_PER_PACKET - 1]);
        self.stats.packets += 1;
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
