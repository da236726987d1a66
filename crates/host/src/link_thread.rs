//! Thread de link: lê a serial de uma entrada física, decodifica e envia os
//! lotes de amostras para a thread de exibição via channel.

use crate::health::LinkHealth;
use crossbeam_channel::{Receiver, Sender};
use scope_core::decoder::{DecoderSettings, StreamDecoder};
use scope_core::types::{ChannelId, RawSample};
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Espera entre tentativas de reabrir a porta.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Timeout de leitura da serial.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Porta especial que lê o link de stdin.
pub const STDIN_PORT: &str = "-";

/// Amostras decodificadas de uma leitura da serial.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub channel: ChannelId,
    pub codes: Vec<RawSample>,
}

/// Fila limitada que descarta o lote mais antigo quando cheia.
///
/// Guarda uma ponta de leitura só para remover o lote mais antigo; quem
/// consome é a thread de exibição. Por isso o channel nunca desconecta.
#[derive(Debug, Clone)]
pub struct BatchQueue {
    tx: Sender<SampleBatch>,
    oldest: Receiver<SampleBatch>,
}

impl BatchQueue {
    pub fn new(tx: Sender<SampleBatch>, rx: Receiver<SampleBatch>) -> Self {
        Self { tx, oldest: rx }
    }

    /// Enfileira sem bloquear. Retorna quantos lotes antigos foram descartados.
    pub fn push(&self, mut batch: SampleBatch) -> usize {
        let mut dropped = 0;
        while let Err(full) = self.tx.try_send(batch) {
            batch = full.into_inner();
            if self.oldest.try_recv().is_ok() {
                dropped += 1;
            }
        }
        dropped
    }
}

/// Parâmetros de um link.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub channel: ChannelId,
    pub port: String,
    pub baud_rate: u32,
    pub decoder: DecoderSettings,
}

/// Inicia a thread de um link.
pub fn spawn_link_thread(settings: LinkSettings, queue: BatchQueue, health: Arc<LinkHealth>) {
    std::thread::Builder::new()
        .name(format!("link-{}", settings.channel).to_lowercase())
        .spawn(move || {
            if settings.port == STDIN_PORT {
                stdin_loop(&settings, &queue, &health);
            } else {
                serial_loop(&settings, &queue, &health);
            }
        })
        .expect("Falha ao criar thread do link");
}

fn serial_loop(settings: &LinkSettings, queue: &BatchQueue, health: &LinkHealth) {
    let channel = settings.channel;
    let mut opened_before = false;

    loop {
        match serialport::new(&settings.port, settings.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
        {
            Ok(mut port) => {
                info!("{channel}: link aberto em {} @ {} baud", settings.port, settings.baud_rate);
                if opened_before {
                    health.record_reconnect();
                }
                opened_before = true;
                health.set_connected(true);

                // Alinhamento desconhecido a cada abertura
                let mut decoder = StreamDecoder::new(settings.decoder.clone());
                let e = read_stream(&mut port, channel, &mut decoder, queue, health);
                health.set_connected(false);
                error!(
                    "{channel}: link perdido em {}: {e}. Tentando novamente em 2s...",
                    settings.port
                );
            }
            Err(e) => {
                error!(
                    "{channel}: falha ao abrir {}: {e}. Tentando novamente em 2s...",
                    settings.port
                );
            }
        }
        std::thread::sleep(RETRY_DELAY);
    }
}

fn stdin_loop(settings: &LinkSettings, queue: &BatchQueue, health: &LinkHealth) {
    let channel = settings.channel;
    info!("{channel}: lendo link de stdin");
    health.set_connected(true);

    let mut decoder = StreamDecoder::new(settings.decoder.clone());
    let mut stdin = std::io::stdin().lock();
    let e = read_stream(&mut stdin, channel, &mut decoder, queue, health);
    error!("{channel}: stdin encerrado: {e}");
    health.set_connected(false);
}

/// Lê até o link cair, enviando um lote por leitura.
///
/// Retorna o erro que encerrou a leitura; fim de fluxo vira `UnexpectedEof`.
pub fn read_stream<R: Read>(
    reader: &mut R,
    channel: ChannelId,
    decoder: &mut StreamDecoder,
    queue: &BatchQueue,
    health: &LinkHealth,
) -> std::io::Error {
    let mut buf = [0u8; 4096];
    let mut reported = decoder.stats();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return ErrorKind::UnexpectedEof.into(),
            Ok(n) => n,
            Err(ref e)
                if e.kind() == ErrorKind::TimedOut
                    || e.kind() == ErrorKind::WouldBlock
                    || e.kind() == ErrorKind::Interrupted =>
            {
                // Timeout normal, continua
                continue;
            }
            Err(e) => return e,
        };

        let mut codes = Vec::with_capacity(n);
        decoder.push_bytes(&buf[..n], &mut codes);

        let stats = decoder.stats();
        let delta = stats.since(&reported);
        if delta.desyncs > 0 {
            warn!("{channel}: {} dessincronização(ões) no fluxo", delta.desyncs);
        }
        health.record_decoder(&delta);
        reported = stats;

        if codes.is_empty() {
            continue;
        }
        health.record_samples(codes.len());

        let dropped = queue.push(SampleBatch { channel, codes });
        if dropped > 0 {
            health.record_dropped(dropped);
            debug!("{channel}: channel cheio, {dropped} lote(s) antigo(s) descartado(s)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use scope_core::protocol::pack_samples;
    use std::collections::VecDeque;
    use std::io::Cursor;

    fn queue(capacity: usize) -> (BatchQueue, Receiver<SampleBatch>) {
        let (tx, rx) = bounded(capacity);
        (BatchQueue::new(tx, rx.clone()), rx)
    }

    fn batch(code: RawSample) -> SampleBatch {
        SampleBatch {
            channel: ChannelId::CH1,
            codes: vec![code],
        }
    }

    fn sine_stream(count: usize) -> (Vec<RawSample>, Vec<u8>) {
        let samples: Vec<RawSample> = (0..count)
            .map(|i| (512.0 + 400.0 * (std::f64::consts::TAU * i as f64 / 40.0).sin()).round() as RawSample)
            .collect();
        let bytes = samples
            .chunks_exact(4)
            .flat_map(|c| pack_samples([c[0], c[1], c[2], c[3]]).unwrap())
            .collect();
        (samples, bytes)
    }

    /// Leitor que devolve uma sequência roteirizada de resultados.
    struct Scripted(VecDeque<std::io::Result<Vec<u8>>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn full_queue_drops_oldest_batch() {
        let (queue, rx) = queue(2);
        assert_eq!(queue.push(batch(1)), 0);
        assert_eq!(queue.push(batch(2)), 0);
        assert_eq!(queue.push(batch(3)), 1);

        let codes: Vec<RawSample> = rx.try_iter().flat_map(|b| b.codes).collect();
        assert_eq!(codes, vec![2, 3]);
    }

    #[test]
    fn queue_keeps_accepting_after_consumer_is_gone() {
        let (queue, rx) = queue(1);
        drop(rx);
        assert_eq!(queue.push(batch(1)), 0);
        assert_eq!(queue.push(batch(2)), 1);
    }

    #[test]
    fn cursor_stream_reaches_display_queue() {
        let (samples, wire) = sine_stream(200);
        let mut bytes = vec![0xAA, 0x55];
        bytes.extend(wire);

        let (queue, rx) = queue(64);
        let health = LinkHealth::new();
        let mut decoder = StreamDecoder::new(DecoderSettings::default());
        let err = read_stream(&mut Cursor::new(bytes), ChannelId::CH2, &mut decoder, &queue, &health);
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);

        let batches: Vec<SampleBatch> = rx.try_iter().collect();
        assert!(batches.iter().all(|b| b.channel == ChannelId::CH2));
        let codes: Vec<RawSample> = batches.into_iter().flat_map(|b| b.codes).collect();
        assert_eq!(codes, samples);

        let snap = health.snapshot();
        assert_eq!(snap.samples, 200);
        assert_eq!(snap.packets, 50);
        assert_eq!(snap.bytes_discarded, 2);
        assert_eq!(snap.desyncs, 0);
    }

    #[test]
    fn read_timeouts_do_not_end_the_link() {
        let packet = pack_samples([100, 200, 300, 400]).unwrap().to_vec();
        let mut reader = Scripted(VecDeque::from([
            Err(ErrorKind::TimedOut.into()),
            Ok(packet.clone()),
            Err(ErrorKind::WouldBlock.into()),
            Ok(packet),
            Err(ErrorKind::BrokenPipe.into()),
        ]));

        let (queue, rx) = queue(8);
        let health = LinkHealth::new();
        let mut decoder = StreamDecoder::aligned(DecoderSettings::default());
        let err = read_stream(&mut reader, ChannelId::CH1, &mut decoder, &queue, &health);
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(health.snapshot().samples, 8);
    }

    #[test]
    fn slow_consumer_loses_oldest_batches() {
        let packet = pack_samples([10, 20, 30, 40]).unwrap().to_vec();
        let mut reader = Scripted((0..5).map(|_| Ok(packet.clone())).collect());

        let (queue, rx) = queue(2);
        let health = LinkHealth::new();
        let mut decoder = StreamDecoder::aligned(DecoderSettings::default());
        let _ = read_stream(&mut reader, ChannelId::CH1, &mut decoder, &queue, &health);

        assert_eq!(health.snapshot().batches_dropped, 3);
        assert_eq!(rx.try_iter().count(), 2);
    }
}
