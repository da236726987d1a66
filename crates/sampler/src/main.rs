//! # Scope Sampler
//!
//! Papel do firmware: ADC em modo free-running, 4 amostras de 10 bits por
//! pacote de 5 bytes, transmitidas sem framing pela serial.
//!
//! ## Uso
//! ```bash
//! scope_sampler                    # usa config.toml ao lado do executável
//! scope_sampler | scope_host ...   # serial_port = "-" escreve em stdout
//! ```

mod adc;
mod packetizer;

use adc::{FreeRunningAdc, SineInput};
use packetizer::TxStats;
use scope_core::config::AppConfig;
use scope_core::protocol::{PACKET_SIZE, SAMPLES_PER_PACKET};
use std::io::Write;
use std::time::Duration;
use tracing::{error, info, warn};

/// Bits por byte no fio (start + 8 dados + stop).
const BITS_PER_SERIAL_BYTE: f64 = 10.0;

fn main() {
    // ── Logging (stderr: stdout pode ser o próprio link) ──
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let cfg = config.sampler.clone();
    let sample_rate = cfg.clock_divider.sample_rate_hz();

    // Capacidade do link em amostras/s
    let link_capacity = f64::from(cfg.baud_rate) / BITS_PER_SERIAL_BYTE / PACKET_SIZE as f64
        * SAMPLES_PER_PACKET as f64;
    if sample_rate > link_capacity {
        warn!(
            "Taxa do ADC ({sample_rate:.0} S/s) excede a capacidade do link ({link_capacity:.0} S/s); \
             a escrita vai bloquear e amostras serão perdidas"
        );
    }

    // ── Saída ──
    let mut out: Box<dyn Write + Send> = if cfg.serial_port == "-" {
        Box::new(std::io::stdout())
    } else {
        match serialport::new(&cfg.serial_port, cfg.baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
        {
            Ok(port) => Box::new(port),
            Err(e) => {
                error!("Falha ao abrir {}: {e}", cfg.serial_port);
                std::process::exit(1);
            }
        }
    };

    let input = SineInput::new(
        cfg.signal_frequency_hz,
        cfg.signal_amplitude,
        cfg.signal_offset,
        sample_rate,
    );
    let mut adc = FreeRunningAdc::new(input, cfg.clock_divider);

    // ── Banner ──
    eprintln!();
    eprintln!("══════════════════════════════════════════════");
    eprintln!("   ⚡ SCOPE SAMPLER – ATIVO");
    eprintln!("══════════════════════════════════════════════");
    eprintln!("  Saída:     {} @ {} baud", cfg.serial_port, cfg.baud_rate);
    eprintln!(
        "  Divisor:   /{} ({sample_rate:.0} S/s, {:?} por conversão)",
        cfg.clock_divider.divisor(),
        adc.period()
    );
    eprintln!(
        "  Sinal:     {:.0} Hz, {}±{} códigos",
        cfg.signal_frequency_hz, cfg.signal_offset, cfg.signal_amplitude
    );
    eprintln!("══════════════════════════════════════════════");
    eprintln!();

    // ── Laço de aquisição em thread dedicada ──
    let handle = std::thread::Builder::new()
        .name("adc-sampler".into())
        .spawn(move || {
            let mut stats = TxStats::default();
            let result = packetizer::pump(&mut adc, &mut out, None, &mut stats);
            info!(
                "Aquisição encerrada: {} pacotes enviados, {} perdidos, {} ressincronizações do ADC",
                stats.packets_sent,
                stats.write_failures,
                adc.resyncs()
            );
            result
        })
        .expect("Falha ao criar thread do ADC");

    match handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Link encerrado: {e}");
            std::process::exit(1);
        }
        Err(_) => {
            error!("Thread do ADC terminou com pânico");
            std::process::exit(1);
        }
    }
}
