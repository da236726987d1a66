//! # Scope Host
//!
//! Recebe o fluxo serial do sampler, recupera o alinhamento dos pacotes,
//! mantém os canais físicos e matemáticos e publica as medições no log.
//!
//! Uma thread por entrada física lê e decodifica a serial; a thread principal
//! é dona do `Scope` e faz o recálculo e a exibição.
//!
//! ## Uso
//! ```bash
//! scope_host                          # portas definidas no config.toml
//! scope_sampler | scope_host          # com serial_port = "-" nos dois lados
//! ```

mod display;
mod health;
mod link_thread;

use crossbeam_channel::bounded;
use display::{LinkView, ScopeDisplay};
use health::LinkHealth;
use link_thread::{BatchQueue, LinkSettings, SampleBatch};
use scope_core::config::AppConfig;
use scope_core::types::ChannelId;
use std::sync::Arc;
use tracing::{info, warn};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let host = &config.host;
    let (tx, rx) = bounded::<SampleBatch>(host.queue_capacity.max(1));
    let queue = BatchQueue::new(tx, rx.clone());

    // ── Links ──
    let mut links = Vec::new();
    for (channel, port) in [
        (ChannelId::CH1, &host.serial_port),
        (ChannelId::CH2, &host.serial_port_ch2),
    ] {
        if port.is_empty() {
            info!("{channel}: sem porta configurada, canal ocioso");
            continue;
        }
        let health = Arc::new(LinkHealth::new());
        link_thread::spawn_link_thread(
            LinkSettings {
                channel,
                port: port.clone(),
                baud_rate: host.baud_rate,
                decoder: host.decoder.clone(),
            },
            queue.clone(),
            Arc::clone(&health),
        );
        links.push(LinkView { channel, health });
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ SCOPE HOST – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  CH1:       {}", host.serial_port);
    println!(
        "  CH2:       {}",
        if host.serial_port_ch2.is_empty() { "ociosa" } else { host.serial_port_ch2.as_str() }
    );
    println!(
        "  Taxa:      {:.0} S/s (divisor /{})",
        host.clock_divider.sample_rate_hz(),
        host.clock_divider.divisor()
    );
    println!("  Ganho:     {}", host.gain_range);
    println!("  Buffer:    {} amostras/canal", host.sample_buffer_depth);
    println!("══════════════════════════════════════════════");
    println!();

    ScopeDisplay::new(host, rx, links).run();
}
