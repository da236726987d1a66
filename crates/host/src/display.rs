//! Laço de exibição: dono exclusivo do `Scope`.
//!
//! Drena os lotes das threads de link, recalcula as medições a cada
//! `refresh_interval_ms` e publica as leituras no log.

use crate::health::{HealthSnapshot, LinkHealth};
use crate::link_thread::SampleBatch;
use crossbeam_channel::Receiver;
use scope_core::config::HostConfig;
use scope_core::scope::Scope;
use scope_core::types::ChannelId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pausa entre varreduras da fila.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Intervalo entre relatórios de saúde dos links.
const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Link acompanhado pela exibição.
pub struct LinkView {
    pub channel: ChannelId,
    pub health: Arc<LinkHealth>,
}

pub struct ScopeDisplay {
    scope: Scope,
    rx: Receiver<SampleBatch>,
    links: Vec<LinkView>,
    refresh_interval: Duration,
    last_refresh: Instant,
    last_health_report: Instant,
    last_batch_time: Option<Instant>,
}

impl ScopeDisplay {
    /// Monta o `Scope` e aplica os canais matemáticos e medições da configuração.
    pub fn new(config: &HostConfig, rx: Receiver<SampleBatch>, links: Vec<LinkView>) -> Self {
        let mut scope = Scope::new(config.sample_buffer_depth, config.gain_range, config.clock_divider);
        apply_startup_config(&mut scope, config);

        Self {
            scope,
            rx,
            links,
            refresh_interval: Duration::from_millis(config.refresh_interval_ms),
            last_refresh: Instant::now(),
            last_health_report: Instant::now(),
            last_batch_time: None,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Processa os lotes pendentes. Retorna quantos foram aplicados.
    pub fn poll_links(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(batch) = self.rx.try_recv() {
            match self.scope.ingest_raw(batch.channel, &batch.codes) {
                Ok(()) => applied += 1,
                Err(e) => warn!("Lote descartado: {e}"),
            }
            self.last_batch_time = Some(Instant::now());
        }
        applied
    }

    /// Recalcula as medições desatualizadas e retorna as linhas de leitura.
    pub fn refresh(&mut self) -> Vec<String> {
        self.scope.refresh_measurements();
        self.scope
            .measurements()
            .occupied()
            .map(|(index, slot)| format!("[{index}] {} {}: {}", slot.channel, slot.metric, slot.display_value()))
            .collect()
    }

    pub fn health(&self) -> Vec<(ChannelId, HealthSnapshot)> {
        self.links
            .iter()
            .map(|link| (link.channel, link.health.snapshot()))
            .collect()
    }

    /// Roda para sempre na thread atual.
    pub fn run(mut self) {
        loop {
            self.tick(Instant::now());
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn tick(&mut self, now: Instant) {
        let applied = self.poll_links();
        if applied > 0 {
            debug!("{applied} lote(s) aplicados");
        }

        if now.duration_since(self.last_refresh) >= self.refresh_interval {
            self.last_refresh = now;
            let lines = self.refresh();
            if !lines.is_empty() && self.last_batch_time.is_some() {
                info!("[{}] {}", self.scope().gain(), lines.join(" | "));
            }
        }

        if now.duration_since(self.last_health_report) >= HEALTH_REPORT_INTERVAL {
            self.last_health_report = now;
            for (channel, snapshot) in self.health() {
                if snapshot.connected {
                    info!("{channel} link: {snapshot}");
                } else {
                    warn!("{channel} link: {snapshot}");
                }
            }
        }
    }
}

fn apply_startup_config(scope: &mut Scope, config: &HostConfig) {
    for def in &config.math_channels {
        if let Err(e) = scope.create_derived(*def) {
            warn!("Canal matemático ignorado ({} {} {}): {e}", def.operand_a, def.operator, def.operand_b);
        }
    }
    for m in &config.measurements {
        match scope.add_measurement(m.channel, m.metric) {
            Ok(index) => info!("Medição {} de {} no slot {index}", m.metric, m.channel),
            Err(e) => warn!("Medição ignorada ({} de {}): {e}", m.metric, m.channel),
        }
    }
}
