//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável alimenta o sampler e o host.

use crate::channels::{MAX_DERIVED_CHANNELS, MathDefinition};
use crate::decoder::DecoderSettings;
use crate::measurements::{MEASUREMENT_SLOTS, Metric};
use crate::protocol::DEFAULT_BAUD_RATE;
use crate::types::{ChannelId, ClockDivider, GainRange, SAMPLE_MAX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Erros de leitura/escrita da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML inválido: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Falha ao serializar: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuração do sampler (papel do firmware).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Porta serial de saída ("-" = stdout)
    pub serial_port: String,
    pub baud_rate: u32,
    /// Prescaler do ADC: 128, 64, 32 ou 16
    pub clock_divider: ClockDivider,
    /// Frequência do sinal simulado na entrada
    pub signal_frequency_hz: f64,
    /// Amplitude do sinal simulado (códigos do ADC)
    pub signal_amplitude: u16,
    /// Nível DC do sinal simulado (códigos do ADC)
    pub signal_offset: u16,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            serial_port: "-".into(),
            baud_rate: DEFAULT_BAUD_RATE,
            clock_divider: ClockDivider::default(),
            signal_frequency_hz: 1000.0,
            signal_amplitude: 400,
            signal_offset: 512,
        }
    }
}

/// Medição criada na inicialização do host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub channel: ChannelId,
    pub metric: Metric,
}

/// Configuração do host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Porta serial da entrada CH1
    pub serial_port: String,
    /// Porta serial da entrada CH2 (vazio = CH2 sem sinal)
    pub serial_port_ch2: String,
    pub baud_rate: u32,
    /// Prescaler compilado no firmware (define a taxa de amostragem)
    pub clock_divider: ClockDivider,
    pub gain_range: GainRange,
    /// Amostras mantidas por canal
    pub sample_buffer_depth: usize,
    /// Lotes em trânsito entre as threads de link e a de exibição
    pub queue_capacity: usize,
    /// Intervalo de recálculo e exibição das medições
    pub refresh_interval_ms: u64,
    pub decoder: DecoderSettings,
    /// Canais matemáticos criados na inicialização (ids a partir de 3, na ordem)
    pub math_channels: Vec<MathDefinition>,
    pub measurements: Vec<MeasurementConfig>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port().into(),
            serial_port_ch2: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            clock_divider: ClockDivider::default(),
            gain_range: GainRange::default(),
            sample_buffer_depth: 4096,
            queue_capacity: 64,
            refresh_interval_ms: 200,
            decoder: DecoderSettings::default(),
            math_channels: Vec::new(),
            measurements: vec![
                MeasurementConfig {
                    channel: ChannelId::CH1,
                    metric: Metric::PeakToPeak,
                },
                MeasurementConfig {
                    channel: ChannelId::CH1,
                    metric: Metric::Frequency,
                },
            ],
        }
    }
}

fn default_serial_port() -> &'static str {
    if cfg!(windows) { "COM3" } else { "/dev/ttyACM0" }
}

/// Configuração raiz do aplicativo (unifica sampler e host).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sampler: SamplerConfig,
    pub host: HostConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML, caindo para o padrão em caso de erro.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path)
                .map_err(ConfigError::from)
                .and_then(|content| Self::parse(&content))
            {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("Erro ao carregar {}: {}", path.display(), e),
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let sampler = &self.sampler;
        let host = &self.host;

        if sampler.serial_port.is_empty() {
            errors.push("Porta serial do sampler vazia (use \"-\" para stdout)".into());
        }
        if sampler.baud_rate == 0 || host.baud_rate == 0 {
            errors.push("Baud rate não pode ser 0".into());
        }
        let nyquist = sampler.clock_divider.sample_rate_hz() / 2.0;
        if !(sampler.signal_frequency_hz > 0.0 && sampler.signal_frequency_hz < nyquist) {
            errors.push(format!(
                "Frequência do sinal inválida: {} Hz (0–{nyquist:.0})",
                sampler.signal_frequency_hz
            ));
        } else if sampler.signal_frequency_hz > nyquist * 2.0 / 7.0 {
            errors.push(format!(
                "Sinal de {} Hz acima de 1/7 da taxa: o host pode não recuperar o alinhamento",
                sampler.signal_frequency_hz
            ));
        }
        if sampler.signal_amplitude > sampler.signal_offset
            || u32::from(sampler.signal_offset) + u32::from(sampler.signal_amplitude) > u32::from(SAMPLE_MAX)
        {
            errors.push(format!(
                "Sinal {}±{} sai da faixa do ADC (0–{SAMPLE_MAX})",
                sampler.signal_offset, sampler.signal_amplitude
            ));
        }

        if host.serial_port.is_empty() {
            errors.push("Porta serial do CH1 não pode ser vazia".into());
        }
        if host.sample_buffer_depth == 0 {
            errors.push("sample_buffer_depth deve ser maior que 0".into());
        }
        if host.queue_capacity == 0 {
            errors.push("queue_capacity deve ser maior que 0".into());
        }
        if host.refresh_interval_ms == 0 {
            errors.push("refresh_interval_ms deve ser maior que 0".into());
        }
        if host.decoder.lookahead_packets == 0 || host.decoder.desync_after == 0 {
            errors.push("lookahead_packets e desync_after devem ser maiores que 0".into());
        }
        if host.decoder.max_step == 0 || host.decoder.max_step > SAMPLE_MAX {
            errors.push(format!(
                "max_step inválido: {} (1–{SAMPLE_MAX})",
                host.decoder.max_step
            ));
        }

        if host.math_channels.len() > MAX_DERIVED_CHANNELS {
            errors.push(format!(
                "{} canais matemáticos configurados (máximo {MAX_DERIVED_CHANNELS})",
                host.math_channels.len()
            ));
        }
        for def in &host.math_channels {
            for operand in [def.operand_a, def.operand_b] {
                if !operand.is_physical() {
                    errors.push(format!("Operando {operand} inválido: use CH1 (1) ou CH2 (2)"));
                }
            }
        }

        if host.measurements.len() > MEASUREMENT_SLOTS {
            errors.push(format!(
                "{} medições configuradas (máximo {MEASUREMENT_SLOTS})",
                host.measurements.len()
            ));
        }
        let last_derived = ChannelId::FIRST_DERIVED.0 + host.math_channels.len() as u32;
        for m in &host.measurements {
            if m.channel.0 == 0 || m.channel.0 >= last_derived {
                errors.push(format!("Medição ligada a canal inexistente: {}", m.channel));
            }
        }

        errors
    }
}
