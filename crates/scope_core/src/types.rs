//! Tipos básicos do osciloscópio: amostra bruta, identificador de canal,
//! faixa de ganho e divisor de clock do ADC.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Leitura bruta do ADC (10 bits, 0–1023).
pub type RawSample = u16;

/// Resolução do ADC em bits.
pub const SAMPLE_BITS: u32 = 10;

/// Maior código possível do ADC.
pub const SAMPLE_MAX: RawSample = (1 << SAMPLE_BITS) - 1;

/// Clock do microcontrolador (Hz).
pub const MCU_CLOCK_HZ: u32 = 16_000_000;

/// Ciclos de clock do ADC por conversão em modo free-running.
pub const ADC_CYCLES_PER_CONVERSION: u32 = 13;

// ──────────────────────────────────────────────
// Canais
// ──────────────────────────────────────────────

/// Identificador estável de canal. Nunca é reutilizado durante o processo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Entrada física 1.
    pub const CH1: ChannelId = ChannelId(1);
    /// Entrada física 2.
    pub const CH2: ChannelId = ChannelId(2);
    /// Primeiro id disponível para canais matemáticos.
    pub const FIRST_DERIVED: ChannelId = ChannelId(3);

    pub fn is_physical(self) -> bool {
        self == Self::CH1 || self == Self::CH2
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_physical() {
            write!(f, "CH{}", self.0)
        } else {
            write!(f, "M{}", self.0)
        }
    }
}

// ──────────────────────────────────────────────
// Ganho de entrada
// ──────────────────────────────────────────────

/// Faixa de ganho selecionada no estágio de entrada (fundo de escala pico-a-pico).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GainRange {
    #[default]
    #[serde(rename = "500mV")]
    Mv500,
    #[serde(rename = "1V")]
    V1,
    #[serde(rename = "5V")]
    V5,
}

impl GainRange {
    /// Fundo de escala em volts pico-a-pico.
    pub fn full_scale_vpp(self) -> f64 {
        match self {
            Self::Mv500 => 0.5,
            Self::V1 => 1.0,
            Self::V5 => 5.0,
        }
    }

    /// Converte um código do ADC em volts, centrado em zero.
    ///
    /// `0` mapeia para `-fs/2` e `1023` para `+fs/2`.
    pub fn to_volts(self, code: RawSample) -> f64 {
        let code = code.min(SAMPLE_MAX) as f64;
        (code / SAMPLE_MAX as f64 - 0.5) * self.full_scale_vpp()
    }
}

impl fmt::Display for GainRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mv500 => "500 mVpp",
            Self::V1 => "1 Vpp",
            Self::V5 => "5 Vpp",
        };
        f.write_str(label)
    }
}

// ──────────────────────────────────────────────
// Divisor de clock do ADC
// ──────────────────────────────────────────────

/// Prescaler do ADC, escolhido na compilação do firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ClockDivider {
    Div128,
    Div64,
    #[default]
    Div32,
    Div16,
}

impl ClockDivider {
    pub fn divisor(self) -> u32 {
        match self {
            Self::Div128 => 128,
            Self::Div64 => 64,
            Self::Div32 => 32,
            Self::Div16 => 16,
        }
    }

    /// Taxa de amostragem resultante (amostras/s).
    pub fn sample_rate_hz(self) -> f64 {
        MCU_CLOCK_HZ as f64 / self.divisor() as f64 / ADC_CYCLES_PER_CONVERSION as f64
    }
}

impl TryFrom<u32> for ClockDivider {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            128 => Ok(Self::Div128),
            64 => Ok(Self::Div64),
            32 => Ok(Self::Div32),
            16 => Ok(Self::Div16),
            other => Err(format!("divisor de clock inválido: {other} (128, 64, 32 ou 16)")),
        }
    }
}

impl From<ClockDivider> for u32 {
    fn from(value: ClockDivider) -> Self {
        value.divisor()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
