//! Medições automáticas: quatro slots fixos, cada um ligado a um canal e a
//! uma métrica.
//!
//! Os valores ficam em cache e só são recalculados no próximo `refresh` depois
//! que o buffer do canal muda (`mark_stale`).

use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantidade fixa de slots.
pub const MEASUREMENT_SLOTS: usize = 4;

/// Fração do intervalo min–max usada como histerese em cada lado do limiar.
const HYSTERESIS_FRACTION: f64 = 0.10;

/// Erros das medições.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeasurementError {
    #[error("Todos os {max} slots de medição estão ocupados")]
    SlotsFull { max: usize },

    #[error("Amostras insuficientes: {available} disponíveis, {required} necessárias")]
    BufferUnderrun { available: usize, required: usize },

    #[error("Canal {0} não existe")]
    UnknownChannel(ChannelId),

    #[error("Slot {0} inválido (0..{MEASUREMENT_SLOTS})")]
    InvalidSlot(usize),
}

/// Métrica calculada sobre o buffer de um canal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PeakToPeak,
    Mean,
    Rms,
    Frequency,
    Minimum,
    Maximum,
}

/// Resultado de uma métrica.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Value(f64),
    /// Algum operando infinito (ex: divisão por zero num canal matemático).
    Unbounded,
    /// Sem valor definido (média de infinitos, sinal sem período...).
    Undefined,
}

impl Metric {
    /// Amostras mínimas para a métrica fazer sentido.
    pub fn required_samples(self) -> usize {
        match self {
            Self::Frequency => 3,
            _ => 1,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Frequency => "Hz",
            _ => "V",
        }
    }

    pub fn compute(self, samples: &[f64], sample_rate_hz: f64) -> Result<Reading, MeasurementError> {
        let required = self.required_samples();
        if samples.len() < required {
            return Err(MeasurementError::BufferUnderrun {
                available: samples.len(),
                required,
            });
        }

        let reading = match self {
            Self::PeakToPeak => peak_to_peak(samples),
            Self::Mean => mean(samples),
            Self::Rms => rms(samples),
            Self::Frequency => frequency(samples, sample_rate_hz),
            Self::Minimum => minimum(samples),
            Self::Maximum => maximum(samples),
        };
        Ok(reading)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PeakToPeak => "Vpp",
            Self::Mean => "Média",
            Self::Rms => "RMS",
            Self::Frequency => "Freq",
            Self::Minimum => "Mín",
            Self::Maximum => "Máx",
        };
        f.write_str(name)
    }
}

// ──────────────────────────────────────────────
// Métricas
// ──────────────────────────────────────────────

fn has_nan(samples: &[f64]) -> bool {
    samples.iter().any(|v| v.is_nan())
}

fn peak_to_peak(samples: &[f64]) -> Reading {
    if has_nan(samples) {
        return Reading::Undefined;
    }
    if samples.iter().any(|v| v.is_infinite()) {
        return Reading::Unbounded;
    }
    let (min, max) = finite_bounds(samples).unwrap_or((0.0, 0.0));
    Reading::Value(max - min)
}

fn minimum(samples: &[f64]) -> Reading {
    if has_nan(samples) {
        return Reading::Undefined;
    }
    if samples.contains(&f64::NEG_INFINITY) {
        return Reading::Unbounded;
    }
    Reading::Value(samples.iter().copied().fold(f64::INFINITY, f64::min))
}

fn maximum(samples: &[f64]) -> Reading {
    if has_nan(samples) {
        return Reading::Undefined;
    }
    if samples.contains(&f64::INFINITY) {
        return Reading::Unbounded;
    }
    Reading::Value(samples.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

fn mean(samples: &[f64]) -> Reading {
    if samples.iter().any(|v| !v.is_finite()) {
        return Reading::Undefined;
    }
    Reading::Value(samples.iter().sum::<f64>() / samples.len() as f64)
}

fn rms(samples: &[f64]) -> Reading {
    if samples.iter().any(|v| !v.is_finite()) {
        return Reading::Undefined;
    }
    let sum_sq: f64 = samples.iter().map(|v| v * v).sum();
    Reading::Value((sum_sq / samples.len() as f64).sqrt())
}

fn finite_bounds(samples: &[f64]) -> Option<(f64, f64)> {
    samples
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v))),
        })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TriggerState {
    /// Ainda dentro da faixa de histerese desde o início do buffer.
    Fresh,
    Below,
    Above,
}

/// Frequência pela contagem de cruzamentos ascendentes com histerese.
fn frequency(samples: &[f64], sample_rate_hz: f64) -> Reading {
    let Some((min, max)) = finite_bounds(samples) else {
        return Reading::Undefined;
    };
    let span = max - min;
    if span <= 0.0 {
        return Reading::Undefined;
    }

    let threshold = min + span / 2.0;
    let high = threshold + span * HYSTERESIS_FRACTION;
    let low = threshold - span * HYSTERESIS_FRACTION;

    let mut state = TriggerState::Fresh;
    let mut first: Option<usize> = None;
    let mut last = 0usize;
    let mut crossings = 0usize;

    for (index, &value) in samples.iter().enumerate() {
        if value > high {
            if state == TriggerState::Below {
                crossings += 1;
                first.get_or_insert(index);
                last = index;
            }
            state = TriggerState::Above;
        } else if value < low {
            state = TriggerState::Below;
        }
    }

    match first {
        Some(first) if crossings >= 2 && last > first => {
            Reading::Value((crossings - 1) as f64 * sample_rate_hz / (last - first) as f64)
        }
        _ => Reading::Undefined,
    }
}

// ──────────────────────────────────────────────
// Slots
// ──────────────────────────────────────────────

/// Um slot ocupado.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSlot {
    pub channel: ChannelId,
    pub metric: Metric,
    /// Último valor calculado.
    pub value: Result<Reading, MeasurementError>,
    /// O buffer do canal mudou desde o último cálculo.
    pub stale: bool,
}

impl MeasurementSlot {
    fn new(channel: ChannelId, metric: Metric) -> Self {
        Self {
            channel,
            metric,
            value: Err(MeasurementError::BufferUnderrun {
                available: 0,
                required: metric.required_samples(),
            }),
            stale: true,
        }
    }

    /// Texto do valor atual, ex: `0.5000 V`.
    pub fn display_value(&self) -> String {
        match &self.value {
            Ok(Reading::Value(v)) if self.metric == Metric::Frequency => format!("{v:.1} {}", self.metric.unit()),
            Ok(Reading::Value(v)) => format!("{v:.4} {}", self.metric.unit()),
            Ok(Reading::Unbounded) => "∞".into(),
            Ok(Reading::Undefined) => "indefinido".into(),
            Err(MeasurementError::BufferUnderrun { .. }) => "sem amostras".into(),
            Err(e) => e.to_string(),
        }
    }
}

/// Os quatro slots de medição.
#[derive(Debug, Clone, Default)]
pub struct MeasurementBank {
    slots: [Option<MeasurementSlot>; MEASUREMENT_SLOTS],
}

impl MeasurementBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ocupa o menor slot livre. A existência do canal é validada por quem chama.
    pub fn add(&mut self, channel: ChannelId, metric: Metric) -> Result<usize, MeasurementError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(MeasurementError::SlotsFull {
                max: MEASUREMENT_SLOTS,
            })?;
        self.slots[index] = Some(MeasurementSlot::new(channel, metric));
        Ok(index)
    }

    /// Libera o slot. Remover um slot vazio não é erro.
    pub fn remove(&mut self, index: usize) -> Result<Option<MeasurementSlot>, MeasurementError> {
        self.slots
            .get_mut(index)
            .map(Option::take)
            .ok_or(MeasurementError::InvalidSlot(index))
    }

    /// Libera todos os slots ligados ao canal. Retorna os índices liberados.
    pub fn remove_bound_to(&mut self, channel: ChannelId) -> Vec<usize> {
        let mut freed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|s| s.channel == channel) {
                *slot = None;
                freed.push(index);
            }
        }
        freed
    }

    pub fn mark_stale(&mut self, channel: ChannelId) {
        for slot in self.slots.iter_mut().flatten() {
            if slot.channel == channel {
                slot.stale = true;
            }
        }
    }

    /// Marca todos os slots ocupados para recálculo.
    pub fn mark_all_stale(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.stale = true;
        }
    }

    /// Recalcula os slots marcados. `samples_of` devolve o buffer de um canal.
    ///
    /// Retorna quantos slots foram recalculados.
    pub fn refresh<F>(&mut self, sample_rate_hz: f64, mut samples_of: F) -> usize
    where
        F: FnMut(ChannelId) -> Option<Vec<f64>>,
    {
        let mut recomputed = 0;
        for slot in self.slots.iter_mut().flatten().filter(|s| s.stale) {
            slot.value = match samples_of(slot.channel) {
                Some(samples) => slot.metric.compute(&samples, sample_rate_hz),
                None => Err(MeasurementError::UnknownChannel(slot.channel)),
            };
            slot.stale = false;
            recomputed += 1;
        }
        recomputed
    }

    pub fn slot(&self, index: usize) -> Option<&MeasurementSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Slots ocupados com seus índices.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &MeasurementSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, s)))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn value(reading: Result<Reading, MeasurementError>) -> f64 {
        match reading {
            Ok(Reading::Value(v)) => v,
            other => panic!("esperava valor, obteve {other:?}"),
        }
    }

    #[test]
    fn amplitude_metrics() {
        let samples = [1.0, -1.0, 1.0, -1.0];
        assert_relative_eq!(value(Metric::PeakToPeak.compute(&samples, 1.0)), 2.0);
        assert_relative_eq!(value(Metric::Mean.compute(&samples, 1.0)), 0.0);
        assert_relative_eq!(value(Metric::Rms.compute(&samples, 1.0)), 1.0);
        assert_relative_eq!(value(Metric::Minimum.compute(&samples, 1.0)), -1.0);
        assert_relative_eq!(value(Metric::Maximum.compute(&samples, 1.0)), 1.0);
    }

    #[test]
    fn infinities_are_explicit() {
        let samples = [1.0, f64::INFINITY, 0.5];
        assert_eq!(Metric::PeakToPeak.compute(&samples, 1.0), Ok(Reading::Unbounded));
        assert_eq!(Metric::Mean.compute(&samples, 1.0), Ok(Reading::Undefined));
        assert_eq!(Metric::Rms.compute(&samples, 1.0), Ok(Reading::Undefined));
        assert_eq!(Metric::Maximum.compute(&samples, 1.0), Ok(Reading::Unbounded));
        assert_relative_eq!(value(Metric::Minimum.compute(&samples, 1.0)), 0.5);

        let negative = [f64::NEG_INFINITY, 0.0];
        assert_eq!(Metric::Minimum.compute(&negative, 1.0), Ok(Reading::Unbounded));
        assert_eq!(Metric::PeakToPeak.compute(&negative, 1.0), Ok(Reading::Unbounded));
    }

    #[test]
    fn empty_buffer_is_underrun() {
        assert_eq!(
            Metric::Mean.compute(&[], 1.0),
            Err(MeasurementError::BufferUnderrun {
                available: 0,
                required: 1
            })
        );
        assert_eq!(
            Metric::Frequency.compute(&[0.0, 1.0], 1.0),
            Err(MeasurementError::BufferUnderrun {
                available: 2,
                required: 3
            })
        );
    }

    #[test]
    fn square_wave_frequency() {
        // Período de 40 amostras a 40 kHz.
        let samples: Vec<f64> = (0..400).map(|i| if (i / 20) % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_relative_eq!(value(Metric::Frequency.compute(&samples, 40_000.0)), 1000.0);
    }

    #[test]
    fn sine_frequency() {
        let rate = 38_461.5;
        let samples: Vec<f64> = (0..4096)
            .map(|i| (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / rate).sin() * 0.2)
            .collect();
        let f = value(Metric::Frequency.compute(&samples, rate));
        assert!((f - 1000.0).abs() < 5.0, "frequência {f}");
    }

    #[test]
    fn noise_inside_hysteresis_does_not_count() {
        // Pequenas oscilações em torno do limiar não geram cruzamentos extras.
        let mut samples = Vec::new();
        for _ in 0..4 {
            samples.extend([-1.0, -1.0, 0.05, -0.05, 0.05, 1.0, 1.0, -0.05, 0.05, -0.05]);
        }
        let f = value(Metric::Frequency.compute(&samples, 10.0));
        assert_relative_eq!(f, 1.0);
    }

    #[test]
    fn dc_signal_has_no_frequency() {
        assert_eq!(Metric::Frequency.compute(&[0.3; 100], 1000.0), Ok(Reading::Undefined));
        let single_edge = [-1.0, -1.0, 1.0, 1.0];
        assert_eq!(Metric::Frequency.compute(&single_edge, 1000.0), Ok(Reading::Undefined));
    }

    #[test]
    fn fifth_measurement_is_rejected_and_freed_slot_is_reused() {
        let mut bank = MeasurementBank::new();
        for expected in 0..MEASUREMENT_SLOTS {
            assert_eq!(bank.add(ChannelId::CH1, Metric::Mean), Ok(expected));
        }
        assert_eq!(
            bank.add(ChannelId::CH2, Metric::Rms),
            Err(MeasurementError::SlotsFull { max: 4 })
        );

        bank.remove(2).unwrap();
        assert_eq!(bank.add(ChannelId::CH2, Metric::Rms), Ok(2));
        assert_eq!(bank.slot(2).unwrap().channel, ChannelId::CH2);
    }

    #[test]
    fn remove_is_unconditional_but_index_is_checked() {
        let mut bank = MeasurementBank::new();
        assert_eq!(bank.remove(1), Ok(None));
        assert_eq!(bank.remove(4), Err(MeasurementError::InvalidSlot(4)));
    }

    #[test]
    fn removing_channel_clears_bound_slots() {
        let mut bank = MeasurementBank::new();
        bank.add(ChannelId(3), Metric::Mean).unwrap();
        bank.add(ChannelId::CH1, Metric::Mean).unwrap();
        bank.add(ChannelId(3), Metric::Frequency).unwrap();
        assert_eq!(bank.remove_bound_to(ChannelId(3)), vec![0, 2]);
        assert_eq!(bank.occupied().count(), 1);
    }

    #[test]
    fn refresh_only_recomputes_stale_slots() {
        let mut bank = MeasurementBank::new();
        bank.add(ChannelId::CH1, Metric::PeakToPeak).unwrap();
        bank.add(ChannelId::CH2, Metric::PeakToPeak).unwrap();

        let lookup = |id: ChannelId| Some(if id == ChannelId::CH1 { vec![0.0, 2.0] } else { vec![1.0] });
        assert_eq!(bank.refresh(1.0, lookup), 2);
        assert_eq!(bank.refresh(1.0, lookup), 0);

        bank.mark_stale(ChannelId::CH1);
        assert_eq!(bank.refresh(1.0, lookup), 1);
        assert_eq!(bank.slot(0).unwrap().value, Ok(Reading::Value(2.0)));
        assert_eq!(bank.slot(0).unwrap().display_value(), "2.0000 V");
    }

    #[test]
    fn display_value_uses_metric_unit() {
        let slot = MeasurementSlot {
            value: Ok(Reading::Value(1000.0)),
            stale: false,
            ..MeasurementSlot::new(ChannelId::CH2, Metric::Frequency)
        };
        assert_eq!(slot.display_value(), "1000.0 Hz");

        let rms = MeasurementSlot {
            value: Ok(Reading::Value(0.125)),
            ..MeasurementSlot::new(ChannelId::CH2, Metric::Rms)
        };
        assert_eq!(rms.display_value(), "0.1250 V");
    }

    #[test]
    fn metric_names_in_toml() {
        #[derive(Deserialize)]
        struct Row {
            metric: Metric,
        }
        let row: Row = toml::from_str("metric = \"peak_to_peak\"").unwrap();
        assert_eq!(row.metric, Metric::PeakToPeak);
    }
}
