//! ADC em modo free-running.
//!
//! A conversão é contínua e o ritmo vem do divisor de clock: cada leitura
//! espera (busy-wait) até o instante da próxima conversão, como o laço de
//! polling do firmware.

use scope_core::types::{ClockDivider, RawSample, SAMPLE_MAX};
use std::time::{Duration, Instant};
use tracing::debug;

/// Atraso máximo (em conversões) antes de o relógio ser ressincronizado.
const MAX_LAG_CONVERSIONS: u32 = 1024;

/// Fonte de conversões do ADC.
pub trait AdcSource {
    /// Lê a próxima conversão.
    fn convert(&mut self) -> RawSample;
}

/// Senóide simulada na entrada analógica.
#[derive(Debug, Clone)]
pub struct SineInput {
    step: f64,
    amplitude: f64,
    offset: f64,
    phase: f64,
}

impl SineInput {
    pub fn new(frequency_hz: f64, amplitude: u16, offset: u16, sample_rate_hz: f64) -> Self {
        Self {
            step: std::f64::consts::TAU * frequency_hz / sample_rate_hz,
            amplitude: f64::from(amplitude),
            offset: f64::from(offset),
            phase: 0.0,
        }
    }
}

impl AdcSource for SineInput {
    fn convert(&mut self) -> RawSample {
        let value = self.offset + self.amplitude * self.phase.sin();
        self.phase = (self.phase + self.step) % std::f64::consts::TAU;
        value.round().clamp(0.0, f64::from(SAMPLE_MAX)) as RawSample
    }
}

/// Marca o ritmo de uma fonte pelo período de conversão do divisor de clock.
pub struct FreeRunningAdc<S> {
    source: S,
    period: Duration,
    next_conversion: Instant,
    resyncs: u64,
}

impl<S: AdcSource> FreeRunningAdc<S> {
    pub fn new(source: S, divider: ClockDivider) -> Self {
        Self {
            source,
            period: Duration::from_secs_f64(1.0 / divider.sample_rate_hz()),
            next_conversion: Instant::now(),
            resyncs: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Vezes em que o laço ficou atrasado demais e o relógio foi reiniciado.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}

impl<S: AdcSource> AdcSource for FreeRunningAdc<S> {
    fn convert(&mut self) -> RawSample {
        while Instant::now() < self.next_conversion {
            std::hint::spin_loop();
        }

        let now = Instant::now();
        if now.duration_since(self.next_conversion) > self.period * MAX_LAG_CONVERSIONS {
            self.resyncs += 1;
            debug!("ADC atrasado {:?}; ressincronizando", now - self.next_conversion);
            self.next_conversion = now;
        }
        self.next_conversion += self.period;

        self.source.convert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_stays_within_configured_swing() {
        let mut input = SineInput::new(1000.0, 400, 512, 38_462.0);
        let samples: Vec<RawSample> = (0..2000).map(|_| input.convert()).collect();
        assert!(samples.iter().all(|&s| (112..=912).contains(&s)));
        assert_eq!(samples[0], 512);
        assert!(samples.iter().any(|&s| s >= 900));
        assert!(samples.iter().any(|&s| s <= 124));
    }

    #[test]
    fn sine_is_clamped_to_adc_range() {
        let mut input = SineInput::new(100.0, 1000, 512, 10_000.0);
        assert!((0..500).map(|_| input.convert()).all(|s| s <= SAMPLE_MAX));
    }

    #[test]
    fn free_running_adc_paces_conversions() {
        struct Counter(RawSample);
        impl AdcSource for Counter {
            fn convert(&mut self) -> RawSample {
                self.0 = (self.0 + 1) % 1024;
                self.0
            }
        }

        let mut adc = FreeRunningAdc::new(Counter(0), ClockDivider::Div16);
        let start = Instant::now();
        for _ in 0..200 {
            adc.convert();
        }
        // 200 conversões a ~76.9 kS/s levam pelo menos 199 períodos.
        assert!(start.elapsed() >= adc.period() * 199);
        assert_eq!(adc.source.0, 200);
    }
}
