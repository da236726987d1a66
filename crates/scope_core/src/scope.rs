//! Estado completo do osciloscópio no host: canais, medições e parâmetros de
//! aquisição.
//!
//! Um único dono (a thread de exibição) muta o `Scope`, então criação e
//! remoção de canais nunca competem com a atualização dos buffers.

use crate::channels::{Channel, ChannelError, ChannelRegistry, MathDefinition};
use crate::measurements::{MeasurementBank, MeasurementError, MeasurementSlot, Metric};
use crate::types::{ChannelId, ClockDivider, GainRange, RawSample};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Scope {
    registry: ChannelRegistry,
    measurements: MeasurementBank,
    gain: GainRange,
    clock_divider: ClockDivider,
}

impl Scope {
    pub fn new(buffer_depth: usize, gain: GainRange, clock_divider: ClockDivider) -> Self {
        Self {
            registry: ChannelRegistry::new(buffer_depth),
            measurements: MeasurementBank::new(),
            gain,
            clock_divider,
        }
    }

    pub fn gain(&self) -> GainRange {
        self.gain
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.clock_divider.sample_rate_hz()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.registry.channel(id)
    }

    pub fn measurements(&self) -> &MeasurementBank {
        &self.measurements
    }

    /// Converte códigos brutos de uma entrada física em volts e os acrescenta
    /// ao canal, propagando para os canais matemáticos e medições.
    pub fn ingest_raw(&mut self, channel: ChannelId, codes: &[RawSample]) -> Result<(), ChannelError> {
        let volts: Vec<f64> = codes.iter().map(|&c| self.gain.to_volts(c)).collect();
        self.push_volts(channel, &volts)
    }

    /// Acrescenta amostras já em volts a um canal físico.
    pub fn push_volts(&mut self, channel: ChannelId, volts: &[f64]) -> Result<(), ChannelError> {
        let changed = self.registry.push_samples(channel, volts)?;
        for id in changed {
            self.measurements.mark_stale(id);
        }
        Ok(())
    }

    pub fn create_derived(&mut self, def: MathDefinition) -> Result<ChannelId, ChannelError> {
        self.registry.create_derived(def)
    }

    /// Remove um canal matemático e libera as medições ligadas a ele.
    pub fn delete_derived(&mut self, id: ChannelId) -> Result<Vec<usize>, ChannelError> {
        self.registry.delete_derived(id)?;
        let freed = self.measurements.remove_bound_to(id);
        if !freed.is_empty() {
            info!("Medições {freed:?} liberadas junto com {id}");
        }
        Ok(freed)
    }

    pub fn add_measurement(&mut self, channel: ChannelId, metric: Metric) -> Result<usize, MeasurementError> {
        if !self.registry.contains(channel) {
            return Err(MeasurementError::UnknownChannel(channel));
        }
        let index = self.measurements.add(channel, metric)?;
        debug!("Medição {metric} de {channel} no slot {index}");
        Ok(index)
    }

    pub fn remove_measurement(&mut self, index: usize) -> Result<Option<MeasurementSlot>, MeasurementError> {
        self.measurements.remove(index)
    }

    /// Recalcula as medições marcadas como desatualizadas.
    pub fn refresh_measurements(&mut self) -> usize {
        let rate = self.clock_divider.sample_rate_hz();
        let registry = &self.registry;
        self.measurements
            .refresh(rate, |id| registry.channel(id).map(|c| c.buffer.to_vec()))
    }

    /// Troca a faixa de ganho, reescalando as amostras já capturadas.
    pub fn set_gain_range(&mut self, gain: GainRange) {
        if gain == self.gain {
            return;
        }
        let factor = gain.full_scale_vpp() / self.gain.full_scale_vpp();
        self.registry.rescale_physical(factor);
        self.measurements.mark_all_stale();
        info!("Faixa de ganho: {} → {}", self.gain, gain);
        self.gain = gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecoderSettings, StreamDecoder};
    use crate::math::{MathOperator, OperandOrder};
    use crate::measurements::Reading;
    use crate::protocol::pack_samples;
    use approx::assert_relative_eq;

    fn scope() -> Scope {
        Scope::new(64, GainRange::Mv500, ClockDivider::Div32)
    }

    fn add(a: ChannelId, b: ChannelId) -> MathDefinition {
        MathDefinition::new(MathOperator::Add, OperandOrder::AB, a, b)
    }

    #[test]
    fn packet_to_channel_end_to_end() {
        let packet = pack_samples([100, 200, 300, 400]).unwrap();
        assert_eq!(packet, [0x64, 0x20, 0xC3, 0x12, 0x64]);

        let mut decoder = StreamDecoder::aligned(DecoderSettings::default());
        let mut codes = Vec::new();
        decoder.push_bytes(&packet, &mut codes);
        assert_eq!(codes, vec![100, 200, 300, 400]);

        let mut scope = scope();
        scope.ingest_raw(ChannelId::CH1, &codes).unwrap();
        let buffer = scope.channel(ChannelId::CH1).unwrap().buffer.to_vec();
        assert_eq!(buffer.len(), 4);
        assert_relative_eq!(buffer[0], GainRange::Mv500.to_volts(100));
    }

    #[test]
    fn derived_add_end_to_end() {
        let mut scope = scope();
        scope.push_volts(ChannelId::CH1, &[1.0, -1.0]).unwrap();
        scope.push_volts(ChannelId::CH2, &[0.5, 0.5]).unwrap();
        let m = scope.create_derived(add(ChannelId::CH1, ChannelId::CH2)).unwrap();
        assert_eq!(scope.channel(m).unwrap().buffer.to_vec(), vec![1.5, -0.5]);
    }

    #[test]
    fn deleting_derived_cascades_to_measurements() {
        let mut scope = scope();
        let m = scope.create_derived(add(ChannelId::CH1, ChannelId::CH2)).unwrap();
        scope.add_measurement(m, Metric::Mean).unwrap();
        scope.add_measurement(ChannelId::CH1, Metric::Rms).unwrap();
        scope.add_measurement(m, Metric::PeakToPeak).unwrap();

        assert_eq!(scope.delete_derived(m), Ok(vec![0, 2]));
        assert_eq!(scope.measurements().occupied().count(), 1);
        assert!(scope.channel(m).is_none());
        assert_eq!(scope.add_measurement(ChannelId::CH2, Metric::Mean), Ok(0));
    }

    #[test]
    fn removed_slot_is_reused_first() {
        let mut scope = scope();
        for metric in [Metric::Mean, Metric::Rms, Metric::Maximum] {
            scope.add_measurement(ChannelId::CH1, metric).unwrap();
        }

        let removed = scope.remove_measurement(1).unwrap().unwrap();
        assert_eq!(removed.metric, Metric::Rms);
        assert_eq!(scope.remove_measurement(1), Ok(None));
        assert_eq!(scope.remove_measurement(7), Err(MeasurementError::InvalidSlot(7)));
        assert_eq!(scope.measurements().occupied().count(), 2);

        assert_eq!(scope.add_measurement(ChannelId::CH2, Metric::Minimum), Ok(1));
        assert_eq!(scope.add_measurement(ChannelId::CH2, Metric::Frequency), Ok(3));
        assert_eq!(
            scope.add_measurement(ChannelId::CH2, Metric::Mean),
            Err(MeasurementError::SlotsFull { max: 4 })
        );
    }

    #[test]
    fn measurement_on_unknown_channel_is_rejected() {
        let mut scope = scope();
        assert_eq!(
            scope.add_measurement(ChannelId(5), Metric::Mean),
            Err(MeasurementError::UnknownChannel(ChannelId(5)))
        );
        assert_eq!(scope.measurements().occupied().count(), 0);
    }

    #[test]
    fn measurements_follow_buffer_updates() {
        let mut scope = scope();
        let slot = scope.add_measurement(ChannelId::CH1, Metric::PeakToPeak).unwrap();
        assert_eq!(scope.refresh_measurements(), 1);
        assert!(matches!(
            scope.measurements().slot(slot).unwrap().value,
            Err(MeasurementError::BufferUnderrun { available: 0, .. })
        ));

        scope.push_volts(ChannelId::CH1, &[-0.1, 0.1]).unwrap();
        assert!(scope.measurements().slot(slot).unwrap().stale);
        scope.refresh_measurements();
        match scope.measurements().slot(slot).unwrap().value {
            Ok(Reading::Value(v)) => assert_relative_eq!(v, 0.2),
            ref other => panic!("leitura inesperada: {other:?}"),
        }
    }

    #[test]
    fn divide_by_zero_channel_reads_unbounded() {
        let mut scope = scope();
        let m = scope
            .create_derived(MathDefinition::new(
                MathOperator::Divide,
                OperandOrder::AB,
                ChannelId::CH1,
                ChannelId::CH2,
            ))
            .unwrap();
        let slot = scope.add_measurement(m, Metric::PeakToPeak).unwrap();
        scope.push_volts(ChannelId::CH2, &[0.0, 1.0]).unwrap();
        scope.push_volts(ChannelId::CH1, &[1.0, 1.0]).unwrap();
        scope.refresh_measurements();
        assert_eq!(scope.measurements().slot(slot).unwrap().value, Ok(Reading::Unbounded));
    }

    #[test]
    fn gain_switch_rescales_captured_samples() {
        let mut scope = scope();
        scope.ingest_raw(ChannelId::CH1, &[1023]).unwrap();
        assert_relative_eq!(scope.channel(ChannelId::CH1).unwrap().buffer.to_vec()[0], 0.25);

        scope.set_gain_range(GainRange::V5);
        assert_eq!(scope.gain(), GainRange::V5);
        assert_relative_eq!(scope.channel(ChannelId::CH1).unwrap().buffer.to_vec()[0], 2.5);

        scope.ingest_raw(ChannelId::CH1, &[0]).unwrap();
        assert_relative_eq!(scope.channel(ChannelId::CH1).unwrap().buffer.latest().unwrap(), -2.5);
    }
}
