//! Buffer circular de amostras em volts.

use std::collections::VecDeque;

/// Janela deslizante com as amostras mais recentes de um canal.
///
/// Quando cheio, cada nova amostra descarta a mais antiga.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn extend<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        for value in values {
            self.push(value);
        }
    }

    /// Substitui todo o conteúdo (usado pelos canais derivados a cada recálculo).
    ///
    /// Se `values` for maior que a capacidade, apenas o final é mantido.
    pub fn replace(&mut self, values: &[f64]) {
        let skip = values.len().saturating_sub(self.capacity);
        self.samples.clear();
        self.samples.extend(&values[skip..]);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// Cópia contígua, da mais antiga para a mais recente.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}
