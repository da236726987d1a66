//! Registro de canais: as duas entradas físicas e até três canais matemáticos.

use crate::buffer::SampleBuffer;
use crate::math::{self, MathOperator, OperandOrder};
use crate::palette::{CH1_COLOR, CH2_COLOR, ColorHex, MATH_PALETTE, color_name};
use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Máximo de canais matemáticos simultâneos.
pub const MAX_DERIVED_CHANNELS: usize = 3;

/// Maior nível de aninhamento aceito (canais físicos têm nível 0).
pub const MAX_MATH_LEVEL: u8 = 1;

/// Erros do registro de canais. Nenhum deles altera o estado.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Aninhamento matemático não suportado: nível {level} (máximo {MAX_MATH_LEVEL})")]
    NestingTooDeep { level: u8 },

    #[error("Limite de {max} canais matemáticos atingido")]
    ChannelLimitReached { max: usize },

    #[error("Canal {0} não existe")]
    UnknownChannel(ChannelId),

    #[error("Canal físico {0} não pode ser removido")]
    PhysicalChannel(ChannelId),

    #[error("Canal {0} é derivado e não recebe amostras")]
    DerivedChannel(ChannelId),
}

/// Definição de um canal matemático.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathDefinition {
    pub operator: MathOperator,
    #[serde(default)]
    pub order: OperandOrder,
    pub operand_a: ChannelId,
    pub operand_b: ChannelId,
}

impl MathDefinition {
    pub fn new(operator: MathOperator, order: OperandOrder, operand_a: ChannelId, operand_b: ChannelId) -> Self {
        Self {
            operator,
            order,
            operand_a,
            operand_b,
        }
    }

    fn depends_on(&self, id: ChannelId) -> bool {
        self.operand_a == id || self.operand_b == id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelKind {
    Physical,
    Derived(MathDefinition),
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub math_level: u8,
    pub color: ColorHex,
    pub buffer: SampleBuffer,
}

impl Channel {
    pub fn is_physical(&self) -> bool {
        self.kind == ChannelKind::Physical
    }

    /// Rótulo para logs, ex: `M3 = CH1 + CH2`.
    pub fn label(&self) -> String {
        match &self.kind {
            ChannelKind::Physical => self.id.to_string(),
            ChannelKind::Derived(def) => format!(
                "{} = {}",
                self.id,
                math::describe(def.operator, def.order, def.operand_a, def.operand_b)
            ),
        }
    }
}

/// Conjunto de canais vivos, indexados por id.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelId, Channel>,
    next_id: u32,
    buffer_depth: usize,
    /// Índice na paleta da última cor atribuída.
    last_color: Option<usize>,
}

impl ChannelRegistry {
    /// Cria o registro com CH1 e CH2 já presentes.
    pub fn new(buffer_depth: usize) -> Self {
        let mut registry = Self {
            channels: BTreeMap::new(),
            next_id: ChannelId::FIRST_DERIVED.0,
            buffer_depth,
            last_color: None,
        };
        registry.create_physical(ChannelId::CH1, CH1_COLOR);
        registry.create_physical(ChannelId::CH2, CH2_COLOR);
        registry
    }

    fn create_physical(&mut self, id: ChannelId, color: ColorHex) {
        self.channels.insert(
            id,
            Channel {
                id,
                kind: ChannelKind::Physical,
                math_level: 0,
                color,
                buffer: SampleBuffer::new(self.buffer_depth),
            },
        );
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    /// Canais vivos em ordem de id.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn derived_count(&self) -> usize {
        self.channels.values().filter(|c| !c.is_physical()).count()
    }

    /// Cria um canal matemático e calcula seu buffer inicial.
    pub fn create_derived(&mut self, def: MathDefinition) -> Result<ChannelId, ChannelError> {
        let level_a = self.level_of(def.operand_a)?;
        let level_b = self.level_of(def.operand_b)?;

        let level = 1 + level_a.max(level_b);
        if level > MAX_MATH_LEVEL {
            return Err(ChannelError::NestingTooDeep { level });
        }
        if self.derived_count() >= MAX_DERIVED_CHANNELS {
            return Err(ChannelError::ChannelLimitReached {
                max: MAX_DERIVED_CHANNELS,
            });
        }

        let color_index = self.next_color_index();
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        self.last_color = Some(color_index);

        let mut channel = Channel {
            id,
            kind: ChannelKind::Derived(def),
            math_level: level,
            color: MATH_PALETTE[color_index],
            buffer: SampleBuffer::new(self.buffer_depth),
        };
        channel.buffer.replace(&self.compute(&def));

        info!(
            "Canal matemático criado: {} ({})",
            channel.label(),
            color_name(channel.color)
        );
        self.channels.insert(id, channel);
        Ok(id)
    }

    /// Remove um canal matemático, liberando sua cor.
    pub fn delete_derived(&mut self, id: ChannelId) -> Result<Channel, ChannelError> {
        match self.channels.get(&id) {
            None => Err(ChannelError::UnknownChannel(id)),
            Some(channel) if channel.is_physical() => Err(ChannelError::PhysicalChannel(id)),
            Some(_) => {
                let removed = self
                    .channels
                    .remove(&id)
                    .ok_or(ChannelError::UnknownChannel(id))?;
                info!("Canal matemático removido: {}", removed.label());
                Ok(removed)
            }
        }
    }

    /// Acrescenta amostras (em volts) a um canal físico e recalcula os
    /// canais que dependem dele.
    ///
    /// Retorna os ids cujo buffer mudou, o próprio canal primeiro.
    pub fn push_samples(&mut self, id: ChannelId, volts: &[f64]) -> Result<Vec<ChannelId>, ChannelError> {
        let channel = self
            .channels
            .get_mut(&id)
            .ok_or(ChannelError::UnknownChannel(id))?;
        if !channel.is_physical() {
            return Err(ChannelError::DerivedChannel(id));
        }
        channel.buffer.extend(volts.iter().copied());

        let mut changed = vec![id];
        changed.extend(self.refresh_dependents(id));
        Ok(changed)
    }

    /// Recalcula todo canal derivado que usa `id` como operando.
    pub fn refresh_dependents(&mut self, id: ChannelId) -> Vec<ChannelId> {
        let dependents: Vec<(ChannelId, MathDefinition)> = self
            .channels
            .values()
            .filter_map(|c| match c.kind {
                ChannelKind::Derived(def) if def.depends_on(id) => Some((c.id, def)),
                _ => None,
            })
            .collect();

        for (dep_id, def) in &dependents {
            let values = self.compute(def);
            if let Some(channel) = self.channels.get_mut(dep_id) {
                channel.buffer.replace(&values);
            }
        }
        dependents.into_iter().map(|(dep_id, _)| dep_id).collect()
    }

    /// Multiplica as amostras dos canais físicos por `factor` e recalcula os
    /// derivados (troca de faixa de ganho).
    pub fn rescale_physical(&mut self, factor: f64) {
        for channel in self.channels.values_mut().filter(|c| c.is_physical()) {
            let scaled: Vec<f64> = channel.buffer.iter().map(|v| v * factor).collect();
            channel.buffer.replace(&scaled);
        }
        self.refresh_dependents(ChannelId::CH1);
        self.refresh_dependents(ChannelId::CH2);
        debug!("Canais físicos reescalados por {factor}");
    }

    fn level_of(&self, id: ChannelId) -> Result<u8, ChannelError> {
        self.channels
            .get(&id)
            .map(|c| c.math_level)
            .ok_or(ChannelError::UnknownChannel(id))
    }

    /// Próxima cor da paleta depois da última atribuída, pulando as em uso.
    fn next_color_index(&self) -> usize {
        let start = self.last_color.map_or(0, |i| i + 1);
        (0..MATH_PALETTE.len())
            .map(|k| (start + k) % MATH_PALETTE.len())
            .find(|&i| !self.channels.values().any(|c| c.color == MATH_PALETTE[i]))
            .unwrap_or(start % MATH_PALETTE.len())
    }

    fn compute(&self, def: &MathDefinition) -> Vec<f64> {
        match (self.channels.get(&def.operand_a), self.channels.get(&def.operand_b)) {
            (Some(a), Some(b)) => math::evaluate(def.operator, def.order, &a.buffer.to_vec(), &b.buffer.to_vec()),
            _ => Vec::new(),
        }
    }
}
