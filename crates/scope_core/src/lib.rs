//! # Scope Core
//!
//! Crate compartilhada do osciloscópio USB: protocolo serial de 10 bits,
//! decodificador com recuperação de alinhamento, canais físicos e
//! matemáticos, medições automáticas e configuração TOML.
//!
//! ## Módulos
//! - [`types`] – Amostra bruta, ids de canal, ganho e divisor de clock
//! - [`protocol`] – Empacotamento de 4 amostras em 5 bytes
//! - [`decoder`] – Decodificação incremental do fluxo sem framing
//! - [`buffer`] – Janela deslizante de amostras
//! - [`channels`] – Registro de canais físicos e derivados
//! - [`math`] – Operadores dos canais matemáticos
//! - [`measurements`] – Slots de medição e métricas
//! - [`scope`] – Estado completo do host
//! - [`config`] – Configuração unificada via TOML
//! - [`palette`] – Cores dos traços

pub mod types;
pub mod protocol;
pub mod decoder;
pub mod buffer;
pub mod channels;
pub mod math;
pub mod measurements;
pub mod scope;
pub mod config;
pub mod palette;

// Re-exports convenientes
pub use config::{AppConfig, HostConfig, SamplerConfig};
pub use decoder::{DecoderSettings, DecoderStats, StreamDecoder};
pub use protocol::{PACKET_SIZE, SAMPLES_PER_PACKET, pack_samples, unpack_packet};
pub use scope::Scope;
pub use types::{ChannelId, ClockDivider, GainRange, RawSample};
