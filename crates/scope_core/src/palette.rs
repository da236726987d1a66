//! Cores dos traços.
//!
//! As cores dos canais físicos são fixas. Os canais matemáticos recebem cores
//! de uma paleta ordenada que nunca colide com as físicas.

/// Cor em formato hex string (ex: "#ff00ff").
pub type ColorHex = &'static str;

/// CH1 – amarelo.
pub const CH1_COLOR: ColorHex = "#ffd700";

/// CH2 – ciano.
pub const CH2_COLOR: ColorHex = "#00d9ff";

/// Paleta dos canais matemáticos, na ordem de atribuição.
pub const MATH_PALETTE: [ColorHex; 3] = ["#ff00ff", "#ff8c00", "#00ff7f"];

/// Nome legível de uma cor conhecida (para logs).
pub fn color_name(color: &str) -> &'static str {
    match color {
        CH1_COLOR => "amarelo",
        CH2_COLOR => "ciano",
        "#ff00ff" => "magenta",
        "#ff8c00" => "laranja",
        "#00ff7f" => "verde",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_palette_never_uses_physical_colors() {
        for color in MATH_PALETTE {
            assert_ne!(color, CH1_COLOR);
            assert_ne!(color, CH2_COLOR);
        }
        assert_eq!(color_name(MATH_PALETTE[0]), "magenta");
    }
}
