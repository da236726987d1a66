//! Operações dos canais matemáticos.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operador aritmético de um canal derivado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Ordem dos operandos para as operações não comutativas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperandOrder {
    /// A − B, A / B
    #[default]
    #[serde(rename = "ab")]
    AB,
    /// B − A, B / A
    #[serde(rename = "ba")]
    BA,
}

impl MathOperator {
    fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Subtract => '-',
            Self::Multiply => '*',
            Self::Divide => '/',
        }
    }

    /// Aplica o operador a um par de amostras.
    pub fn apply(self, order: OperandOrder, a: f64, b: f64) -> f64 {
        let (lhs, rhs) = match order {
            OperandOrder::AB => (a, b),
            OperandOrder::BA => (b, a),
        };
        match self {
            Self::Add => a + b,
            Self::Subtract => lhs - rhs,
            Self::Multiply => a * b,
            Self::Divide => divide(lhs, rhs),
        }
    }
}

impl fmt::Display for MathOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
        };
        f.write_str(name)
    }
}

/// Divisão com regras explícitas para divisor zero.
///
/// | numerador | divisor | resultado |
/// |-----------|---------|-----------|
/// | 0         | 0       | 1         |
/// | > 0       | 0       | +∞        |
/// | < 0       | 0       | −∞        |
///
/// `-0.0` conta como zero. NaN se propaga normalmente.
pub fn divide(a: f64, b: f64) -> f64 {
    if b != 0.0 {
        return a / b;
    }
    if a == 0.0 {
        1.0
    } else if a > 0.0 {
        f64::INFINITY
    } else if a < 0.0 {
        f64::NEG_INFINITY
    } else {
        f64::NAN
    }
}

/// Calcula o buffer de um canal derivado.
///
/// O resultado tem o comprimento do operando mais curto e é alinhado pelas
/// amostras mais recentes (o final de cada buffer).
pub fn evaluate(operator: MathOperator, order: OperandOrder, a: &[f64], b: &[f64]) -> Vec<f64> {
    let len = a.len().min(b.len());
    let a = &a[a.len() - len..];
    let b = &b[b.len() - len..];
    a.iter()
        .zip(b)
        .map(|(&x, &y)| operator.apply(order, x, y))
        .collect()
}

/// Expressão legível, ex: `CH1 / CH2`.
pub fn describe(operator: MathOperator, order: OperandOrder, a: impl fmt::Display, b: impl fmt::Display) -> String {
    match order {
        OperandOrder::AB => format!("{a} {} {b}", operator.symbol()),
        OperandOrder::BA => format!("{b} {} {a}", operator.symbol()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn divide_table() {
        assert_eq!(divide(0.0, 0.0), 1.0);
        assert_eq!(divide(5.0, 0.0), f64::INFINITY);
        assert_eq!(divide(-5.0, 0.0), f64::NEG_INFINITY);
        assert_eq!(divide(6.0, 3.0), 2.0);
        assert_eq!(divide(-0.0, 0.0), 1.0);
        assert_eq!(divide(5.0, -0.0), f64::INFINITY);
        assert!(divide(f64::NAN, 0.0).is_nan());
    }

    #[test]
    fn operand_order_applies_to_subtract_and_divide() {
        assert_eq!(MathOperator::Subtract.apply(OperandOrder::AB, 5.0, 2.0), 3.0);
        assert_eq!(MathOperator::Subtract.apply(OperandOrder::BA, 5.0, 2.0), -3.0);
        assert_eq!(MathOperator::Divide.apply(OperandOrder::BA, 2.0, 8.0), 4.0);
        assert_eq!(MathOperator::Add.apply(OperandOrder::BA, 2.0, 8.0), 10.0);
        assert_eq!(MathOperator::Multiply.apply(OperandOrder::BA, 2.0, 8.0), 16.0);
    }

    #[test]
    fn evaluate_adds_point_wise() {
        let out = evaluate(MathOperator::Add, OperandOrder::AB, &[1.0, -1.0], &[0.5, 0.5]);
        assert_eq!(out, vec![1.5, -0.5]);
    }

    #[test]
    fn evaluate_aligns_on_newest_samples() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [10.0, 20.0];
        let out = evaluate(MathOperator::Multiply, OperandOrder::AB, &a, &b);
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[0], 30.0);
        assert_relative_eq!(out[1], 80.0);
        assert!(evaluate(MathOperator::Add, OperandOrder::AB, &a, &[]).is_empty());
    }

    #[test]
    fn describe_respects_order() {
        assert_eq!(describe(MathOperator::Divide, OperandOrder::AB, "CH1", "CH2"), "CH1 / CH2");
        assert_eq!(describe(MathOperator::Subtract, OperandOrder::BA, "CH1", "CH2"), "CH2 - CH1");
    }

    #[test]
    fn operator_names_in_toml() {
        #[derive(Deserialize)]
        struct Row {
            operator: MathOperator,
            order: OperandOrder,
        }
        let row: Row = toml::from_str("operator = \"divide\"\norder = \"ba\"").unwrap();
        assert_eq!(row.operator, MathOperator::Divide);
        assert_eq!(row.order, OperandOrder::BA);
    }
}
