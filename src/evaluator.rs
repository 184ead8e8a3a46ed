use std::collections::{BTreeMap, HashMap};

use crate::ast::{AstKind, BinaryOp, LogicalOp, Node, Number, UnaryOp};
use crate::types::intrinsic;

/// Folds the constant integer expressions allowed as enum member values.
pub struct Evaluator<'a> {
    enums: &'a HashMap<String, BTreeMap<String, i64>>,
    /// Members of the enum being folded, visible by bare name.
    pub variables: HashMap<String, i64>,
}

impl<'a> Evaluator<'a> {
    pub fn new(enums: &'a HashMap<String, BTreeMap<String, i64>>) -> Self {
        Self {
            enums,
            variables: HashMap::new(),
        }
    }

    /// `None` when the expression is not a constant integer.
    pub fn eval(&self, node: &Node) -> Option<i64> {
        match &node.kind {
            AstKind::NumericLiteral(Number::Int(n)) => Some(*n),
            AstKind::NumericLiteral(Number::Real(r)) => {
                if r.fract() == 0.0 && r.abs() < i64::MAX as f64 {
                    Some(*r as i64)
                } else {
                    None
                }
            }

            AstKind::Identifier { name, .. } => self
                .variables
                .get(name)
                .copied()
                .or_else(|| match name.as_str() {
                    "true" | "false" => intrinsic(name).map(i64::from),
                    _ => None,
                }),

            AstKind::Member { target, field } => match &target.kind {
                AstKind::Identifier { name, .. } => {
                    self.enums.get(name).and_then(|members| members.get(field)).copied()
                }
                _ => None,
            },

            AstKind::UnaryExpression { operator, operand } => {
                let value = self.eval(operand)?;
                match operator {
                    UnaryOp::Negate => value.checked_neg(),
                    UnaryOp::BitNot => Some(!value),
                    UnaryOp::Not => Some((value == 0) as i64),
                }
            }

            AstKind::BinaryExpression { operator, lhs, rhs } => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                match operator {
                    BinaryOp::Add => left.checked_add(right),
                    BinaryOp::Subtract => left.checked_sub(right),
                    BinaryOp::Multiply => left.checked_mul(right),
                    // `/` is real division; only exact quotients stay integers.
                    BinaryOp::Divide => match left.checked_rem(right) {
                        Some(0) => left.checked_div(right),
                        _ => None,
                    },
                    BinaryOp::IntDivide => left.checked_div(right),
                    BinaryOp::Modulo => left.checked_rem(right),
                    BinaryOp::BitAnd => Some(left & right),
                    BinaryOp::BitOr => Some(left | right),
                    BinaryOp::BitXor => Some(left ^ right),
                    BinaryOp::ShiftLeft => u32::try_from(right).ok().and_then(|r| left.checked_shl(r)),
                    BinaryOp::ShiftRight => u32::try_from(right).ok().and_then(|r| left.checked_shr(r)),
                    BinaryOp::Equal => Some((left == right) as i64),
                    BinaryOp::NotEqual => Some((left != right) as i64),
                    BinaryOp::Less => Some((left < right) as i64),
                    BinaryOp::LessEqual => Some((left <= right) as i64),
                    BinaryOp::Greater => Some((left > right) as i64),
                    BinaryOp::GreaterEqual => Some((left >= right) as i64),
                }
            }

            AstKind::LogicalExpression { operator, lhs, rhs } => {
                let left = self.eval(lhs)? != 0;
                let right = self.eval(rhs)? != 0;
                let value = match operator {
                    LogicalOp::And => left && right,
                    LogicalOp::Or => left || right,
                    LogicalOp::Xor => left != right,
                };
                Some(value as i64)
            }

            AstKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)? != 0 {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn eval_with(source: &str, enums: &HashMap<String, BTreeMap<String, i64>>) -> Option<i64> {
        let node = Parser::new(tokenize(source, 2).unwrap())
            .parse_expression()
            .unwrap();
        Evaluator::new(enums).eval(&node)
    }

    fn eval(source: &str) -> Option<i64> {
        eval_with(source, &HashMap::new())
    }

    #[test]
    fn folds_integer_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Some(7));
        assert_eq!(eval("1 << 4 | 1"), Some(17));
        assert_eq!(eval("-(7 div 2)"), Some(-3));
        assert_eq!(eval("$10 mod 3"), Some(1));
        assert_eq!(eval("3 > 2 ? 10 : 20"), Some(10));
        assert_eq!(eval("true and not false"), Some(1));
    }

    #[test]
    fn rejects_non_constants() {
        assert_eq!(eval("x + 1"), None);
        assert_eq!(eval("7 / 2"), None);
        assert_eq!(eval("1 div 0"), None);
        assert_eq!(eval("0.5"), None);
        assert_eq!(eval("\"text\""), None);
        assert_eq!(eval("f()"), None);
    }

    #[test]
    fn sees_members_and_other_enums() {
        let mut enums = HashMap::new();
        enums.insert("Color".to_string(), BTreeMap::from([("Red".to_string(), 4)]));
        assert_eq!(eval_with("Color.Red * 2", &enums), Some(8));
        assert_eq!(eval_with("Color.Blue", &enums), None);

        let mut evaluator = Evaluator::new(&enums);
        evaluator.variables.insert("First".to_string(), 10);
        let node = Parser::new(tokenize("First + 1", 2).unwrap())
            .parse_expression()
            .unwrap();
        assert_eq!(evaluator.eval(&node), Some(11));
    }
}
