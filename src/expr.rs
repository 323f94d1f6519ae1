//! Expressions over upstream columns and user-defined functions.
//!
//! Only the leaves of the flattened input schema are evaluated locally;
//! UDF nodes are carried structurally and run in the external worker.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{BridgeError, Result};
use crate::types::{DataType, Row, Value};

/// Binary operators evaluable locally during projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
    Gt,
    And,
    Or,
}

impl BinaryOp {
    /// Returns true if operand order does not affect the result.
    #[must_use]
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::Eq | BinaryOp::And | BinaryOp::Or
        )
    }
}

/// A user-defined function call evaluated in the external worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UdfExpr {
    /// Function name, for diagnostics and worker dispatch.
    pub name: String,
    /// Numeric tag identifying the worker calling convention.
    pub eval_mode: i32,
    /// Declared result type.
    pub return_type: DataType,
    /// Argument expressions.
    pub args: Vec<Expr>,
}

impl UdfExpr {
    /// Creates a UDF call expression.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        eval_mode: i32,
        return_type: DataType,
        args: Vec<Expr>,
    ) -> Self {
        UdfExpr {
            name: name.into(),
            eval_mode,
            return_type,
            args,
        }
    }
}

/// An expression over the upstream row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Reference to an upstream column by position.
    Column(usize),
    /// Literal constant.
    Literal(Value),
    /// A renamed expression; transparent to semantic equality.
    Alias(Box<Expr>, String),
    /// Locally-evaluable binary operation.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// External user-defined function call.
    Udf(UdfExpr),
}

impl Expr {
    /// Convenience constructor for a binary operation.
    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Returns the canonical form used for semantic comparison: aliases
    /// are stripped and commutative operands ordered deterministically.
    #[must_use]
    pub fn canonical(&self) -> Expr {
        match self {
            Expr::Alias(inner, _) => inner.canonical(),
            Expr::Binary { op, left, right } => {
                let mut left = left.canonical();
                let mut right = right.canonical();
                if op.is_commutative() && hash_of(&left) > hash_of(&right) {
                    std::mem::swap(&mut left, &mut right);
                }
                Expr::binary(*op, left, right)
            }
            Expr::Udf(udf) => Expr::Udf(UdfExpr {
                name: udf.name.clone(),
                eval_mode: udf.eval_mode,
                return_type: udf.return_type.clone(),
                args: udf.args.iter().map(Expr::canonical).collect(),
            }),
            Expr::Column(_) | Expr::Literal(_) => self.clone(),
        }
    }

    /// Returns true if two expressions denote the same computation
    /// regardless of surface syntax.
    #[must_use]
    pub fn semantic_eq(&self, other: &Expr) -> bool {
        self.canonical() == other.canonical()
    }

    /// Returns the static result type where it can be derived.
    #[must_use]
    pub fn result_type(&self, input_types: &[DataType]) -> Option<DataType> {
        match self {
            Expr::Column(i) => input_types.get(*i).cloned(),
            Expr::Literal(v) => v.data_type(),
            Expr::Alias(inner, _) => inner.result_type(input_types),
            Expr::Binary { op, left, right } => match op {
                BinaryOp::Eq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::And | BinaryOp::Or => {
                    Some(DataType::Bool)
                }
                _ => {
                    let l = left.result_type(input_types)?;
                    let r = right.result_type(input_types)?;
                    if l == DataType::Float64 || r == DataType::Float64 {
                        Some(DataType::Float64)
                    } else {
                        Some(l)
                    }
                }
            },
            Expr::Udf(udf) => Some(udf.return_type.clone()),
        }
    }

    /// Evaluates the expression against a row.
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range column references, embedded UDF
    /// calls (only the worker evaluates those), or unsupported operand
    /// types.
    pub fn eval(&self, row: &Row) -> Result<Value> {
        match self {
            Expr::Column(i) => row.get(*i).cloned().ok_or_else(|| {
                BridgeError::InvalidExpression(format!(
                    "column {i} out of range for row of width {}",
                    row.len()
                ))
            }),
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Alias(inner, _) => inner.eval(row),
            Expr::Binary { op, left, right } => {
                let left = left.eval(row)?;
                let right = right.eval(row)?;
                eval_binary(*op, left, right)
            }
            Expr::Udf(udf) => Err(BridgeError::InvalidExpression(format!(
                "user function '{}' cannot be evaluated locally",
                udf.name
            ))),
        }
    }
}

fn hash_of(expr: &Expr) -> u64 {
    let mut hasher = DefaultHasher::new();
    expr.hash(&mut hasher);
    hasher.finish()
}

/// Promotes values for cross-type arithmetic (Int64 vs Float64).
#[allow(clippy::cast_precision_loss)]
fn promote(a: Value, b: Value) -> (Value, Value) {
    match (&a, &b) {
        (Value::Int64(n), Value::Float64(_)) => (Value::Float64(*n as f64), b),
        (Value::Float64(_), Value::Int64(n)) => (a, Value::Float64(*n as f64)),
        _ => (a, b),
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    // Null propagates through every operator.
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let (left, right) = promote(left, right);
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            arithmetic(op, &left, &right)
        }
        BinaryOp::Eq => Ok(compare(&left, &right).map_or(Value::Null, |o| {
            Value::Bool(o == std::cmp::Ordering::Equal)
        })),
        BinaryOp::Lt => Ok(compare(&left, &right).map_or(Value::Null, |o| {
            Value::Bool(o == std::cmp::Ordering::Less)
        })),
        BinaryOp::Gt => Ok(compare(&left, &right).map_or(Value::Null, |o| {
            Value::Bool(o == std::cmp::Ordering::Greater)
        })),
        BinaryOp::And | BinaryOp::Or => match (&left, &right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinaryOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(type_error("BOOL", &left, &right)),
        },
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    left.compare(right)
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int64(a), Value::Int64(b)) => Ok(match op {
            BinaryOp::Add => Value::Int64(a.wrapping_add(*b)),
            BinaryOp::Sub => Value::Int64(a.wrapping_sub(*b)),
            BinaryOp::Mul => Value::Int64(a.wrapping_mul(*b)),
            BinaryOp::Div => {
                if *b == 0 {
                    Value::Null
                } else {
                    Value::Int64(a / b)
                }
            }
            _ => unreachable!("non-arithmetic op"),
        }),
        (Value::Float64(a), Value::Float64(b)) => Ok(match op {
            BinaryOp::Add => Value::Float64(a + b),
            BinaryOp::Sub => Value::Float64(a - b),
            BinaryOp::Mul => Value::Float64(a * b),
            BinaryOp::Div => Value::Float64(a / b),
            _ => unreachable!("non-arithmetic op"),
        }),
        _ => Err(type_error("numeric", left, right)),
    }
}

fn type_error(expected: &str, left: &Value, right: &Value) -> BridgeError {
    let name = |v: &Value| {
        v.data_type()
            .map_or_else(|| "UNKNOWN".to_string(), |t| t.name().to_string())
    };
    BridgeError::TypeError {
        expected: expected.to_string(),
        actual: format!("{} and {}", name(left), name(right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_is_transparent_to_semantic_eq() {
        let plain = Expr::Column(0);
        let aliased = Expr::Alias(Box::new(Expr::Column(0)), "x".into());
        assert!(plain.semantic_eq(&aliased));
        assert!(!plain.semantic_eq(&Expr::Column(1)));
    }

    #[test]
    fn test_commutative_operands_canonicalize() {
        let a = Expr::binary(BinaryOp::Add, Expr::Column(0), Expr::Column(1));
        let b = Expr::binary(BinaryOp::Add, Expr::Column(1), Expr::Column(0));
        assert!(a.semantic_eq(&b));

        let c = Expr::binary(BinaryOp::Sub, Expr::Column(0), Expr::Column(1));
        let d = Expr::binary(BinaryOp::Sub, Expr::Column(1), Expr::Column(0));
        assert!(!c.semantic_eq(&d));
    }

    #[test]
    fn test_eval_column_and_literal() {
        let row = Row::new(vec![Value::Int64(4), Value::String("s".into())]);
        assert_eq!(Expr::Column(0).eval(&row).unwrap(), Value::Int64(4));
        assert_eq!(
            Expr::Literal(Value::Bool(true)).eval(&row).unwrap(),
            Value::Bool(true)
        );
        assert!(Expr::Column(5).eval(&row).is_err());
    }

    #[test]
    fn test_eval_arithmetic_with_promotion() {
        let row = Row::new(vec![Value::Int64(4), Value::Float64(0.5)]);
        let expr = Expr::binary(BinaryOp::Add, Expr::Column(0), Expr::Column(1));
        assert_eq!(expr.eval(&row).unwrap(), Value::Float64(4.5));
    }

    #[test]
    fn test_eval_null_propagates() {
        let row = Row::new(vec![Value::Null, Value::Int64(2)]);
        let expr = Expr::binary(BinaryOp::Mul, Expr::Column(0), Expr::Column(1));
        assert_eq!(expr.eval(&row).unwrap(), Value::Null);
    }

    #[test]
    fn test_eval_division_by_zero_is_null() {
        let row = Row::new(vec![Value::Int64(1), Value::Int64(0)]);
        let expr = Expr::binary(BinaryOp::Div, Expr::Column(0), Expr::Column(1));
        assert_eq!(expr.eval(&row).unwrap(), Value::Null);
    }

    #[test]
    fn test_udf_not_locally_evaluable() {
        let udf = Expr::Udf(UdfExpr::new(
            "f",
            0,
            DataType::Int64,
            vec![Expr::Column(0)],
        ));
        let row = Row::new(vec![Value::Int64(1)]);
        assert!(matches!(
            udf.eval(&row),
            Err(BridgeError::InvalidExpression(_))
        ));
    }
}
