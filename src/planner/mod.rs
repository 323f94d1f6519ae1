//! Argument planning for external user-defined functions.
//!
//! Given the UDFs of one evaluation operator, the planner collapses
//! same-kind function chains into multi-stage pipelines, collects the leaf
//! argument expressions of every chain, deduplicates them by semantic
//! equality into one flattened input schema, and emits per-chain offset
//! lists selecting each chain's actual arguments from that schema.

use crate::error::{BridgeError, Result};
use crate::expr::{Expr, UdfExpr};
use crate::types::{DataType, Field, Schema};

/// One function stage inside a collapsed chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdfStage {
    /// Function name, dispatched by the worker.
    pub name: String,
    /// Declared result type of this stage.
    pub return_type: DataType,
}

/// A pipeline of same-kind functions run end-to-end in the worker,
/// avoiding a row round-trip per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainedUdf {
    /// Calling-convention tag shared by every stage.
    pub eval_mode: i32,
    /// Stages in evaluation order (innermost first).
    pub stages: Vec<UdfStage>,
    /// Offsets into the flattened input schema selecting this chain's
    /// arguments.
    pub arg_offsets: Vec<usize>,
}

/// The flattened argument layout for one evaluation operator.
#[derive(Debug, Clone)]
pub struct ArgumentPlan {
    /// Deduplicated leaf expressions, in flattened-offset order.
    pub input_exprs: Vec<Expr>,
    /// Types of the flattened input columns.
    pub input_schema: Schema,
    /// One collapsed chain per requested UDF, in request order.
    pub chains: Vec<ChainedUdf>,
    /// One computed column per chain, in request order.
    pub output_schema: Schema,
}

impl ArgumentPlan {
    /// Builds the flattened plan for the given UDFs over an upstream row
    /// layout.
    ///
    /// # Errors
    ///
    /// Returns a plan error if a chain nests a foreign user function, or
    /// if a leaf expression's type cannot be derived from the upstream
    /// schema.
    pub fn build(udfs: &[UdfExpr], input_types: &[DataType]) -> Result<Self> {
        let mut input_exprs: Vec<Expr> = Vec::new();
        let mut chains = Vec::with_capacity(udfs.len());

        for udf in udfs {
            let (stages, leaf_args) = collapse_chain(udf)?;
            let mut arg_offsets = Vec::with_capacity(leaf_args.len());
            for arg in leaf_args {
                let offset = match input_exprs.iter().position(|e| e.semantic_eq(arg)) {
                    Some(existing) => existing,
                    None => {
                        input_exprs.push(arg.clone());
                        input_exprs.len() - 1
                    }
                };
                arg_offsets.push(offset);
            }
            chains.push(ChainedUdf {
                eval_mode: udf.eval_mode,
                stages,
                arg_offsets,
            });
        }

        let input_fields = input_exprs
            .iter()
            .enumerate()
            .map(|(i, expr)| {
                expr.result_type(input_types)
                    .map(|data_type| Field::new(format!("_{i}"), data_type))
                    .ok_or_else(|| {
                        BridgeError::PlanError(format!(
                            "cannot derive the type of flattened input {i}"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let output_fields = chains
            .iter()
            .map(|chain| {
                let last = chain.stages.last().expect("chain has at least one stage");
                Field::new(last.name.clone(), last.return_type.clone())
            })
            .collect();

        Ok(ArgumentPlan {
            input_exprs,
            input_schema: Schema::new(input_fields),
            chains,
            output_schema: Schema::new(output_fields),
        })
    }
}

/// Unwraps a chain of same-kind functions: while a function's sole
/// argument is another call with the same eval mode, the two collapse
/// into one pipeline. Returns stages innermost-first plus the innermost
/// stage's leaf arguments.
fn collapse_chain(udf: &UdfExpr) -> Result<(Vec<UdfStage>, &[Expr])> {
    let mut stages_outer_first = Vec::new();
    let mut current = udf;
    loop {
        stages_outer_first.push(UdfStage {
            name: current.name.clone(),
            return_type: current.return_type.clone(),
        });
        match sole_udf_arg(current) {
            Some(inner) if inner.eval_mode == current.eval_mode => current = inner,
            Some(inner) => {
                return Err(BridgeError::PlanError(format!(
                    "function '{}' (mode {}) cannot run inside a mode-{} chain",
                    inner.name, inner.eval_mode, current.eval_mode
                )))
            }
            None => break,
        }
    }
    for arg in &current.args {
        if let Some(nested) = find_udf(arg) {
            return Err(BridgeError::PlanError(format!(
                "argument of '{}' contains user function '{}', which cannot be \
                 evaluated directly",
                current.name, nested.name
            )));
        }
    }
    stages_outer_first.reverse();
    Ok((stages_outer_first, &current.args))
}

fn sole_udf_arg(udf: &UdfExpr) -> Option<&UdfExpr> {
    match udf.args.as_slice() {
        [Expr::Udf(inner)] => Some(inner),
        _ => None,
    }
}

fn find_udf(expr: &Expr) -> Option<&UdfExpr> {
    match expr {
        Expr::Udf(udf) => Some(udf),
        Expr::Alias(inner, _) => find_udf(inner),
        Expr::Binary { left, right, .. } => find_udf(left).or_else(|| find_udf(right)),
        Expr::Column(_) | Expr::Literal(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;
    use crate::types::Value;

    const MODE: i32 = 200;

    fn udf(name: &str, args: Vec<Expr>) -> UdfExpr {
        UdfExpr::new(name, MODE, DataType::Int64, args)
    }

    #[test]
    fn test_single_udf_plan() {
        let f = udf("f", vec![Expr::Column(0), Expr::Column(2)]);
        let plan =
            ArgumentPlan::build(&[f], &[DataType::Int64, DataType::Utf8, DataType::Float64])
                .unwrap();
        assert_eq!(plan.input_exprs.len(), 2);
        assert_eq!(plan.chains.len(), 1);
        assert_eq!(plan.chains[0].arg_offsets, vec![0, 1]);
        assert_eq!(
            plan.input_schema.field(1).unwrap().data_type,
            DataType::Float64
        );
        assert_eq!(plan.output_schema.field(0).unwrap().name, "f");
    }

    #[test]
    fn test_chain_collapses_and_shares_column() {
        // g(f(x)) plus a second udf reading x directly: one offset for x.
        let inner = udf("f", vec![Expr::Column(0)]);
        let chained = udf("g", vec![Expr::Udf(inner)]);
        let direct = udf("h", vec![Expr::Column(0)]);
        let plan = ArgumentPlan::build(&[chained, direct], &[DataType::Int64]).unwrap();

        assert_eq!(plan.input_exprs.len(), 1);
        assert_eq!(plan.chains[0].arg_offsets, vec![0]);
        assert_eq!(plan.chains[1].arg_offsets, vec![0]);
        let stage_names: Vec<_> = plan.chains[0]
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(stage_names, vec!["f", "g"]);
        assert_eq!(plan.output_schema.field(0).unwrap().name, "g");
    }

    #[test]
    fn test_deep_chain_flattens_iteratively() {
        let innermost = udf("a", vec![Expr::Column(1)]);
        let middle = udf("b", vec![Expr::Udf(innermost)]);
        let outer = udf("c", vec![Expr::Udf(middle)]);
        let plan =
            ArgumentPlan::build(&[outer], &[DataType::Int64, DataType::Int64]).unwrap();
        let stage_names: Vec<_> = plan.chains[0]
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(stage_names, vec!["a", "b", "c"]);
        assert_eq!(plan.chains[0].arg_offsets, vec![0]);
    }

    #[test]
    fn test_semantic_dedup_ignores_alias_and_operand_order() {
        let sum = Expr::binary(BinaryOp::Add, Expr::Column(0), Expr::Column(1));
        let flipped = Expr::Alias(
            Box::new(Expr::binary(BinaryOp::Add, Expr::Column(1), Expr::Column(0))),
            "renamed".into(),
        );
        let f = udf("f", vec![sum]);
        let g = udf("g", vec![flipped]);
        let plan =
            ArgumentPlan::build(&[f, g], &[DataType::Int64, DataType::Int64]).unwrap();
        assert_eq!(plan.input_exprs.len(), 1);
    }

    #[test]
    fn test_foreign_mode_in_chain_rejected() {
        let inner = UdfExpr::new("other", MODE + 1, DataType::Int64, vec![Expr::Column(0)]);
        let outer = udf("g", vec![Expr::Udf(inner)]);
        let result = ArgumentPlan::build(&[outer], &[DataType::Int64]);
        assert!(matches!(result, Err(BridgeError::PlanError(_))));
    }

    #[test]
    fn test_udf_nested_in_leaf_argument_rejected() {
        let nested = udf("n", vec![Expr::Column(0)]);
        let arg = Expr::binary(
            BinaryOp::Add,
            Expr::Column(0),
            Expr::Udf(nested),
        );
        let outer = udf("g", vec![arg]);
        let result = ArgumentPlan::build(&[outer], &[DataType::Int64]);
        assert!(matches!(result, Err(BridgeError::PlanError(_))));
    }

    #[test]
    fn test_literal_leaf_gets_offset() {
        let f = udf(
            "f",
            vec![Expr::Column(0), Expr::Literal(Value::Int64(7))],
        );
        let plan = ArgumentPlan::build(&[f], &[DataType::Int64]).unwrap();
        assert_eq!(plan.input_exprs.len(), 2);
        assert_eq!(
            plan.input_schema.field(1).unwrap().data_type,
            DataType::Int64
        );
    }
}
