//! Condition and expression evaluation.
//!
//! Expressions are written with `${...}` references, e.g.
//! `${classify.output.score} > 0.5 && ${variable.enabled}`. Before parsing,
//! references are rewritten into plain syntax: [`sanitize_path`] produces
//! `memory["classify"]["output"]["score"]` for the strict evaluator and
//! [`sanitize_condition`] produces `var0.output.score` for the legacy one.
//!
//! Both evaluators share the lexer, the parser and the [`Expr`] tree.

mod eval;
mod lexer;
mod parser;
mod sanitize;

pub use eval::evaluate;
pub use parser::{parse, BinaryOp, Expr, UnaryOp};
pub use sanitize::{sanitize_condition, sanitize_path, SanitizedCondition, MEMORY_IDENT};

use crate::config::ConditionSemantics;
use crate::errors::ExpressionError;
use crate::value::Value;

/// Evaluates a `${...}` expression against a memory view.
///
/// `memory` is bound to the identifier `memory`; every reference resolves
/// inside it.
pub fn eval(expression: &str, memory: &Value) -> Result<Value, ExpressionError> {
    let rewritten = sanitize_path(expression)?;
    let expr = parse(&rewritten)?;
    let env = Value::map_from([(MEMORY_IDENT, memory.clone())]);
    evaluate(&expr, &env, ConditionSemantics::Strict)
}

/// Evaluates a step condition against a memory view.
///
/// The result must be a boolean.
pub fn eval_condition(
    condition: &str,
    memory: &Value,
    semantics: ConditionSemantics,
) -> Result<bool, ExpressionError> {
    let result = match semantics {
        ConditionSemantics::Strict => eval(condition, memory)?,
        ConditionSemantics::Legacy => {
            let sanitized = sanitize_condition(condition)?;
            let expr = parse(&sanitized.expression)?;
            let env = Value::map_from(sanitized.variables.iter().map(|(name, source)| {
                (name.clone(), memory.get(source).cloned().unwrap_or_default())
            }));
            evaluate(&expr, &env, semantics)?
        }
    };

    result
        .as_bool()
        .ok_or(ExpressionError::NonBooleanCondition(result.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Side;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn memory(v: serde_json::Value) -> Value {
        Value::from(v)
    }

    fn strict(cond: &str, mem: &Value) -> Result<bool, ExpressionError> {
        eval_condition(cond, mem, ConditionSemantics::Strict)
    }

    fn legacy(cond: &str, mem: &Value) -> Result<bool, ExpressionError> {
        eval_condition(cond, mem, ConditionSemantics::Legacy)
    }

    #[test]
    fn test_nested_index_equality() {
        let mem = memory(json!({"foo": {"bar": ["test"]}, "baz": {"qux": ["other", "test"]}}));
        assert!(strict("${foo.bar[0]} == ${baz.qux[1]}", &mem).unwrap());
    }

    #[test]
    fn test_logic_and_comparisons() {
        let mem = memory(json!({"a": true, "b": false, "c": true, "d": false, "x": 1, "y": 2.5}));
        assert!(strict("${a} && (${b} || ${c}) && !${d}", &mem).unwrap());
        assert!(strict("${x} < ${y}", &mem).unwrap());
        assert!(strict("${x} <= 1", &mem).unwrap());
        assert!(!strict("${x} >= ${y}", &mem).unwrap());
        assert!(strict("-${x} > -2", &mem).unwrap());
        assert!(strict("${x} == 1.0", &mem).unwrap());
        assert!(strict("${x} != ${y}", &mem).unwrap());
    }

    #[test]
    fn test_arithmetic() {
        let mem = memory(json!({"a": 7, "b": 2, "f": 2.5}));
        assert_eq!(eval("${a} / ${b}", &mem).unwrap(), Value::Int(3));
        assert_eq!(eval("${a} % ${b}", &mem).unwrap(), Value::Int(1));
        assert_eq!(eval("${a} * ${f}", &mem).unwrap(), Value::Float(17.5));
        assert_eq!(eval("(${a} + ${b}) * 2 - 1", &mem).unwrap(), Value::Int(17));
        assert_eq!(eval("${a} % 2.0", &mem).unwrap(), Value::Int(1));
        assert_eq!(eval("'ab' + 'cd'", &mem).unwrap(), Value::from("abcd"));
    }

    #[test]
    fn test_arithmetic_errors() {
        let mem = memory(json!({"a": 1, "b": 0, "f": 2.5, "s": "x"}));
        assert_eq!(eval("${a} / ${b}", &mem), Err(ExpressionError::DivisionByZero));
        assert_eq!(eval("${f} / 0.0", &mem), Err(ExpressionError::DivisionByZero));
        assert_eq!(eval("${a} % ${b}", &mem), Err(ExpressionError::ModuloByZero));
        assert_eq!(
            eval("${f} % 2", &mem).unwrap_err().to_string(),
            "left operand must be integer"
        );
        assert_eq!(
            eval("3 % ${f}", &mem).unwrap_err().to_string(),
            "right operand must be integer"
        );
        assert!(matches!(
            eval("${s} - 1", &mem),
            Err(ExpressionError::UnsupportedOperator { .. })
        ));
        assert_eq!(
            eval("9223372036854775807 + 1", &mem),
            Err(ExpressionError::Overflow)
        );
    }

    #[test]
    fn test_lookup_errors() {
        let mem = memory(json!({"foo": {"arr": [1], "n": 3}}));
        assert_eq!(
            eval("${missing}", &mem).unwrap_err().to_string(),
            "undefined field: missing"
        );
        assert_eq!(
            eval("${foo.nope}", &mem).unwrap_err().to_string(),
            "undefined field: nope"
        );
        assert_eq!(
            eval("${foo.arr[3]}", &mem).unwrap_err().to_string(),
            "array index out of bounds"
        );
        assert_eq!(
            eval("${foo.n[0]}", &mem).unwrap_err().to_string(),
            "cannot index non-array value"
        );
        assert_eq!(
            eval("${foo.arr.x}", &mem).unwrap_err().to_string(),
            "cannot index non-map value"
        );
        assert_eq!(
            eval("undefinedName", &mem).unwrap_err().to_string(),
            "undefined variable: undefinedName"
        );
        assert_eq!(
            eval("(1).x", &mem).unwrap_err().to_string(),
            "cannot select from non-map value"
        );
    }

    #[test]
    fn test_logic_requires_booleans() {
        let mem = memory(json!({"n": 1, "t": true}));
        assert_eq!(
            strict("${n} && ${t}", &mem).unwrap_err().to_string(),
            "left operand must be boolean"
        );
        assert_eq!(
            strict("${t} || ${n}", &mem).unwrap_err().to_string(),
            "right operand must be boolean"
        );
    }

    #[test]
    fn test_concat() {
        let mem = memory(json!({"a": "x", "b": "y", "n": 1}));
        assert!(strict("${a}${b} == 'xy'", &mem).unwrap());
        assert_eq!(
            eval("${a}${n}", &mem).unwrap_err().to_string(),
            "concat argument 2 must be string"
        );
        assert_eq!(eval("concat('a')", &mem), Err(ExpressionError::ConcatArity));
        assert_eq!(
            eval("upper('a')", &mem).unwrap_err().to_string(),
            "unknown function: upper"
        );
    }

    #[test]
    fn test_null_keywords_and_deep_equality() {
        let mem = memory(json!({"v": null, "l": [1, {"k": 2}], "m": [1.0, {"k": 2}]}));
        assert!(strict("${v} == null", &mem).unwrap());
        assert!(strict("${v} == nil && ${v} == undefined", &mem).unwrap());
        assert!(strict("${l} == ${m}", &mem).unwrap());
    }

    #[test]
    fn test_non_boolean_condition() {
        let mem = memory(json!({"n": 1}));
        assert_eq!(
            strict("${n} + 1", &mem),
            Err(ExpressionError::NonBooleanCondition("integer"))
        );
    }

    #[test]
    fn test_legacy_is_lenient() {
        let mem = memory(json!({"a": {"output": {"n": 2, "s": "yes"}}}));
        assert!(legacy("${a.output.n} == 2", &mem).unwrap());
        assert!(legacy("${a.output.n} && ${a.output.s}", &mem).unwrap());
        assert!(legacy("${a.output.missing} == null", &mem).unwrap());
        assert!(legacy("${nothere.output} == null", &mem).unwrap());
        assert!(!legacy("${a.output.missing} || 0", &mem).unwrap());
        assert_eq!(
            legacy("${a.output.s} < 1", &mem),
            Err(ExpressionError::Condition)
        );
    }

    #[test]
    fn test_reference_syntax_errors() {
        let mem = Value::empty_map();
        assert_eq!(strict("${a", &mem), Err(ExpressionError::UnclosedReference));
        assert_eq!(strict("${} == 1", &mem), Err(ExpressionError::EmptyReference));
        assert!(matches!(strict("1 ==", &mem), Err(ExpressionError::Syntax { .. })));
    }

    fn too_deep(result: Result<bool, ExpressionError>) -> bool {
        matches!(result, Err(ExpressionError::Syntax { ref message, .. }) if message == "expression nested too deeply")
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mem = Value::empty_map();

        assert!(too_deep(strict(&format!("{}true", "!".repeat(20_000)), &mem)));
        assert!(too_deep(strict(&format!("{}1", "-".repeat(20_000)), &mem)));
        assert!(too_deep(strict(
            &format!("{}1{} == 1", "(".repeat(20_000), ")".repeat(20_000)),
            &mem
        )));
        assert!(too_deep(strict(&format!("{} == 1", vec!["1"; 20_000].join(" + ")), &mem)));
        assert!(too_deep(legacy(&format!("{}true", "!".repeat(20_000)), &mem)));
    }

    #[test]
    fn test_nesting_within_bound_evaluates() {
        let mem = Value::empty_map();

        assert!(strict(&format!("{}true", "!".repeat(100)), &mem).unwrap());
        assert!(strict(&format!("{}1{} == 1", "(".repeat(50), ")".repeat(50)), &mem).unwrap());
        assert!(strict(&format!("{} == 100", vec!["1"; 100].join(" + ")), &mem).unwrap());
    }

    #[test]
    fn test_modulo_rejects_out_of_range_float() {
        let mem = memory(json!({"big": 1e300, "n": 7}));
        assert_eq!(
            strict("${big} % ${n} == 0", &mem),
            Err(ExpressionError::NotInteger(Side::Left))
        );
        assert_eq!(
            strict("${n} % ${big} == 0", &mem),
            Err(ExpressionError::NotInteger(Side::Right))
        );
    }
}
