//! Arithmetic expression evaluation.
//!
//! Expressions are evaluated by an embedded Rhai engine restricted to single
//! expressions (no statements, no assignments). Scope variables are exposed
//! as constants, so an expression can read but never modify them.
//!
//! Arithmetic follows the usual calculator conventions rather than Rhai's
//! integer ones: `/` always divides in floating point, `^` is
//! exponentiation (binding tighter than `*`), and `pi` and `e` are defined.

use std::borrow::Cow;

use rhai::{Dynamic, Engine, EvalAltResult, Scope, FLOAT, INT};
use serde::Serialize;
use thiserror::Error;

use crate::scope::VariableScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationErrorKind {
    /// The expression references a name absent from the scope.
    UnknownVariable,
    /// The expression is malformed.
    SyntaxError,
    /// Division by zero or an infinite result.
    DivisionByZero,
    /// Non-numeric or NaN result, or operands of the wrong type.
    TypeMismatch,
    /// The binding addresses a joint the model does not have.
    UnknownJoint,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct EvaluationError {
    pub kind: EvaluationErrorKind,
    pub message: String,
}

impl EvaluationError {
    pub fn new(kind: EvaluationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Evaluates arithmetic expressions against a [`VariableScope`].
pub struct ExpressionEvaluator {
    engine: Engine,
}

impl ExpressionEvaluator {
    /// Create an evaluator with sandboxed engine limits.
    pub fn new() -> Self {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(16);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(1_000);
        engine.set_max_array_size(100);
        engine.set_max_map_size(100);

        // Built-in operators on INT/FLOAT bypass registered overloads otherwise
        engine.set_fast_operators(false);
        engine.register_fn("/", |a: INT, b: INT| a as FLOAT / b as FLOAT);
        engine.register_fn("**", |a: INT, b: INT| (a as FLOAT).powf(b as FLOAT));
        engine.register_fn("**", |a: INT, b: FLOAT| (a as FLOAT).powf(b));
        engine.register_fn("**", |a: FLOAT, b: INT| a.powf(b as FLOAT));
        engine.register_fn("**", |a: FLOAT, b: FLOAT| a.powf(b));

        Self { engine }
    }

    pub fn evaluate(&self, expression: &str, scope: &VariableScope) -> Result<f32, EvaluationError> {
        if expression.trim().is_empty() {
            return Err(EvaluationError::new(
                EvaluationErrorKind::SyntaxError,
                "expression is empty",
            ));
        }

        let mut rhai_scope = Scope::new();
        rhai_scope.push_constant("pi", std::f32::consts::PI as FLOAT);
        rhai_scope.push_constant("e", std::f32::consts::E as FLOAT);
        // Pushed later, so variables shadow the constants above
        for (name, value) in scope.iter() {
            rhai_scope.push_constant(name, *value as FLOAT);
        }

        let result = self
            .engine
            .eval_expression_with_scope::<Dynamic>(&mut rhai_scope, &power_operator(expression))
            .map_err(|err| classify_error(&err))?;

        to_number(result)
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite `^` as Rhai's `**`, leaving string literals alone.
fn power_operator(expression: &str) -> Cow<'_, str> {
    if !expression.contains('^') {
        return Cow::Borrowed(expression);
    }

    let mut out = String::with_capacity(expression.len() + 4);
    let mut quote = None;
    let mut escaped = false;
    for c in expression.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '"' | '\'' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '^' => out.push_str("**"),
                _ => out.push(c),
            },
        }
    }
    Cow::Owned(out)
}

fn classify_error(err: &EvalAltResult) -> EvaluationError {
    let message = err.to_string();
    let kind = match err {
        EvalAltResult::ErrorParsing(..) => EvaluationErrorKind::SyntaxError,
        EvalAltResult::ErrorVariableNotFound(..) => EvaluationErrorKind::UnknownVariable,
        EvalAltResult::ErrorArithmetic(text, _) if text.to_ascii_lowercase().contains("zero") => {
            EvaluationErrorKind::DivisionByZero
        }
        _ => EvaluationErrorKind::TypeMismatch,
    };
    EvaluationError::new(kind, message)
}

fn to_number(value: Dynamic) -> Result<f32, EvaluationError> {
    let number = if let Ok(f) = value.as_float() {
        f as f32
    } else if let Ok(i) = value.as_int() {
        i as f32
    } else {
        return Err(EvaluationError::new(
            EvaluationErrorKind::TypeMismatch,
            format!("expression produced a {} instead of a number", value.type_name()),
        ));
    };

    if number.is_nan() {
        Err(EvaluationError::new(
            EvaluationErrorKind::TypeMismatch,
            "expression produced NaN",
        ))
    } else if number.is_infinite() {
        Err(EvaluationError::new(
            EvaluationErrorKind::DivisionByZero,
            "expression produced an infinite value",
        ))
    } else {
        Ok(number)
    }
}
