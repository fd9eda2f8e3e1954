// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compiled probe expressions and their cache.
//!
//! The expression language itself is not implemented here: an
//! [`ExpressionCompiler`] turns the JSON AST shipped with a probe into a
//! callable. Compiled callables are cached by DSL source text.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::error;

use crate::error::CompileError;
use crate::lfu::LfuCache;

/// A compiled expression evaluated against a snapshot of local variables.
/// `None` means the expression could not produce a value.
pub type ExpressionFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Compiles the JSON AST of an expression.
pub trait ExpressionCompiler: Send + Sync {
    fn compile(&self, ast: &Value) -> Result<ExpressionFn, CompileError>;
}

impl<F> ExpressionCompiler for F
where
    F: Fn(&Value) -> Result<ExpressionFn, CompileError> + Send + Sync,
{
    fn compile(&self, ast: &Value) -> Result<ExpressionFn, CompileError> {
        self(ast)
    }
}

/// An expression attached to a probe.
///
/// Two expressions are equal when their DSL source is equal, so recompiling a
/// probe never makes it look modified.
#[derive(Clone)]
pub struct DdExpression {
    dsl: String,
    callable: ExpressionFn,
    valid: bool,
}

impl DdExpression {
    pub fn new(dsl: impl Into<String>, callable: ExpressionFn) -> Self {
        Self {
            dsl: dsl.into(),
            callable,
            valid: true,
        }
    }

    /// Expression that never yields a value. Stands in for anything the
    /// compiler rejected.
    pub fn never(dsl: impl Into<String>) -> Self {
        Self {
            dsl: dsl.into(),
            callable: Arc::new(never_yields),
            valid: false,
        }
    }

    pub fn dsl(&self) -> &str {
        &self.dsl
    }

    /// `false` when the compiler rejected the source.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn evaluate(&self, scope: &Value) -> Option<Value> {
        (self.callable)(scope)
    }

    /// Whether a condition holds for `scope`. Anything but a truthy value,
    /// including a failed evaluation, means "do not trigger".
    pub fn should_trigger(&self, scope: &Value) -> bool {
        match self.evaluate(scope) {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Null) | None => false,
        }
    }
}

fn never_yields(_: &Value) -> Option<Value> {
    None
}

impl PartialEq for DdExpression {
    fn eq(&self, other: &Self) -> bool {
        self.dsl == other.dsl
    }
}

impl fmt::Debug for DdExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdExpression")
            .field("dsl", &self.dsl)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Compiler front-end memoising results by DSL text in a bounded LFU cache.
pub struct ExpressionCache {
    compiler: Arc<dyn ExpressionCompiler>,
    cache: Mutex<LfuCache<String, DdExpression>>,
}

impl ExpressionCache {
    pub fn new(compiler: Arc<dyn ExpressionCompiler>, capacity: usize) -> Self {
        Self {
            compiler,
            cache: Mutex::new(LfuCache::new(capacity)),
        }
    }

    /// Compiles `ast`, or returns the cached result for the same `dsl`.
    ///
    /// Never fails: a rejected expression is logged and replaced by
    /// [`DdExpression::never`]. The invalid result is cached too, so the
    /// compiler runs once per DSL text, but every probe built on a broken
    /// expression is reported.
    pub fn compile(&self, dsl: &str, ast: &Value) -> DdExpression {
        let mut compiled = false;
        let expression = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(dsl.to_string(), |dsl| {
                compiled = true;
                match self.compiler.compile(ast) {
                    Ok(callable) => DdExpression::new(dsl.as_str(), callable),
                    Err(err) => {
                        error!(dsl = %dsl, error = %err, "Cannot compile expression");
                        DdExpression::never(dsl.as_str())
                    }
                }
            });
        if !compiled && !expression.is_valid() {
            error!(dsl = %dsl, cached = true, "Cannot compile expression");
        }
        expression
    }

    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ExpressionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Accepts `{"ref": name}` lookups and boolean literals.
    fn toy_compiler(calls: Arc<AtomicUsize>) -> Arc<dyn ExpressionCompiler> {
        Arc::new(move |ast: &Value| -> Result<ExpressionFn, CompileError> {
            calls.fetch_add(1, Ordering::SeqCst);
            match ast {
                Value::Bool(b) => {
                    let b = *b;
                    Ok(Arc::new(move |_: &Value| Some(Value::Bool(b))))
                }
                Value::Object(map) => match map.get("ref").and_then(Value::as_str) {
                    Some(name) => {
                        let name = name.to_string();
                        Ok(Arc::new(move |scope: &Value| scope.get(&name).cloned()))
                    }
                    None => Err(CompileError(format!("unknown node {ast}"))),
                },
                _ => Err(CompileError(format!("unknown node {ast}"))),
            }
        })
    }

    #[test]
    fn compiled_expression_evaluates_against_scope() {
        let cache = ExpressionCache::new(toy_compiler(Arc::default()), 8);
        let expr = cache.compile("ready", &json!({"ref": "ready"}));
        assert!(expr.is_valid());
        assert!(expr.should_trigger(&json!({"ready": true})));
        assert!(!expr.should_trigger(&json!({"ready": 0})));
        assert!(!expr.should_trigger(&json!({})));
        assert_eq!(expr.evaluate(&json!({"ready": "x"})), Some(json!("x")));
    }

    #[test]
    fn identical_dsl_compiles_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ExpressionCache::new(toy_compiler(calls.clone()), 8);
        let a = cache.compile("true", &json!(true));
        let b = cache.compile("true", &json!(true));
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn equality_ignores_the_callable() {
        let yes = DdExpression::new("x", Arc::new(|_: &Value| Some(json!(true))));
        let never = DdExpression::never("x");
        assert_eq!(yes, never);
        assert_ne!(yes, DdExpression::never("y"));
    }

    #[test]
    #[traced_test]
    fn rejected_expression_never_triggers() {
        let cache = ExpressionCache::new(toy_compiler(Arc::default()), 8);
        let expr = cache.compile("x ==", &json!({"eq": [{"ref": "x"}]}));
        assert!(!expr.is_valid());
        assert!(!expr.should_trigger(&json!({"x": true})));
        assert_eq!(expr.evaluate(&json!({})), None);
        assert!(logs_contain("Cannot compile expression"));
    }

    #[test]
    #[traced_test]
    fn cached_rejection_is_reported_on_every_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ExpressionCache::new(toy_compiler(calls.clone()), 8);
        let first = cache.compile("x ==", &json!({"eq": []}));
        let second = cache.compile("x ==", &json!({"eq": []}));
        assert!(!first.is_valid() && !second.is_valid());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("Cannot compile expression"))
                .count()
            {
                2 => Ok(()),
                n => Err(format!("expected 2 compile errors, got {n}")),
            }
        });
    }
}
