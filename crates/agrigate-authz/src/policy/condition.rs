//! Condition evaluation.
//!
//! Evaluation is pure: it reads the authenticated user and the context and
//! never fails. Missing fields resolve to "absent", and every malformed
//! comparison (wrong value shape, unknown operator) evaluates to `false`.

use std::cmp::Ordering;

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::context::PermissionContext;
use crate::types::{AuthenticatedUser, Condition, ConditionValue, EvaluatedCondition, Operator, ValueRef};

/// Evaluates conditions for one user against one context.
#[derive(Debug, Clone, Copy)]
pub struct ConditionEvaluator<'a> {
    user: &'a AuthenticatedUser,
    context: &'a PermissionContext,
}

impl<'a> ConditionEvaluator<'a> {
    #[must_use]
    pub fn new(user: &'a AuthenticatedUser, context: &'a PermissionContext) -> Self {
        Self { user, context }
    }

    /// Evaluate a single condition.
    #[must_use]
    pub fn evaluate(&self, condition: &Condition) -> bool {
        let actual = self.context.resolve(&condition.field);
        let expected = self.resolve_value(&condition.value);
        compare(condition.operator, actual, &expected)
    }

    /// Evaluate a single condition and keep the resolved operands.
    #[must_use]
    pub fn evaluate_detailed(&self, condition: &Condition) -> EvaluatedCondition {
        let actual = self.context.resolve(&condition.field);
        let expected = self.resolve_value(&condition.value);
        let passed = compare(condition.operator, actual, &expected);

        EvaluatedCondition {
            condition: condition.clone(),
            actual: actual.cloned(),
            expected,
            passed,
        }
    }

    /// Evaluate a condition list with AND semantics.
    ///
    /// Stops at the first failing condition; the returned diagnostics cover
    /// every condition evaluated up to and including it.
    #[must_use]
    pub fn evaluate_all(&self, conditions: &[Condition]) -> (bool, Vec<EvaluatedCondition>) {
        let mut evaluated = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let outcome = self.evaluate_detailed(condition);
            let passed = outcome.passed;
            evaluated.push(outcome);
            if !passed {
                return (false, evaluated);
            }
        }
        (true, evaluated)
    }

    /// Substitute a dynamic reference. Unresolvable references compare as
    /// their literal `${...}` text.
    #[must_use]
    pub fn resolve_value(&self, value: &ConditionValue) -> Value {
        match value {
            ConditionValue::Literal(v) => v.clone(),
            ConditionValue::Ref(reference) => self
                .resolve_ref(reference)
                .unwrap_or_else(|| Value::String(reference.token())),
        }
    }

    fn resolve_ref(&self, reference: &ValueRef) -> Option<Value> {
        match reference {
            ValueRef::UserId => Some(Value::String(self.user.id.clone())),
            ValueRef::UserEmail => Some(Value::String(self.user.email.clone())),
            ValueRef::UserRole => Some(Value::String(self.user.role.as_str().to_string())),
            ValueRef::ResourceField(path) => self.context.resource_field(path).cloned(),
        }
    }
}

/// Apply `operator` to a resolved field value and comparison value.
#[must_use]
pub fn compare(operator: Operator, actual: Option<&Value>, expected: &Value) -> bool {
    match operator {
        Operator::Eq => actual == Some(expected),
        Operator::Ne => actual != Some(expected),
        Operator::In => match expected {
            Value::Array(items) => actual.is_some_and(|a| items.contains(a)),
            _ => false,
        },
        Operator::Nin => match expected {
            Value::Array(items) => actual.is_none_or(|a| !items.contains(a)),
            _ => false,
        },
        Operator::Gt => ordering(actual, expected).is_some_and(Ordering::is_gt),
        Operator::Gte => ordering(actual, expected).is_some_and(Ordering::is_ge),
        Operator::Lt => ordering(actual, expected).is_some_and(Ordering::is_lt),
        Operator::Lte => ordering(actual, expected).is_some_and(Ordering::is_le),
        Operator::Contains => match (actual, expected) {
            (Some(Value::String(haystack)), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
        Operator::Exists => {
            let present = actual.is_some_and(|a| !a.is_null());
            if *expected == Value::Bool(false) {
                !present
            } else {
                present
            }
        }
        Operator::Unknown => false,
    }
}

/// Order two values as numbers, or as RFC 3339 date-times when both parse.
fn ordering(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => {
            let a = OffsetDateTime::parse(a, &Rfc3339).ok()?;
            let b = OffsetDateTime::parse(b, &Rfc3339).ok()?;
            Some(a.cmp(&b))
        }
        _ => None,
    }
}
