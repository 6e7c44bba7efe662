//! Step condition evaluation.
//!
//! The field path is resolved like a reference (first segment `inputs` or a
//! step ID). Operators are a closed set, so evaluation is total.

use serde_json::Value;

use caseflow_types::workflow::{ConditionOperator, JsonMap, ReferencePath, StepCondition};

use super::reference::Scope;
use super::template::value_to_string;

/// Decide whether a guarded step should run.
pub fn evaluate(condition: &StepCondition, inputs: &JsonMap, outputs: &JsonMap) -> bool {
    let context = JsonMap::new();
    let scope = Scope::new(inputs, outputs, &context);
    let actual = scope.lookup(&ReferencePath::from_dotted(&condition.field));
    let expected = condition.value.as_ref();

    match condition.operator {
        ConditionOperator::Exists => actual.as_ref().is_some_and(is_truthy),
        ConditionOperator::NotExists => !actual.as_ref().is_some_and(is_truthy),
        ConditionOperator::Equals => strict_eq(actual.as_ref(), expected),
        ConditionOperator::NotEquals => !strict_eq(actual.as_ref(), expected),
        ConditionOperator::Contains => match (actual, expected) {
            (Some(Value::String(haystack)), Some(needle)) => {
                haystack.contains(&value_to_string(needle))
            }
            _ => false,
        },
        ConditionOperator::Gt => compare(actual.as_ref(), expected, |a, b| a > b),
        ConditionOperator::Lt => compare(actual.as_ref(), expected, |a, b| a < b),
    }
}

/// Null, `false`, zero and the empty string are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn strict_eq(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    actual.unwrap_or(&Value::Null) == expected.unwrap_or(&Value::Null)
}

fn compare(actual: Option<&Value>, expected: Option<&Value>, op: fn(f64, f64) -> bool) -> bool {
    match (
        actual.and_then(Value::as_f64),
        expected.and_then(Value::as_f64),
    ) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}
