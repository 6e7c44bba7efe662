//! Reference resolution over the three namespaces a step can read from.
//!
//! `$inputs.<field>`, `$context.<field>` and `$<step_id>.<field>` paths are
//! resolved against a borrowed [`Scope`]. Navigation walks object keys and
//! numeric array indices; anything else yields `None`.

use serde_json::Value;

use caseflow_types::workflow::{JsonMap, Namespace, ReferencePath, TemplateValue};

/// Read-only view of the data a step may reference.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub inputs: &'a JsonMap,
    /// Tool results keyed by step ID.
    pub outputs: &'a JsonMap,
    pub context: &'a JsonMap,
}

impl<'a> Scope<'a> {
    pub fn new(inputs: &'a JsonMap, outputs: &'a JsonMap, context: &'a JsonMap) -> Self {
        Self {
            inputs,
            outputs,
            context,
        }
    }

    /// Look up a parsed reference. A bare `$inputs` or `$context` yields the
    /// whole record.
    pub fn lookup(&self, path: &ReferencePath) -> Option<Value> {
        let root = match &path.namespace {
            Namespace::Inputs => self.inputs,
            Namespace::Context => self.context,
            Namespace::Step(step_id) => {
                let output = self.outputs.get(step_id)?;
                return navigate(output, &path.fields).cloned();
            }
        };

        match path.fields.split_first() {
            None => Some(Value::Object(root.clone())),
            Some((first, rest)) => navigate(root.get(first)?, rest).cloned(),
        }
    }
}

fn navigate<'v>(mut current: &'v Value, fields: &[String]) -> Option<&'v Value> {
    for field in fields {
        current = match current {
            Value::Object(map) => map.get(field)?,
            Value::Array(items) => items.get(field.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a raw JSON value.
///
/// Values that are not `$`-prefixed strings are returned unchanged.
pub fn resolve(raw: &Value, scope: &Scope<'_>) -> Option<Value> {
    match raw {
        Value::String(s) => match ReferencePath::parse(s) {
            Some(path) => scope.lookup(&path),
            None => Some(raw.clone()),
        },
        other => Some(other.clone()),
    }
}

/// Materialize a step input template into tool parameters.
///
/// Object fields whose reference resolves to nothing are left out; unresolved
/// array items and a bare unresolved reference become `null`.
pub fn resolve_all(template: &TemplateValue, scope: &Scope<'_>) -> Value {
    materialize(template, scope).unwrap_or(Value::Null)
}

fn materialize(template: &TemplateValue, scope: &Scope<'_>) -> Option<Value> {
    match template {
        TemplateValue::Literal(value) => Some(value.clone()),
        TemplateValue::Reference(path) => scope.lookup(path),
        TemplateValue::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| materialize(item, scope).unwrap_or(Value::Null))
                .collect(),
        )),
        TemplateValue::Object(fields) => Some(Value::Object(
            fields
                .iter()
                .filter_map(|(key, value)| Some((key.clone(), materialize(value, scope)?)))
                .collect(),
        )),
    }
}
