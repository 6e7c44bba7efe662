//! HITL message rendering.
//!
//! Placeholders are looked up through the same [`Scope`] as step inputs.
//! Unresolved placeholders stay in the message verbatim.

use serde_json::Value;

use caseflow_types::workflow::{MessageSegment, MessageTemplate};

use super::reference::Scope;

/// Render a message template against the current scope.
pub fn render_message(template: &MessageTemplate, scope: &Scope<'_>) -> String {
    let mut out = String::with_capacity(template.raw().len());
    for segment in template.segments() {
        match segment {
            MessageSegment::Text(text) => out.push_str(text),
            MessageSegment::Placeholder { path, raw } => match scope.lookup(path) {
                Some(Value::Null) | None => out.push_str(raw),
                Some(value) => out.push_str(&value_to_string(&value)),
            },
        }
    }
    out
}

/// Strings verbatim, everything else as compact JSON.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_types::workflow::JsonMap;
    use serde_json::json;

    fn map(value: Value) -> JsonMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_render_substitutes_all_namespaces() {
        let inputs = map(json!({"description": "Broken window", "types": ["vandalism"]}));
        let outputs = map(json!({"create_signal": {"signalNumber": "GCMP-1", "count": 2}}));
        let context = map(json!({"userName": "J. Smit"}));
        let scope = Scope::new(&inputs, &outputs, &context);

        let tpl = MessageTemplate::parse(
            "${context.userName}: link ${create_signal.signalNumber} (${create_signal.count}) for \"${inputs.description}\" ${inputs.types}",
        );
        assert_eq!(
            render_message(&tpl, &scope),
            "J. Smit: link GCMP-1 (2) for \"Broken window\" [\"vandalism\"]"
        );
    }

    #[test]
    fn test_render_leaves_unresolved_placeholders() {
        let empty = JsonMap::new();
        let scope = Scope::new(&empty, &empty, &empty);
        let tpl = MessageTemplate::parse("Hello ${context.userName}, create ${inputs.what}? ${");
        assert_eq!(
            render_message(&tpl, &scope),
            "Hello ${context.userName}, create ${inputs.what}? ${"
        );
    }
}
