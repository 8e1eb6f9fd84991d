/// Per-execution variable store
///
/// Maps node id -> that node's result for the lifetime of one run. Values are
/// resolved with whole-string `{{path}}` placeholders only: `"{{p1.count}}"`
/// becomes the value at `p1.count`, while `"total: {{p1.count}}"` stays literal.

use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    values: HashMap<String, Value>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Walk a dot path through nested objects; `Null` on any missing segment
    pub fn lookup(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(root) = segments.next().and_then(|name| self.values.get(name)) else {
            return Value::Null;
        };
        self.lookup_segments(root, segments)
    }

    /// Same walk as `lookup`, over pre-split segments
    pub fn lookup_path<S: AsRef<str>>(&self, segments: &[S]) -> Value {
        let Some((first, rest)) = segments.split_first() else {
            return Value::Null;
        };
        let Some(root) = self.values.get(first.as_ref()) else {
            return Value::Null;
        };
        self.lookup_segments(root, rest.iter().map(|s| s.as_ref()))
    }

    fn lookup_segments<'a>(&self, root: &Value, segments: impl Iterator<Item = &'a str>) -> Value {
        let mut current = root;
        for segment in segments {
            match current {
                Value::Object(map) => match map.get(segment) {
                    Some(next) => current = next,
                    None => return Value::Null,
                },
                _ => return Value::Null,
            }
        }
        current.clone()
    }

    /// Replace placeholders recursively through strings, objects and arrays
    pub fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => match placeholder_path(text) {
                Some(path) => self.lookup(path),
                None => value.clone(),
            },
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, inner)| (key.clone(), self.resolve(inner)))
                    .collect::<Map<String, Value>>(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.resolve(item)).collect()),
            other => other.clone(),
        }
    }
}

/// Inner path of a whole-string placeholder, trimmed
pub fn placeholder_path(text: &str) -> Option<&str> {
    text.strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> VariableContext {
        let mut ctx = VariableContext::new();
        ctx.set("p1", json!({"count": 5, "user": {"name": "ada"}, "tags": ["a", "b"]}));
        ctx.set("flag", json!(true));
        ctx
    }

    #[test]
    fn test_lookup_walks_objects() {
        let ctx = context();
        assert_eq!(ctx.lookup("p1.count"), json!(5));
        assert_eq!(ctx.lookup("p1.user.name"), json!("ada"));
        assert_eq!(ctx.lookup("flag"), json!(true));
        assert_eq!(ctx.lookup("p1.missing.deeper"), Value::Null);
        assert_eq!(ctx.lookup("nobody"), Value::Null);
        // arrays are not indexed by path segments
        assert_eq!(ctx.lookup("p1.tags.0"), Value::Null);
    }

    #[test]
    fn test_resolve_whole_string_only() {
        let ctx = context();
        assert_eq!(ctx.resolve(&json!("{{p1.count}}")), json!(5));
        assert_eq!(ctx.resolve(&json!("{{ p1.user.name }}")), json!("ada"));
        assert_eq!(ctx.resolve(&json!("count is {{p1.count}}")), json!("count is {{p1.count}}"));
        assert_eq!(ctx.resolve(&json!("{{p1.count}} items")), json!("{{p1.count}} items"));
    }

    #[test]
    fn test_resolve_recurses_into_collections() {
        let ctx = context();
        let input = json!({
            "to": "{{p1.user.name}}",
            "list": ["{{p1.count}}", 3, {"nested": "{{flag}}"}],
            "plain": "hello"
        });
        assert_eq!(
            ctx.resolve(&input),
            json!({"to": "ada", "list": [5, 3, {"nested": true}], "plain": "hello"})
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let ctx = context();
        let input = json!({"a": "{{p1}}", "b": ["{{p1.tags}}", "x {{flag}}"], "c": "{{gone}}"});
        let once = ctx.resolve(&input);
        assert_eq!(ctx.resolve(&once), once);
    }
}
