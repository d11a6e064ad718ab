use serde_json::Value;

/// Flattens a resource into `Key.Sub=value` lines sorted by key, the text
/// form the validator and reconciler read. Nulls, empty strings, empty arrays and empty
/// objects are left out; OData annotations are skipped.
pub fn render_properties(resource: &Value) -> String {
    let mut lines = Vec::new();
    flatten("", resource, &mut lines);
    lines.join("\n")
}

fn flatten(prefix: &str, value: &Value, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, child) in entries {
                if key.starts_with('@') || key.contains("@odata") {
                    continue;
                }
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, child, lines);
            }
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().filter_map(scalar).collect();
            if !rendered.is_empty() && !prefix.is_empty() {
                lines.push(format!("{prefix}={}", rendered.join(",")));
            }
        }
        other => {
            if let Some(rendered) = scalar(other) {
                if !prefix.is_empty() {
                    lines.push(format!("{prefix}={rendered}"));
                }
            }
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
