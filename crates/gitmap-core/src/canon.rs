//! Canonical JSON text used as hash input.

use serde_json::Value;

/// Compact JSON with object keys sorted at every depth. Array order is kept.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layer_keys_sorted() {
        let layer = json!({"title": "Roads", "id": "layer-1", "opacity": 0.5});
        assert_eq!(
            canonical_json(&layer),
            r#"{"id":"layer-1","opacity":0.5,"title":"Roads"}"#
        );
    }

    #[test]
    fn nested_layer_definitions_sorted() {
        let doc = json!({
            "operationalLayers": [{"title": "Group", "id": "g", "layers": [{"z": 1, "a": 2}]}],
            "baseMap": {"title": "Topo", "baseMapLayers": []}
        });
        assert_eq!(
            canonical_json(&doc),
            r#"{"baseMap":{"baseMapLayers":[],"title":"Topo"},"operationalLayers":[{"id":"g","layers":[{"a":2,"z":1}],"title":"Group"}]}"#
        );
    }

    #[test]
    fn layer_order_and_escapes_preserved() {
        let doc = json!({"operationalLayers": [{"id": "b"}, {"id": "a\"q"}], "": null});
        assert_eq!(
            canonical_json(&doc),
            r#"{"":null,"operationalLayers":[{"id":"b"},{"id":"a\"q"}]}"#
        );
    }
}
