use serde_json::{json, Map, Value};

/// Parse `key=value` items (CLI `--param`) into a params object.
pub fn parse_param_pairs(items: &[String]) -> Result<Map<String, Value>, String> {
    let mut out = Map::new();
    for s in items {
        let Some((k, val)) = s.split_once('=') else {
            return Err(format!("Invalid --param '{}', expected KEY=VALUE", s));
        };
        let key = k.trim();
        if key.is_empty() {
            return Err(format!("Invalid --param '{}', empty key", s));
        }
        out.insert(key.to_string(), parse_value(val));
    }
    Ok(out)
}

pub fn parse_value(src: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(src) { return v; }
    if src.eq_ignore_ascii_case("null") { return Value::Null; }
    if src.eq_ignore_ascii_case("true") { return Value::Bool(true); }
    if src.eq_ignore_ascii_case("false") { return Value::Bool(false); }
    if let Ok(i) = src.parse::<i64>() { return Value::from(i); }
    if let Ok(f) = src.parse::<f64>() { return json!(f); }
    Value::String(src.to_string())
}

/// Set `filename_prefix` on every `SaveImage` node that does not carry one.
/// Returns how many nodes were touched.
pub fn ensure_filename_prefix(graph: &mut Value, prefix: &str) -> usize {
    let mut touched = 0;
    if let Some(obj) = graph.as_object_mut() {
        for (_k, node) in obj.iter_mut() {
            if node.get("class_type").and_then(|v| v.as_str()) == Some("SaveImage") {
                if let Some(inputs) = node.get_mut("inputs").and_then(|v| v.as_object_mut()) {
                    if !inputs.contains_key("filename_prefix") {
                        inputs.insert("filename_prefix".to_string(), Value::String(prefix.to_string()));
                        touched += 1;
                    }
                }
            }
        }
    }
    touched
}

/// The `filename_prefix` of the first `SaveImage` node, if it is a plain string.
pub fn save_image_prefix(graph: &Value) -> Option<&str> {
    graph
        .as_object()?
        .values()
        .find(|node| node.get("class_type").and_then(|v| v.as_str()) == Some("SaveImage"))?
        .get("inputs")?
        .get("filename_prefix")?
        .as_str()
}

/// Templates are stored either as a bare graph or wrapped as `{"prompt": graph}`.
pub fn unwrap_prompt_root(doc: Value) -> Value {
    match doc {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("prompt") => {
            map.remove("prompt").unwrap_or(Value::Null)
        }
        other => other,
    }
}

pub fn is_probably_graph(graph: &Value) -> bool {
    if let Some(obj) = graph.as_object() {
        for (_k, v) in obj.iter() {
            if let Some(node) = v.as_object() {
                if node.get("class_type").and_then(|ct| ct.as_str()).is_some() { return true; }
            }
        }
    }
    false
}
