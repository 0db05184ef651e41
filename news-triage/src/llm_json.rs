use serde_json::{Map, Value};

/// Pull a JSON value out of free-form model output.
///
/// Shapes are tried in order: a fenced code block, the whole text as JSON, the
/// first balanced `{...}`, then everything from the first `[`. Any failure means
/// no result.
pub fn extract_json(raw: &str) -> Option<Value> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(fenced) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str(fenced) {
            return Some(value);
        }
    }

    if text.starts_with('{') || text.starts_with('[') {
        if let Ok(value) = serde_json::from_str(text) {
            return Some(value);
        }
    }

    if let Some(block) = balanced_object(text) {
        if let Ok(value) = serde_json::from_str(block) {
            return Some(value);
        }
    }

    let array_start = text.find('[')?;
    serde_json::from_str(&text[array_start..]).ok()
}

/// Like `extract_json`, but only an object (or an array's first object) counts.
pub fn extract_object(raw: &str) -> Option<Map<String, Value>> {
    match extract_json(raw)? {
        Value::Object(map) => Some(map),
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        }),
        _ => None,
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let tag = after_fence[..body_start].trim();
    if !tag.is_empty() && !tag.eq_ignore_ascii_case("json") {
        return None;
    }
    let body = &after_fence[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    Some(body[..close].trim())
}

/// First `{` through its matching `}`, skipping braces inside string literals.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// True for values a caller should treat as "not given": null, blank strings,
/// empty arrays and objects.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// First non-blank value among `keys`.
pub fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !is_blank(value))
}

/// Strings from a string or an array of scalars; blanks dropped.
pub fn string_list(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::String(text) => vec![text.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Numbers or numeric strings.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
