//! Request body decoding units.
//!
//! Both units decode `req.raw_body()` into `req.body` when the request carries
//! a matching `Content-Type` and a non-empty body, and always advance the chain
//! afterwards. A body that is already decoded is left alone, so the JSON and
//! url-encoded units can be installed together.

use serde_json::{Map, Value};
use tracing::debug;

use crate::dispatcher::HandlerError;
use crate::handlers::Handler;
use crate::server::Request;

/// Bracket nesting deeper than this is kept as part of the key.
const MAX_DEPTH: usize = 5;

/// Indexes above this build objects instead of sparse arrays.
const ARRAY_LIMIT: usize = 20;

/// Decode `application/json` and `*/*+json` bodies.
pub fn json(limit: usize) -> Handler {
    Handler::continuation(move |req, res, next| {
        if req.body.is_none() && req.is(&["json", "+json"]).is_some() && !req.raw_body().is_empty() {
            check_limit(req, limit)?;
            let text = body_text(req)?;
            let value: Value = serde_json::from_str(text.trim())?;
            debug!(
                request_id = %req.id(),
                body_size_bytes = req.raw_body().len(),
                body_fields = value.as_object().map(Map::len),
                "JSON body parsed"
            );
            req.body = Some(value);
        }
        Ok(next.run(req, res))
    })
}

/// Decode `application/x-www-form-urlencoded` bodies.
///
/// With `extended`, bracket keys build nested values:
/// `meta[name]=Yue&meta[codes][]=1&meta[codes][]=2` becomes
/// `{"meta": {"name": "Yue", "codes": ["1", "2"]}}`. Without it, keys are
/// flat and repeated keys collect into arrays.
pub fn urlencoded(extended: bool, limit: usize) -> Handler {
    Handler::continuation(move |req, res, next| {
        if req.body.is_none() && req.is(&["urlencoded"]).is_some() && !req.raw_body().is_empty() {
            check_limit(req, limit)?;
            let text = body_text(req)?;
            let value = if extended {
                parse_extended(&text)
            } else {
                parse_flat(&text)
            };
            debug!(
                request_id = %req.id(),
                body_size_bytes = req.raw_body().len(),
                extended,
                "Url-encoded body parsed"
            );
            req.body = Some(value);
        }
        Ok(next.run(req, res))
    })
}

fn check_limit(req: &Request, limit: usize) -> Result<(), HandlerError> {
    let len = req.raw_body().len();
    if len > limit {
        return Err(HandlerError::text(format!(
            "request entity too large: {len} bytes exceeds the {limit} byte limit"
        )));
    }
    Ok(())
}

fn body_text(req: &Request) -> Result<String, HandlerError> {
    match req.charset().as_deref() {
        None | Some("utf-8") | Some("utf8") | Some("us-ascii") => {}
        Some(other) => {
            return Err(HandlerError::text(format!("unsupported charset \"{}\"", other.to_uppercase())));
        }
    }
    String::from_utf8(req.raw_body().to_vec())
        .map_err(|_| HandlerError::text("request body is not valid UTF-8"))
}

fn pairs(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    url::form_urlencoded::parse(text.as_bytes()).map(|(k, v)| (k.into_owned(), v.into_owned()))
}

/// Flat decoding; a repeated key becomes an array of its values.
pub fn parse_flat(text: &str) -> Value {
    let mut out = Map::new();
    for (key, value) in pairs(text) {
        merge_leaf(&mut out, key, Value::String(value));
    }
    Value::Object(out)
}

/// Nested decoding of bracket keys.
pub fn parse_extended(text: &str) -> Value {
    let mut root = Value::Object(Map::new());
    for (key, value) in pairs(text) {
        let segments = split_key(&key);
        if segments.is_empty() {
            continue;
        }
        insert(&mut root, &segments, Value::String(value));
    }
    root
}

fn merge_leaf(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

/// `a[b][0][]` becomes `["a", "b", "0", ""]`.
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 {
        return vec![key.to_string()];
    }
    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        if segments.len() > MAX_DEPTH {
            segments.push(rest.to_string());
            return segments;
        }
        match inner.find(']') {
            Some(close) => {
                segments.push(inner[..close].to_string());
                rest = &inner[close + 1..];
            }
            None => {
                segments.push(rest.to_string());
                return segments;
            }
        }
    }
    if !rest.is_empty() {
        segments.push(rest.to_string());
    }
    segments
}

fn container_for(segment: &str) -> Value {
    if segment.is_empty() || segment.parse::<usize>().is_ok_and(|i| i <= ARRAY_LIMIT) {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn array_to_object(items: &mut Vec<Value>) -> Map<String, Value> {
    items
        .drain(..)
        .enumerate()
        .map(|(i, v)| (i.to_string(), v))
        .collect()
}

fn insert(node: &mut Value, segments: &[String], value: Value) {
    let (segment, rest) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };

    if let Value::Array(items) = node {
        let index = if segment.is_empty() {
            Some(items.len())
        } else {
            segment.parse::<usize>().ok().filter(|i| *i <= ARRAY_LIMIT)
        };
        match index {
            Some(i) if rest.is_empty() => {
                if i < items.len() {
                    let slot = &mut items[i];
                    let first = slot.take();
                    *slot = match first {
                        Value::Array(mut existing) => {
                            existing.push(value);
                            Value::Array(existing)
                        }
                        other => Value::Array(vec![other, value]),
                    };
                } else {
                    items.push(value);
                }
                return;
            }
            Some(i) => {
                if i >= items.len() {
                    items.push(container_for(&rest[0]));
                }
                let last = items.len() - 1;
                let slot = if i < items.len() { i } else { last };
                insert(&mut items[slot], rest, value);
                return;
            }
            None => {
                let converted = array_to_object(items);
                *node = Value::Object(converted);
            }
        }
    }

    match node {
        Value::Object(map) => {
            if rest.is_empty() {
                merge_leaf(map, segment.clone(), value);
            } else {
                let child = map
                    .entry(segment.clone())
                    .or_insert_with(|| container_for(&rest[0]));
                if !child.is_object() && !child.is_array() {
                    let previous = child.take();
                    let mut wrapped = Map::new();
                    wrapped.insert("0".to_string(), previous);
                    *child = Value::Object(wrapped);
                }
                insert(child, rest, value);
            }
        }
        other => {
            let mut map = Map::new();
            map.insert("0".to_string(), other.take());
            *other = Value::Object(map);
            insert(other, segments, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("a"), vec!["a"]);
        assert_eq!(split_key("a[b][0][]"), vec!["a", "b", "0", ""]);
        assert_eq!(split_key("a[b"), vec!["a", "[b"]);
        assert_eq!(split_key("[x]"), vec!["[x]"]);
    }

    #[test]
    fn test_extended_nested_object_and_arrays() {
        let body = "name=Ayon&meta%5BfirstName%5D=Yue&meta%5Bcodes%5D%5B0%5D=1&meta%5Bcodes%5D%5B1%5D=2";
        assert_eq!(
            parse_extended(body),
            json!({"name": "Ayon", "meta": {"firstName": "Yue", "codes": ["1", "2"]}})
        );
    }

    #[test]
    fn test_extended_push_syntax_and_duplicates() {
        assert_eq!(parse_extended("tags[]=a&tags[]=b"), json!({"tags": ["a", "b"]}));
        assert_eq!(parse_extended("x=1&x=2"), json!({"x": ["1", "2"]}));
    }

    #[test]
    fn test_extended_array_of_objects() {
        assert_eq!(
            parse_extended("users[0][name]=a&users[0][age]=1&users[1][name]=b"),
            json!({"users": [{"name": "a", "age": "1"}, {"name": "b"}]})
        );
    }

    #[test]
    fn test_large_index_builds_object() {
        assert_eq!(parse_extended("a[100]=x"), json!({"a": {"100": "x"}}));
    }

    #[test]
    fn test_flat_parsing() {
        assert_eq!(
            parse_flat("a=1&b=two+words&a=3&meta[x]=y"),
            json!({"a": ["1", "3"], "b": "two words", "meta[x]": "y"})
        );
    }
}
