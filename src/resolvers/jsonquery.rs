//! Path-query evaluation over parsed JSON trees.
//!
//! Custom resolvers in `json` mode select response nodes with a small
//! JSONPath-like language: an optional `$` root, `.key` member steps,
//! `['key']` bracketed members, `..key` recursive descent, `[n]` index steps
//! and `[*]`/`.*` wildcards. A member step applied to an array traverses its
//! elements, so `$.oa_locations.url` reaches into each element of
//! `oa_locations` without an explicit wildcard.
//!
//! Queries are compiled once at spec-validation time; evaluation never
//! re-parses the expression.

use serde_json::Value;

/// One compiled step of a path query.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// `.key` or `['key']`
    Key(String),
    /// `..key`: the key at any depth below the current nodes
    Descend(String),
    /// `[n]`
    Index(usize),
    /// `[*]` or `.*`
    Wildcard,
}

/// A compiled path-query expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    steps: Vec<Step>,
}

/// Parse failure for a path-query expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path query at byte {at}: {message}")]
pub struct PathQueryError {
    at: usize,
    message: &'static str,
}

impl PathQuery {
    /// Compile an expression. An empty or root-only (`$`) query selects the
    /// document itself.
    pub fn parse(input: &str) -> Result<Self, PathQueryError> {
        let bytes = input.trim().as_bytes();
        let mut steps = Vec::new();
        let mut pos = 0;

        if bytes.first() == Some(&b'$') {
            pos += 1;
        }

        while pos < bytes.len() {
            match bytes[pos] {
                b'.' => {
                    if bytes.get(pos + 1) == Some(&b'.') {
                        pos += 2;
                        let (key, next) = read_key(bytes, pos);
                        if key.is_empty() {
                            return Err(PathQueryError {
                                at: pos,
                                message: "expected a key after '..'",
                            });
                        }
                        steps.push(Step::Descend(key));
                        pos = next;
                    } else if bytes.get(pos + 1) == Some(&b'*') {
                        steps.push(Step::Wildcard);
                        pos += 2;
                    } else {
                        pos += 1;
                        let (key, next) = read_key(bytes, pos);
                        if key.is_empty() {
                            return Err(PathQueryError {
                                at: pos,
                                message: "expected a key after '.'",
                            });
                        }
                        steps.push(Step::Key(key));
                        pos = next;
                    }
                }
                b'[' => {
                    let close = find_byte(bytes, pos + 1, b']').ok_or(PathQueryError {
                        at: pos,
                        message: "unclosed '['",
                    })?;
                    let inner = input.trim()[pos + 1..close].trim();
                    if inner == "*" {
                        steps.push(Step::Wildcard);
                    } else if let Some(quoted) = unquote(inner) {
                        steps.push(Step::Key(quoted.to_string()));
                    } else if let Ok(index) = inner.parse::<usize>() {
                        steps.push(Step::Index(index));
                    } else {
                        return Err(PathQueryError {
                            at: pos + 1,
                            message: "expected an index, '*' or a quoted key",
                        });
                    }
                    pos = close + 1;
                }
                _ => {
                    return Err(PathQueryError {
                        at: pos,
                        message: "expected '.' or '['",
                    })
                }
            }
        }

        Ok(Self { steps })
    }

    /// Select matching nodes from a parsed document.
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for step in &self.steps {
            let mut next = Vec::new();
            for node in current {
                apply_step(node, step, &mut next);
            }
            current = next;
        }
        current
    }
}

fn apply_step<'a>(node: &'a Value, step: &Step, out: &mut Vec<&'a Value>) {
    match step {
        Step::Key(key) => key_step(node, key, out),
        Step::Descend(key) => descend_step(node, key, out),
        Step::Index(index) => {
            if let Some(value) = node.as_array().and_then(|items| items.get(*index)) {
                out.push(value);
            }
        }
        Step::Wildcard => match node {
            Value::Object(map) => out.extend(map.values()),
            Value::Array(items) => out.extend(items.iter()),
            _ => {}
        },
    }
}

/// Member access; arrays are traversed transparently.
fn key_step<'a>(node: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            if let Some(value) = map.get(key) {
                out.push(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                key_step(item, key, out);
            }
        }
        _ => {}
    }
}

/// Collect `key` members anywhere in the subtree, document order.
fn descend_step<'a>(node: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            if let Some(value) = map.get(key) {
                out.push(value);
            }
            for value in map.values() {
                descend_step(value, key, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                descend_step(item, key, out);
            }
        }
        _ => {}
    }
}

fn read_key(bytes: &[u8], start: usize) -> (String, usize) {
    let mut end = start;
    while end < bytes.len() && bytes[end] != b'.' && bytes[end] != b'[' {
        end += 1;
    }
    (
        String::from_utf8_lossy(&bytes[start..end]).into_owned(),
        end,
    )
}

fn find_byte(bytes: &[u8], start: usize, needle: u8) -> Option<usize> {
    bytes[start..].iter().position(|&b| b == needle).map(|i| start + i)
}

fn unquote(inner: &str) -> Option<&str> {
    let stripped = inner
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .or_else(|| {
            inner
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
        })?;
    Some(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_chain() {
        let doc = json!({"message": {"link": "http://x/doc.pdf"}});
        let query = PathQuery::parse("$.message.link").unwrap();
        assert_eq!(query.select(&doc), vec![&json!("http://x/doc.pdf")]);
    }

    #[test]
    fn test_key_step_traverses_arrays() {
        let doc = json!({
            "oa_locations": [
                {"url": "http://a/1.pdf"},
                {"url": "http://a/2.pdf"},
                {"license": "cc-by"}
            ]
        });
        let query = PathQuery::parse("$.oa_locations.url").unwrap();
        assert_eq!(
            query.select(&doc),
            vec![&json!("http://a/1.pdf"), &json!("http://a/2.pdf")]
        );
    }

    #[test]
    fn test_wildcard_over_root_array() {
        let doc = json!([{"link": "http://x/doc.pdf"}, {"link": "http://y/doc.pdf"}]);
        let query = PathQuery::parse("$[*]").unwrap();
        assert_eq!(query.select(&doc).len(), 2);

        let dotted = PathQuery::parse("$.*").unwrap();
        assert_eq!(dotted.select(&doc).len(), 2);
    }

    #[test]
    fn test_index_and_quoted_key() {
        let doc = json!({"hits": ["zero", "one", "two"], "odd key": true});
        assert_eq!(
            PathQuery::parse("$.hits[1]").unwrap().select(&doc),
            vec![&json!("one")]
        );
        assert_eq!(
            PathQuery::parse("$['odd key']").unwrap().select(&doc),
            vec![&json!(true)]
        );
    }

    #[test]
    fn test_recursive_descent() {
        let doc = json!({
            "results": {"best": {"pdf": "http://b/best.pdf"},
                        "other": [{"pdf": "http://b/other.pdf"}]}
        });
        let query = PathQuery::parse("$..pdf").unwrap();
        assert_eq!(
            query.select(&doc),
            vec![&json!("http://b/best.pdf"), &json!("http://b/other.pdf")]
        );
    }

    #[test]
    fn test_root_query_selects_document() {
        let doc = json!({"a": 1});
        assert_eq!(PathQuery::parse("$").unwrap().select(&doc), vec![&doc]);
        assert_eq!(PathQuery::parse("").unwrap().select(&doc), vec![&doc]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(PathQuery::parse("$.").is_err());
        assert!(PathQuery::parse("$[abc]").is_err());
        assert!(PathQuery::parse("$[0").is_err());
        assert!(PathQuery::parse("link").is_err());
    }

    #[test]
    fn test_missing_key_selects_nothing() {
        let doc = json!({"a": 1});
        assert!(PathQuery::parse("$.b").unwrap().select(&doc).is_empty());
    }
}
