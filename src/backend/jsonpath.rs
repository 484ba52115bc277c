//! JSON-path backend — a hand-rolled walker over `serde_json` values.
//!
//! Supports the subset rule authors use: `$.a.b`, `['key']`, `[n]`,
//! `[n1,n2]`, `[start:end]` (end exclusive, negatives from the end, empty
//! bounds open), wildcard `.*`/`[*]` and recursive descent `..name`.
//! Filters and script expressions are out; they parse as an error and the
//! executor downgrades that to an empty result.

use serde_json::Value;

use crate::error::{AugerError, AugerResult};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Indices(Vec<i64>),
    Slice { start: Option<i64>, end: Option<i64> },
    Wildcard,
    Descend(String),
}

/// Matched scalars render via display form (strings raw, numbers and
/// booleans as their JSON text); containers render as compact JSON. Null
/// matches are dropped.
pub fn extract_strings(root: &Value, path: &str) -> AugerResult<Vec<String>> {
    let segments = parse_path(path)?;
    Ok(select(root, &segments)
        .into_iter()
        .filter_map(render)
        .collect())
}

/// Fragment evaluation keeps each match as one item; containers stay
/// compact JSON so nested rules can re-parse them.
pub fn extract_fragments(root: &Value, path: &str) -> AugerResult<Vec<String>> {
    extract_strings(root, path)
}

fn render(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn select<'a>(root: &'a Value, segments: &[Segment]) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in segments {
        let mut next = Vec::new();
        for v in &current {
            apply_segment(v, segment, &mut next);
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

fn apply_segment<'a>(v: &'a Value, segment: &Segment, out: &mut Vec<&'a Value>) {
    match segment {
        Segment::Key(name) => {
            if let Some(found) = v.as_object().and_then(|o| o.get(name)) {
                out.push(found);
            }
        }
        Segment::Indices(list) => {
            if let Some(arr) = v.as_array() {
                let len = arr.len() as i64;
                for &i in list {
                    let idx = if i < 0 { len + i } else { i };
                    if idx >= 0 && idx < len {
                        out.push(&arr[idx as usize]);
                    }
                }
            }
        }
        Segment::Slice { start, end } => {
            if let Some(arr) = v.as_array() {
                let len = arr.len() as i64;
                let resolve = |bound: i64| (if bound < 0 { len + bound } else { bound }).clamp(0, len);
                let from = resolve(start.unwrap_or(0));
                let to = resolve(end.unwrap_or(len));
                for item in arr.iter().take(to as usize).skip(from as usize) {
                    out.push(item);
                }
            }
        }
        Segment::Wildcard => match v {
            Value::Array(items) => out.extend(items.iter()),
            Value::Object(map) => out.extend(map.values()),
            _ => {}
        },
        Segment::Descend(name) => descend(v, name, out),
    }
}

fn descend<'a>(v: &'a Value, name: &str, out: &mut Vec<&'a Value>) {
    match v {
        Value::Object(map) => {
            for (key, val) in map {
                if key == name {
                    out.push(val);
                }
                descend(val, name, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                descend(item, name, out);
            }
        }
        _ => {}
    }
}

// ── Path parsing ──

fn parse_path(path: &str) -> AugerResult<Vec<Segment>> {
    let p = path.trim();
    let rest = p.strip_prefix('$').unwrap_or(p);
    let bytes = rest.as_bytes();
    let mut segments = Vec::new();
    let mut i = 0;
    // `@Json:items[0].id` style paths may open with a bare key.
    if bytes.first().is_some_and(|b| *b != b'.' && *b != b'[') {
        let (name, next) = read_name(rest, 0);
        segments.push(Segment::Key(name.to_string()));
        i = next;
    }
    while i < bytes.len() {
        match bytes[i] {
            b'.' if bytes.get(i + 1) == Some(&b'.') => {
                let (name, next) = read_name(rest, i + 2);
                if name.is_empty() {
                    return Err(bad_path(path, i));
                }
                segments.push(Segment::Descend(name.to_string()));
                i = next;
            }
            b'.' if bytes.get(i + 1) == Some(&b'*') => {
                segments.push(Segment::Wildcard);
                i += 2;
            }
            b'.' => {
                let (name, next) = read_name(rest, i + 1);
                if name.is_empty() {
                    return Err(bad_path(path, i));
                }
                segments.push(Segment::Key(name.to_string()));
                i = next;
            }
            b'[' => {
                let close = rest[i..]
                    .find(']')
                    .map(|off| i + off)
                    .ok_or_else(|| bad_path(path, i))?;
                segments.push(parse_bracket(rest[i + 1..close].trim(), path, i)?);
                i = close + 1;
            }
            _ => return Err(bad_path(path, i)),
        }
    }
    Ok(segments)
}

/// A name runs to the next `.` or `[`.
fn read_name(rest: &str, from: usize) -> (&str, usize) {
    let end = rest[from..]
        .find(['.', '['])
        .map(|off| from + off)
        .unwrap_or(rest.len());
    (&rest[from..end], end)
}

fn parse_bracket(interior: &str, path: &str, at: usize) -> AugerResult<Segment> {
    if interior == "*" {
        return Ok(Segment::Wildcard);
    }
    let b = interior.as_bytes();
    if b.len() >= 2 && (b[0] == b'\'' || b[0] == b'"') && b[b.len() - 1] == b[0] {
        return Ok(Segment::Key(interior[1..interior.len() - 1].to_string()));
    }
    if interior.contains(':') {
        let pieces: Vec<&str> = interior.split(':').collect();
        if pieces.len() != 2 {
            return Err(bad_path(path, at));
        }
        let bound = |s: &str| -> AugerResult<Option<i64>> {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse().map(Some).map_err(|_| bad_path(path, at))
            }
        };
        return Ok(Segment::Slice {
            start: bound(pieces[0])?,
            end: bound(pieces[1])?,
        });
    }
    let mut list = Vec::new();
    for part in interior.split(',') {
        list.push(
            part.trim()
                .parse::<i64>()
                .map_err(|_| bad_path(path, at))?,
        );
    }
    if list.is_empty() {
        return Err(bad_path(path, at));
    }
    Ok(Segment::Indices(list))
}

fn bad_path(path: &str, at: usize) -> AugerError {
    AugerError::Selector(format!("unsupported json path '{path}' at byte {at}"))
}
