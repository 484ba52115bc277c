//! The trailing `,{...}` options block of a request template.
//!
//! Keys are loosely typed in the wild (`"retry": 3` and `"retry": "3"`
//! both occur), so the scalars that suffer from that ride in as
//! `serde_json::Value` with coercing accessors.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AugerError, AugerResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestOptions {
    pub method: Option<String>,
    pub charset: Option<String>,
    /// JSON object, or a string holding either a JSON object or
    /// `Key: Value` lines.
    pub headers: Option<Value>,
    /// Raw string or JSON payload.
    pub body: Option<Value>,
    pub retry: Option<Value>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub web_view: Option<Value>,
    pub web_js: Option<String>,
    pub js: Option<String>,
    #[serde(rename = "serverID")]
    pub server_id: Option<i64>,
    pub web_view_delay_time: Option<u64>,
}

/// How the `body` value reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    /// Sent verbatim (JSON or other non-form payloads).
    Raw(String),
    /// `k=v&k2=v2` form encoding.
    Form(String),
}

pub fn parse_options(block: &str) -> AugerResult<RequestOptions> {
    serde_json::from_str(block)
        .map_err(|e| AugerError::OptionParse(format!("bad options block: {e}")))
}

impl RequestOptions {
    pub fn retry_count(&self) -> u32 {
        match &self.retry {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn use_browser(&self) -> bool {
        match &self.web_view {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => {
                let s = s.trim();
                s.eq_ignore_ascii_case("true") || s == "1"
            }
            _ => false,
        }
    }

    /// `webJs` wins over `js` when both are present.
    pub fn web_script(&self) -> Option<String> {
        self.web_js.clone().or_else(|| self.js.clone())
    }

    /// Flattens the `headers` value into ordered pairs.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        match &self.headers {
            Some(Value::Object(map)) => object_pairs(map),
            Some(Value::String(s)) => {
                // A string may itself be a JSON object; fall back to
                // `Key: Value` lines.
                if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(s) {
                    return object_pairs(&map);
                }
                s.lines()
                    .filter_map(|line| line.split_once(':'))
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Classifies the body: JSON-shaped text and structured values go out
    /// verbatim, `k=v` text goes out form-encoded.
    pub fn body_kind(&self) -> Option<BodyKind> {
        match self.body.as_ref()? {
            Value::String(s) => {
                let t = s.trim();
                let json_shaped = (t.starts_with('{') && t.ends_with('}'))
                    || (t.starts_with('[') && t.ends_with(']'));
                if json_shaped {
                    Some(BodyKind::Raw(t.to_string()))
                } else if t.contains('=') {
                    Some(BodyKind::Form(t.to_string()))
                } else {
                    Some(BodyKind::Raw(t.to_string()))
                }
            }
            Value::Null => None,
            other => Some(BodyKind::Raw(other.to_string())),
        }
    }
}

fn object_pairs(map: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    map.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}
