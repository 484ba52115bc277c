//! Request descriptors — the engine's output toward whatever fetch layer
//! sits above it. The engine never performs network I/O itself.

pub mod options;
pub mod resolver;

pub use options::RequestOptions;
pub use resolver::resolve_request;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("post") {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved request. Every template placeholder and option key has
/// been folded in; the fetch layer can execute this without consulting the
/// engine again.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestDescriptor {
    pub final_url: String,
    pub method: HttpMethod,
    /// Ordered; a later write to an existing key replaces its value in
    /// place.
    pub headers: Vec<(String, String)>,
    /// Percent-encoded query string, when the method is GET and the URL
    /// carried one.
    pub encoded_query: Option<String>,
    /// Form-encoded POST body (`k=v&k2=v2`).
    pub encoded_form: Option<String>,
    /// Verbatim POST body (JSON or other non-form payloads).
    pub raw_body: Option<String>,
    pub charset: Option<String>,
    pub retry_count: u32,
    /// Whether the fetch layer should render through a browser engine.
    pub use_browser_render: bool,
    /// Script the fetch layer runs in the rendered page.
    pub web_script: Option<String>,
    /// Delay before the rendered page is read.
    pub delay_ms: u64,
    pub server_id: Option<i64>,
}

impl RequestDescriptor {
    /// Header keys compare case-insensitively; order of first insertion is
    /// kept.
    pub fn set_header(&mut self, key: &str, value: String) {
        for (k, v) in self.headers.iter_mut() {
            if k.eq_ignore_ascii_case(key) {
                *v = value;
                return;
            }
        }
        self.headers.push((key.to_string(), value));
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}
