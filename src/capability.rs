//! Capability interfaces consumed by the engine.
//!
//! Storage, script execution, cookies and caching all live outside this
//! crate; the engine only sees the narrow traits below. No-op
//! implementations ship as defaults, in-memory ones for tests and the CLI.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{AugerError, AugerResult};

// ── Variable store ──

/// Key/value store rules read with `@get:{...}` and write with
/// `@put:{...}`. Keys are case-sensitive, last write wins. The "large"
/// half mirrors the small one but is meant for bulky payloads the backing
/// store may keep out of its hot path.
pub trait VariableStore: Send + Sync {
    fn put_variable(&self, key: &str, value: &str);
    fn get_variable(&self, key: &str) -> Option<String>;
    fn put_large_variable(&self, key: &str, value: &str);
    fn get_large_variable(&self, key: &str) -> Option<String>;
}

/// In-memory variable store.
#[derive(Default)]
pub struct MemoryVariables {
    small: Mutex<HashMap<String, String>>,
    large: Mutex<HashMap<String, String>>,
}

impl MemoryVariables {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VariableStore for MemoryVariables {
    fn put_variable(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.small.lock() {
            map.insert(key.to_string(), value.to_string());
        }
    }

    fn get_variable(&self, key: &str) -> Option<String> {
        self.small.lock().ok()?.get(key).cloned()
    }

    fn put_large_variable(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.large.lock() {
            map.insert(key.to_string(), value.to_string());
        }
    }

    fn get_large_variable(&self, key: &str) -> Option<String> {
        self.large.lock().ok()?.get(key).cloned()
    }
}

// ── Script evaluator ──

/// Bindings handed to every script invocation.
#[derive(Clone, Copy, Default)]
pub struct ScriptBindings<'a> {
    /// Base URL of the document being analyzed.
    pub base_url: &'a str,
    /// The pipeline value so far (`result` inside scripts).
    pub result: &'a str,
    /// Page number, bound by the request resolver when one was supplied.
    pub page: Option<i64>,
    /// Opaque pass-through payloads; the engine never interprets them.
    pub book: Option<&'a Value>,
    pub chapter: Option<&'a Value>,
    pub source: Option<&'a Value>,
    pub cookies: Option<&'a dyn CookieStore>,
    pub cache: Option<&'a dyn CacheStore>,
}

impl<'a> ScriptBindings<'a> {
    pub fn new(base_url: &'a str, result: &'a str) -> Self {
        ScriptBindings {
            base_url,
            result,
            ..ScriptBindings::default()
        }
    }
}

/// Pluggable script runtime. The engine compiles nothing itself; it hands
/// the script text and bindings over and maps the returned JSON value to
/// strings. Implementations may cache compiled scripts by text; the engine
/// serializes invocations per distinct script text, so such caches need no
/// reentrancy.
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, script: &str, bindings: &ScriptBindings<'_>) -> AugerResult<Value>;
}

/// Always-failing evaluator used when no script runtime is wired in.
/// Rules without script blocks work fully; script pieces evaluate to
/// empty, logged.
pub struct NoopEvaluator;

impl ScriptEvaluator for NoopEvaluator {
    fn evaluate(&self, _script: &str, _bindings: &ScriptBindings<'_>) -> AugerResult<Value> {
        Err(AugerError::Script("no script evaluator configured".into()))
    }
}

// ── Cookie store ──

/// Read-only view of stored cookies, keyed by domain. Used to decorate
/// outgoing request headers and exposed to scripts.
pub trait CookieStore: Send + Sync {
    /// The `Cookie:` header value for a domain, if any cookies are stored.
    fn get(&self, domain: &str) -> Option<String>;
}

/// Cookie store with nothing in it.
pub struct NoopCookies;

impl CookieStore for NoopCookies {
    fn get(&self, _domain: &str) -> Option<String> {
        None
    }
}

// ── Cache ──

/// String cache handed to scripts via bindings; the engine itself never
/// reads or writes it.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
}

/// Cache that stores nothing.
pub struct NoopCache;

impl CacheStore for NoopCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
    fn put(&self, _key: &str, _value: String) {}
}

/// In-memory cache.
#[derive(Default)]
pub struct MemoryCache {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: String) {
        if let Ok(mut map) = self.map.lock() {
            map.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_variables_last_write_wins() {
        let vars = MemoryVariables::new();
        vars.put_variable("k", "one");
        vars.put_variable("k", "two");
        assert_eq!(vars.get_variable("k").as_deref(), Some("two"));
        assert_eq!(vars.get_variable("missing"), None);
    }

    #[test]
    fn test_memory_variables_halves_are_separate() {
        let vars = MemoryVariables::new();
        vars.put_variable("k", "small");
        vars.put_large_variable("k", "large");
        assert_eq!(vars.get_variable("k").as_deref(), Some("small"));
        assert_eq!(vars.get_large_variable("k").as_deref(), Some("large"));
    }

    #[test]
    fn test_noop_evaluator_errors() {
        let e = NoopEvaluator;
        let bindings = ScriptBindings::new("http://x/", "");
        assert!(e.evaluate("1+1", &bindings).is_err());
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        cache.put("a", "1".into());
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("b"), None);
    }
}
