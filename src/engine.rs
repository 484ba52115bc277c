//! Engine — owns configuration, capability handles, and the process-wide
//! caches: compiled rules, compiled regexes, and the per-script locks that
//! serialize evaluator calls.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::capability::{
    CacheStore, CookieStore, MemoryVariables, NoopCache, NoopCookies, NoopEvaluator,
    ScriptEvaluator, VariableStore,
};
use crate::content::Content;
use crate::error::{AugerError, AugerResult};
use crate::rule::compiler::{compile_rule, CompiledRule};
use crate::rule::executor::{evaluate_rule, ResultKind};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Recursion limit for rules that evaluate other rules.
    pub max_nested_depth: usize,
    /// Separator used when a list result collapses to a single string.
    pub join_separator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_nested_depth: 16,
            join_separator: "\n".to_string(),
        }
    }
}

/// Shared, thread-safe rule engine. Cheap to share behind an `Arc`; all
/// caches use concurrent maps and interior mutability.
pub struct Engine {
    config: EngineConfig,
    evaluator: Arc<dyn ScriptEvaluator>,
    cookies: Arc<dyn CookieStore>,
    cache: Arc<dyn CacheStore>,
    rules: DashMap<String, Arc<CompiledRule>>,
    regexes: DashMap<String, Arc<Regex>>,
    script_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            evaluator: Arc::new(NoopEvaluator),
            cookies: Arc::new(NoopCookies),
            cache: Arc::new(NoopCache),
            rules: DashMap::new(),
            regexes: DashMap::new(),
            script_locks: DashMap::new(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_cookies(mut self, cookies: Arc<dyn CookieStore>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn evaluator(&self) -> &dyn ScriptEvaluator {
        &*self.evaluator
    }

    pub(crate) fn cookies(&self) -> &dyn CookieStore {
        &*self.cookies
    }

    pub(crate) fn cache(&self) -> &dyn CacheStore {
        &*self.cache
    }

    // ── Caches ──

    /// Cached lenient compile. Broken alternatives stay in the result as
    /// failures; execution skips them with a warning.
    pub fn compiled(&self, rule: &str) -> Arc<CompiledRule> {
        if let Some(hit) = self.rules.get(rule) {
            return Arc::clone(hit.value());
        }
        debug!("compiling rule '{}'", rule);
        let compiled = Arc::new(compile_rule(rule));
        self.rules.insert(rule.to_string(), Arc::clone(&compiled));
        compiled
    }

    /// Strict compile: the first broken alternative surfaces as an error.
    pub fn compile(&self, rule: &str) -> AugerResult<Arc<CompiledRule>> {
        let compiled = self.compiled(rule);
        match compiled.first_error() {
            Some(err) => Err(err),
            None => Ok(compiled),
        }
    }

    /// Cached regex compile. Failures are not cached; a pattern that
    /// cannot compile reports every time it is used.
    pub(crate) fn regex(&self, pattern: &str) -> AugerResult<Arc<Regex>> {
        if let Some(hit) = self.regexes.get(pattern) {
            return Ok(Arc::clone(hit.value()));
        }
        let re = Regex::new(pattern)
            .map_err(|e| AugerError::Selector(format!("invalid pattern '{pattern}': {e}")))?;
        let re = Arc::new(re);
        self.regexes.insert(pattern.to_string(), Arc::clone(&re));
        Ok(re)
    }

    /// Lock shared by every evaluation of the same script text.
    pub(crate) fn script_lock(&self, script: &str) -> Arc<Mutex<()>> {
        self.script_locks
            .entry(script.to_string())
            .or_default()
            .clone()
    }

    // ── Extraction entry points ──

    /// Evaluates `rule` against `content` and returns the result list.
    pub fn extract_list(
        &self,
        ctx: &mut ExecutionContext,
        content: &Content,
        rule: &str,
    ) -> Vec<String> {
        let compiled = self.compiled(rule);
        evaluate_rule(self, ctx, content, &compiled, ResultKind::Strings)
    }

    /// List evaluation collapsed to one string with the configured
    /// separator.
    pub fn extract_string(
        &self,
        ctx: &mut ExecutionContext,
        content: &Content,
        rule: &str,
    ) -> String {
        self.extract_list(ctx, content, rule)
            .join(&self.config.join_separator)
    }

    /// Fragment evaluation: outer HTML or compact JSON per match, suitable
    /// as content for nested per-item rules.
    pub fn extract_fragments(
        &self,
        ctx: &mut ExecutionContext,
        content: &Content,
        rule: &str,
    ) -> Vec<String> {
        let compiled = self.compiled(rule);
        evaluate_rule(self, ctx, content, &compiled, ResultKind::Fragments)
    }

    /// URL evaluation: results resolve against the context base and
    /// deduplicate while keeping first-seen order.
    pub fn extract_urls(
        &self,
        ctx: &mut ExecutionContext,
        content: &Content,
        rule: &str,
    ) -> Vec<String> {
        let compiled = self.compiled(rule);
        evaluate_rule(self, ctx, content, &compiled, ResultKind::Urls)
    }
}

/// Per-evaluation state. One context per document; sharing one across
/// documents leaks variables and capture rows between pages.
pub struct ExecutionContext {
    /// URL the content was fetched from.
    pub base_url: String,
    /// Post-redirect location, when the fetch layer followed one.
    /// Relative URLs resolve against it in preference to `base_url`.
    pub redirect_url: Option<String>,
    /// Variable store backing `@put`/`@get`.
    pub variables: Arc<dyn VariableStore>,
    /// Opaque payloads handed through to scripts.
    pub book: Option<Value>,
    pub chapter: Option<Value>,
    pub source: Option<Value>,
    /// Page number, when the caller is paginating.
    pub page: Option<i64>,
    pub(crate) last_captures: Option<Vec<String>>,
    pub(crate) depth: usize,
}

impl ExecutionContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            redirect_url: None,
            variables: Arc::new(MemoryVariables::new()),
            book: None,
            chapter: None,
            source: None,
            page: None,
            last_captures: None,
            depth: 0,
        }
    }

    pub fn with_variables(mut self, variables: Arc<dyn VariableStore>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    /// Base URL nested resolution happens against.
    pub fn active_base(&self) -> &str {
        self.redirect_url.as_deref().unwrap_or(&self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_cache_returns_shared_instance() {
        let engine = Engine::new();
        let a = engine.compiled("div@text");
        let b = engine.compiled("div@text");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_strict_compile_reports_unbalanced() {
        let engine = Engine::new();
        let err = engine.compile("div[1").unwrap_err();
        assert!(err.to_string().contains("unbalanced"));
        assert!(engine.compile("div[1]@text").is_ok());
    }

    #[test]
    fn test_regex_cache_and_failure() {
        let engine = Engine::new();
        let a = engine.regex(r"\d+").unwrap();
        let b = engine.regex(r"\d+").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(engine.regex("[unclosed").is_err());
    }

    #[test]
    fn test_script_lock_is_per_script_text() {
        let engine = Engine::new();
        let a = engine.script_lock("x()");
        let b = engine.script_lock("x()");
        let c = engine.script_lock("y()");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_extract_string_joins_with_separator() {
        let engine = Engine::with_config(EngineConfig {
            join_separator: ", ".into(),
            ..EngineConfig::default()
        });
        let mut ctx = ExecutionContext::new("https://example.com/");
        let content = Content::from_html("<ul><li>a</li><li>b</li></ul>");
        assert_eq!(engine.extract_string(&mut ctx, &content, "li@text"), "a, b");
    }

    #[test]
    fn test_active_base_prefers_redirect() {
        let mut ctx = ExecutionContext::new("https://example.com/a");
        assert_eq!(ctx.active_base(), "https://example.com/a");
        ctx.redirect_url = Some("https://example.com/b".into());
        assert_eq!(ctx.active_base(), "https://example.com/b");
    }
}
