//! Rule executor — resolves a compiled rule against content and merges the
//! alternatives' results under the rule's combinator.
//!
//! Failures here are deliberately quiet: a broken alternative, a selector
//! that does not apply to the content, or a script error logs a warning and
//! contributes nothing. Only rule compilation is loud.

use std::borrow::Cow;

use fnv::FnvHashSet;
use serde_json::Value;
use tracing::warn;

use crate::backend::{jsonpath, markup, pattern, script, xpath};
use crate::capability::ScriptBindings;
use crate::content::Content;
use crate::engine::{Engine, ExecutionContext};
use crate::error::{AugerError, AugerResult};
use crate::rule::compiler::{CompiledExpression, CompiledRule, ReplaceSpec, RuleToken, SelectorMode};
use crate::rule::splitter::CombinatorMode;

/// Shape of the result the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Extracted text values.
    Strings,
    /// Re-parseable fragments (outer HTML or compact JSON) for nested rules.
    Fragments,
    /// Text values resolved against the context base URL and deduplicated.
    Urls,
}

pub fn evaluate_rule(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    content: &Content,
    rule: &CompiledRule,
    kind: ResultKind,
) -> Vec<String> {
    let mut lists: Vec<Vec<String>> = Vec::with_capacity(rule.alternatives.len());
    for alternative in &rule.alternatives {
        let expr = match alternative {
            Ok(expr) => expr,
            Err(failure) => {
                warn!(
                    "skipping broken alternative in '{}': {} (byte {})",
                    rule.raw, failure.detail, failure.offset
                );
                lists.push(Vec::new());
                continue;
            }
        };
        let list = evaluate_expression(engine, ctx, content, expr, kind);
        // `||` stops at the first alternative that produced anything.
        if rule.combinator == CombinatorMode::Or && !list.is_empty() {
            return finish(ctx, kind, list);
        }
        lists.push(list);
    }
    finish(ctx, kind, merge(rule.combinator, lists))
}

fn evaluate_expression(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    content: &Content,
    expr: &CompiledExpression,
    kind: ResultKind,
) -> Vec<String> {
    // Assignments run before the selector; their values are rules in their
    // own right, resolved against the same content.
    for token in &expr.tokens {
        if let RuleToken::VariableAssign { name, value } = token {
            let resolved = nested_rule(engine, ctx, content, value);
            ctx.variables.put_variable(name, &resolved);
        }
    }

    let body = resolve_body(engine, ctx, content, expr);

    let outcome: AugerResult<Vec<String>> = match expr.mode {
        SelectorMode::Markup => {
            let html = content.as_text();
            match kind {
                ResultKind::Fragments => markup::extract_fragments(&html, &body, expr.raw_css),
                _ => markup::extract_strings(&html, &body, expr.raw_css),
            }
        }
        SelectorMode::XPathLike => {
            let html = content.as_text();
            match kind {
                ResultKind::Fragments => xpath::extract_fragments(&html, &body),
                _ => xpath::extract_strings(&html, &body),
            }
        }
        SelectorMode::JsonPathLike => evaluate_json(content, &body, kind),
        SelectorMode::Regex => match engine.regex(&body) {
            Ok(re) => {
                let text = content.as_text();
                let (matches, captures) = pattern::evaluate(&re, &text);
                ctx.last_captures = captures;
                Ok(matches)
            }
            Err(err) => Err(err),
        },
        SelectorMode::Script => {
            run_script(engine, ctx, &content.as_text(), &body).map(script::value_to_strings)
        }
    };

    let mut list = match outcome {
        Ok(list) => list,
        Err(err) => {
            warn!("selector failed for '{}': {}", expr.raw, err);
            Vec::new()
        }
    };
    if let Some(rep) = &expr.replace {
        apply_replace(engine, rep, &mut list);
    }
    list
}

fn evaluate_json(content: &Content, path: &str, kind: ResultKind) -> AugerResult<Vec<String>> {
    let parsed;
    let root = match content {
        Content::Json(v) => v,
        other => {
            let text = other.as_text();
            parsed = serde_json::from_str::<Value>(&text)
                .map_err(|e| AugerError::Selector(format!("content is not json: {e}")))?;
            &parsed
        }
    };
    match kind {
        ResultKind::Fragments => jsonpath::extract_fragments(root, path),
        _ => jsonpath::extract_strings(root, path),
    }
}

/// Splices tokens into the body string the selector backend will see.
/// Script blocks that look like rules (`@`, `$.`, `$[`, `//` lead) run as
/// nested rules instead of going to the evaluator; a block whose script
/// fails splices empty text and the rest of the body still resolves.
fn resolve_body(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    content: &Content,
    expr: &CompiledExpression,
) -> String {
    let mut body = String::new();
    for token in &expr.tokens {
        match token {
            RuleToken::Literal { text } => body.push_str(text),
            RuleToken::ScriptBlock { script } => {
                let trimmed = script.trim();
                if is_inner_rule(trimmed) {
                    body.push_str(&nested_rule(engine, ctx, content, trimmed));
                } else {
                    match run_script(engine, ctx, &content.as_text(), script) {
                        Ok(value) => body.push_str(&render_scalar(&value)),
                        Err(err) => warn!(
                            "script block in '{}' failed, splicing empty: {}",
                            expr.raw, err
                        ),
                    }
                }
            }
            RuleToken::VariableRef { name } => {
                if let Some(v) = ctx.variables.get_variable(name) {
                    body.push_str(&v);
                }
            }
            RuleToken::Backreference { index, raw } => match &ctx.last_captures {
                None => body.push_str(raw),
                Some(caps) => {
                    body.push_str(caps.get(*index).map(String::as_str).unwrap_or(""))
                }
            },
            RuleToken::VariableAssign { .. } => {}
        }
    }
    body
}

fn is_inner_rule(s: &str) -> bool {
    s.starts_with('@') || s.starts_with("$.") || s.starts_with("$[") || s.starts_with("//")
}

pub(crate) fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluates `rule_str` against the same content and joins the result into
/// one string. Depth-guarded so self-referential rules terminate.
fn nested_rule(engine: &Engine, ctx: &mut ExecutionContext, content: &Content, rule_str: &str) -> String {
    if ctx.depth >= engine.config().max_nested_depth {
        warn!(
            "nested rule depth limit ({}) hit at '{}'",
            engine.config().max_nested_depth,
            rule_str
        );
        return String::new();
    }
    let compiled = engine.compiled(rule_str);
    ctx.depth += 1;
    let list = evaluate_rule(engine, ctx, content, &compiled, ResultKind::Strings);
    ctx.depth -= 1;
    list.join(&engine.config().join_separator)
}

/// Evaluates `script` with the configured evaluator, `result` bound to the
/// pipeline value so far. Shared with the request resolver.
pub(crate) fn run_script(
    engine: &Engine,
    ctx: &ExecutionContext,
    result: &str,
    script: &str,
) -> AugerResult<Value> {
    // One evaluation at a time per distinct script text.
    let lock = engine.script_lock(script);
    let _guard = match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let bindings = ScriptBindings {
        base_url: ctx.active_base(),
        result,
        page: ctx.page,
        book: ctx.book.as_ref(),
        chapter: ctx.chapter.as_ref(),
        source: ctx.source.as_ref(),
        cookies: Some(engine.cookies()),
        cache: Some(engine.cache()),
    };
    engine.evaluator().evaluate(script, &bindings)
}

fn apply_replace(engine: &Engine, rep: &ReplaceSpec, list: &mut Vec<String>) {
    let re = match engine.regex(&rep.pattern) {
        Ok(re) => re,
        Err(err) => {
            warn!(
                "replace pattern '{}' failed to compile, results unchanged: {}",
                rep.pattern, err
            );
            return;
        }
    };
    let replacement = brace_group_refs(&rep.replacement);
    for item in list.iter_mut() {
        let out = if rep.first_only {
            re.replace(item, replacement.as_str())
        } else {
            re.replace_all(item, replacement.as_str())
        };
        if let Cow::Owned(s) = out {
            *item = s;
        }
    }
}

/// Rewrites `$1` as `${1}` so a group reference followed by literal text
/// (`$1px`) keeps its meaning under the regex crate's replacement syntax,
/// which would otherwise read the whole run as a group name.
fn brace_group_refs(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some(d) if d.is_ascii_digit() => {
                out.push_str("${");
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    out.push(d);
                    chars.next();
                }
                out.push('}');
            }
            _ => out.push('$'),
        }
    }
    out
}

fn merge(mode: CombinatorMode, lists: Vec<Vec<String>>) -> Vec<String> {
    match mode {
        CombinatorMode::None | CombinatorMode::And => lists.into_iter().flatten().collect(),
        CombinatorMode::Or => lists.into_iter().find(|l| !l.is_empty()).unwrap_or_default(),
        CombinatorMode::Zip => {
            let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
            let mut out = Vec::new();
            for i in 0..longest {
                for list in &lists {
                    if let Some(item) = list.get(i) {
                        out.push(item.clone());
                    }
                }
            }
            out
        }
    }
}

fn finish(ctx: &ExecutionContext, kind: ResultKind, list: Vec<String>) -> Vec<String> {
    if kind != ResultKind::Urls {
        return list;
    }
    let base = ctx.active_base();
    let mut seen = FnvHashSet::default();
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        if item.trim().is_empty() {
            continue;
        }
        let resolved = resolve_url(base, item.trim());
        if seen.insert(resolved.clone()) {
            out.push(resolved);
        }
    }
    out
}

/// Resolve a potentially relative URL against a base URL.
pub(crate) fn resolve_url(base_url: &str, relative: &str) -> String {
    if relative.starts_with("http://") || relative.starts_with("https://") {
        return relative.to_string();
    }
    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(relative) {
            return resolved.to_string();
        }
    }
    relative.to_string()
}
