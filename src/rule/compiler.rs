//! Rule compiler — per-alternative mode detection and token extraction.
//!
//! One alternative (one piece of the splitter's output) compiles into a
//! [`CompiledExpression`]: a selector mode, an ordered token list
//! (literal text interleaved with script blocks, variable reads/writes and
//! regex backreferences) and an optional trailing `##` replacement.
//! Compilation is a pure function of the input string, so whole rules are
//! compiled once and cached by the engine.

use serde::{Deserialize, Serialize};

use crate::error::{AugerError, AugerResult};
use crate::rule::splitter::{split_rule, CombinatorMode};
use crate::rule::starts_with_ci;
use crate::scan::{self, EscapePolicy};

/// Which backend interprets an alternative's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorMode {
    Markup,
    XPathLike,
    JsonPathLike,
    Regex,
    Script,
}

/// One substitution token of a compiled expression body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleToken {
    Literal { text: String },
    /// `{{...}}` interior. Resolved through the script evaluator, except
    /// when the text itself starts with a rule marker (`@`, `$.`, `$[`,
    /// `//`), in which case it is evaluated as a nested rule.
    ScriptBlock { script: String },
    /// `@get:{name}` — variable-store read.
    VariableRef { name: String },
    /// `$N` — positional capture from the most recent regex match. `raw`
    /// keeps the original spelling for literal passthrough when no capture
    /// row is in scope.
    Backreference { index: usize, raw: String },
    /// `@put:{name:value}` — variable-store write. `value` is itself a
    /// rule, evaluated against the current content before storing.
    VariableAssign { name: String, value: String },
}

/// Trailing `##pattern##replacement##...` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceSpec {
    pub pattern: String,
    pub replacement: String,
    pub first_only: bool,
}

/// A fully compiled alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledExpression {
    /// The alternative exactly as written.
    pub raw: String,
    pub mode: SelectorMode,
    /// `@CSS:` form — the body is one raw CSS selector up to the last `@`,
    /// then one extraction stage.
    pub raw_css: bool,
    pub tokens: Vec<RuleToken>,
    pub replace: Option<ReplaceSpec>,
}

/// A compile failure for one alternative. Kept as plain data so compiled
/// rules stay cheap to clone and cache; [`CompiledRule::first_error`]
/// rehydrates it into an [`AugerError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFailure {
    pub offset: usize,
    pub detail: String,
}

/// A whole rule: combinator mode plus per-alternative compile results.
///
/// Compilation is deliberately lenient at this level: a broken alternative
/// is recorded, not propagated, so its siblings still evaluate. Strict
/// surfaces (`Engine::compile`, the CLI `check` command) call
/// [`CompiledRule::first_error`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub raw: String,
    pub combinator: CombinatorMode,
    pub alternatives: Vec<Result<CompiledExpression, CompileFailure>>,
}

impl CompiledRule {
    pub fn first_error(&self) -> Option<AugerError> {
        self.alternatives.iter().find_map(|alt| match alt {
            Err(f) => Some(AugerError::syntax(f.offset, f.detail.clone())),
            Ok(_) => None,
        })
    }
}

/// Compile a raw rule string: split on its combinator, then compile each
/// alternative independently.
pub fn compile_rule(raw: &str) -> CompiledRule {
    let (combinator, parts) = split_rule(raw);
    let alternatives = parts
        .into_iter()
        .map(|part| {
            compile_expression(part).map_err(|e| match e {
                AugerError::Syntax { offset, detail } => CompileFailure { offset, detail },
                other => CompileFailure {
                    offset: 0,
                    detail: other.to_string(),
                },
            })
        })
        .collect();
    CompiledRule {
        raw: raw.to_string(),
        combinator,
        alternatives,
    }
}

/// Compile one alternative.
pub fn compile_expression(alt: &str) -> AugerResult<CompiledExpression> {
    let body = alt.trim();

    let (mode, raw_css, body) = detect_mode(body);

    // Variable writes come out first; their values are nested rules and
    // may contain any syntax, so they must not confuse the later passes.
    let (body, assigns) = extract_assigns(&body)?;

    // Trailing replacement. Regex and script bodies keep their `##`
    // sequences verbatim.
    let (selector, replace) = match mode {
        SelectorMode::Regex | SelectorMode::Script => (body.as_str(), None),
        _ => split_replace_suffix(&body),
    };

    if matches!(
        mode,
        SelectorMode::Markup | SelectorMode::XPathLike | SelectorMode::JsonPathLike
    ) {
        scan::validate_balanced(selector)?;
    }

    let mut tokens = Vec::new();
    for (name, value) in assigns {
        tokens.push(RuleToken::VariableAssign { name, value });
    }
    tokenize_body(selector, &mut tokens)?;

    Ok(CompiledExpression {
        raw: alt.to_string(),
        mode,
        raw_css,
        tokens,
        replace,
    })
}

impl CompiledExpression {
    /// Rebuild a rule string semantically equivalent to the one this
    /// expression was compiled from. Useful for diagnostics and for
    /// persisting normalized rules.
    pub fn reconstruct(&self) -> String {
        let mut body = String::new();
        let mut assigns = String::new();
        for token in &self.tokens {
            match token {
                RuleToken::Literal { text } => body.push_str(text),
                RuleToken::ScriptBlock { script } => {
                    body.push_str("{{");
                    body.push_str(script);
                    body.push_str("}}");
                }
                RuleToken::VariableRef { name } => {
                    body.push_str("@get:{");
                    body.push_str(name);
                    body.push('}');
                }
                RuleToken::Backreference { raw, .. } => body.push_str(raw),
                RuleToken::VariableAssign { name, value } => {
                    assigns.push_str("@put:{");
                    assigns.push_str(name);
                    assigns.push(':');
                    assigns.push_str(value);
                    assigns.push('}');
                }
            }
        }
        let prefix = match self.mode {
            SelectorMode::Markup if self.raw_css => "@CSS:",
            SelectorMode::Markup => {
                // A literal markup body that would re-trigger another mode
                // heuristic needs the explicit `@@` guard.
                if body.starts_with('/')
                    || body.starts_with("$.")
                    || body.starts_with("$[")
                    || body.starts_with(':')
                    || body.starts_with('@')
                {
                    "@@"
                } else {
                    ""
                }
            }
            SelectorMode::Script => "@js:",
            SelectorMode::Regex => ":",
            // The shorthand lead re-detects on its own; a prefixed body
            // that lacks it needs its explicit marker back.
            SelectorMode::XPathLike => {
                if body.starts_with('/') {
                    ""
                } else {
                    "@XPath:"
                }
            }
            SelectorMode::JsonPathLike => {
                if body.starts_with("$.") || body.starts_with("$[") {
                    ""
                } else {
                    "@Json:"
                }
            }
        };
        let mut out = String::new();
        out.push_str(prefix);
        out.push_str(&assigns);
        out.push_str(&body);
        if let Some(rep) = &self.replace {
            out.push_str("##");
            out.push_str(&rep.pattern);
            out.push_str("##");
            out.push_str(&rep.replacement);
            if rep.first_only {
                out.push_str("##1");
            }
        }
        out
    }
}

// ── Mode detection ──

fn detect_mode(body: &str) -> (SelectorMode, bool, String) {
    if starts_with_ci(body, "@css:") {
        return (SelectorMode::Markup, true, body[5..].to_string());
    }
    if let Some(rest) = body.strip_prefix("@@") {
        return (SelectorMode::Markup, false, rest.to_string());
    }
    if starts_with_ci(body, "@xpath:") {
        return (SelectorMode::XPathLike, false, body[7..].to_string());
    }
    if starts_with_ci(body, "@json:") {
        return (SelectorMode::JsonPathLike, false, body[6..].to_string());
    }
    if starts_with_ci(body, "@js:") {
        return (SelectorMode::Script, false, body[4..].to_string());
    }
    if starts_with_ci(body, "<js>") && body.len() >= 9 && ends_with_ci(body, "</js>") {
        return (
            SelectorMode::Script,
            false,
            body[4..body.len() - 5].to_string(),
        );
    }
    if let Some(rest) = body.strip_prefix(':') {
        return (SelectorMode::Regex, false, rest.to_string());
    }
    if body.starts_with('/') {
        return (SelectorMode::XPathLike, false, body.to_string());
    }
    if body.starts_with("$.") || body.starts_with("$[") {
        return (SelectorMode::JsonPathLike, false, body.to_string());
    }
    (SelectorMode::Markup, false, body.to_string())
}

fn ends_with_ci(s: &str, suffix: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= suffix.len()
        && bytes[bytes.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

/// Case-insensitive marker test at a byte cursor. The cursor may sit in
/// the middle of a multi-byte character; a `&str` slice there would panic.
fn marker_at(bytes: &[u8], at: usize, marker: &[u8]) -> bool {
    bytes
        .get(at..at + marker.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(marker))
}

// ── @put extraction ──

fn extract_assigns(body: &str) -> AugerResult<(String, Vec<(String, String)>)> {
    let bytes = body.as_bytes();
    let mut out = String::with_capacity(body.len());
    let mut assigns = Vec::new();
    let mut seg = 0;
    let mut i = 0;
    while i < bytes.len() {
        // Script blocks pass through whole so code mentioning "@put:"
        // is not eaten.
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            if let Ok(end) = scan::skip_block(body, i) {
                i = end;
                continue;
            }
        }
        if marker_at(bytes, i, b"@put:") && bytes.get(i + 5) == Some(&b'{') {
            let end = scan::consume_balanced(body, b'{', b'}', i + 5, EscapePolicy::Rule)?;
            out.push_str(&body[seg..i]);
            parse_assign_pairs(&body[i + 6..end - 1], &mut assigns);
            i = end;
            seg = i;
            continue;
        }
        i += 1;
    }
    out.push_str(&body[seg..]);
    Ok((out, assigns))
}

/// Interior of a `@put:{...}` block: comma-separated `name:value` pairs,
/// where each value is a rule. Commas inside brackets or script blocks
/// belong to the value; the first top-level colon splits name from value
/// (so regex values keep their leading `:`). Quoted names or values drop
/// their quotes. Malformed pairs are skipped.
fn parse_assign_pairs(interior: &str, out: &mut Vec<(String, String)>) {
    let mut start = 0;
    let mut cuts = Vec::new();
    let mut from = 0;
    while let Some((pos, _)) = scan::find_top_level(interior, &[","], from) {
        cuts.push(pos);
        from = pos + 1;
    }
    cuts.push(interior.len());
    for cut in cuts {
        let pair = &interior[start..cut];
        start = cut + 1;
        let Some(colon) = scan::find_unescaped(pair, ":", 0, EscapePolicy::Rule) else {
            continue;
        };
        let name = strip_quotes(pair[..colon].trim());
        let value = strip_quotes(pair[colon + 1..].trim());
        if !name.is_empty() {
            out.push((name.to_string(), value.to_string()));
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    let b = s.as_bytes();
    if b.len() >= 2 && (b[0] == b'"' || b[0] == b'\'') && b[b.len() - 1] == b[0] {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

// ── Replace suffix ──

fn split_replace_suffix(body: &str) -> (&str, Option<ReplaceSpec>) {
    let Some(first) = scan::find_outside_blocks(body, "##", 0) else {
        return (body, None);
    };
    let selector = &body[..first];
    let rest = &body[first + 2..];
    let (pattern, rest) = match scan::find_outside_blocks(rest, "##", 0) {
        Some(p) => (&rest[..p], &rest[p + 2..]),
        None => (rest, ""),
    };
    let (replacement, first_only) = match scan::find_outside_blocks(rest, "##", 0) {
        Some(p) => (&rest[..p], true),
        None => (rest, false),
    };
    (
        selector,
        Some(ReplaceSpec {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            first_only,
        }),
    )
}

// ── Token scan ──

fn tokenize_body(selector: &str, tokens: &mut Vec<RuleToken>) -> AugerResult<()> {
    let bytes = selector.as_bytes();
    let mut seg = 0;
    let mut i = 0;
    let mut push_literal = |tokens: &mut Vec<RuleToken>, from: usize, to: usize| {
        if from < to {
            tokens.push(RuleToken::Literal {
                text: selector[from..to].to_string(),
            });
        }
    };
    while i < bytes.len() {
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            let end = scan::skip_block(selector, i)?;
            push_literal(tokens, seg, i);
            tokens.push(RuleToken::ScriptBlock {
                script: selector[i + 2..end - 2].to_string(),
            });
            i = end;
            seg = i;
            continue;
        }
        if marker_at(bytes, i, b"@get:") && bytes.get(i + 5) == Some(&b'{') {
            let end = scan::consume_balanced(selector, b'{', b'}', i + 5, EscapePolicy::Rule)?;
            push_literal(tokens, seg, i);
            tokens.push(RuleToken::VariableRef {
                name: selector[i + 6..end - 1].trim().to_string(),
            });
            i = end;
            seg = i;
            continue;
        }
        if bytes[i] == b'$' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
            let mut end = i + 2;
            if bytes.get(end).is_some_and(|b| b.is_ascii_digit()) {
                end += 1;
            }
            push_literal(tokens, seg, i);
            let raw = &selector[i..end];
            tokens.push(RuleToken::Backreference {
                index: raw[1..].parse().unwrap_or(0),
                raw: raw.to_string(),
            });
            i = end;
            seg = i;
            continue;
        }
        i += 1;
    }
    push_literal(tokens, seg, bytes.len());
    Ok(())
}
