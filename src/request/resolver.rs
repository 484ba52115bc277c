//! Request Template Resolver — turns a templated URL string into a
//! concrete [`RequestDescriptor`].
//!
//! Resolution order: script segments (`<js>...</js>` / `@js:...`) with
//! `@result` chaining, then the pagination placeholder `<e1,e2,...>`, then
//! `{{script}}` substitution, then the trailing `,{...}` options block.
//! Running scripts first is what keeps `<js>` from ever being read as a
//! pagination placeholder.

use tracing::warn;

use crate::engine::{Engine, ExecutionContext};
use crate::rule::executor::{render_scalar, resolve_url, run_script};
use crate::scan::{self, EscapePolicy};

use super::options::{parse_options, BodyKind, RequestOptions};
use super::{HttpMethod, RequestDescriptor};

/// Never fails: a malformed options block logs a warning and degrades to a
/// bare GET of the URL part. Script failures log and contribute nothing.
pub fn resolve_request(
    engine: &Engine,
    ctx: &ExecutionContext,
    template: &str,
) -> RequestDescriptor {
    let mut work = run_script_segments(engine, ctx, template.trim());
    if let Some(page) = ctx.page {
        work = substitute_page(&work, page);
    }
    work = substitute_mustache(engine, ctx, &work);

    let (url_part, options_block) = split_options(&work);
    let mut desc = RequestDescriptor {
        final_url: resolve_url(ctx.active_base(), url_part.trim()),
        ..RequestDescriptor::default()
    };

    // Cookie decoration happens before the options block so an explicit
    // template header wins.
    if let Some(domain) = url::Url::parse(&desc.final_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
    {
        if let Some(cookie) = engine.cookies().get(&domain) {
            desc.set_header("Cookie", cookie);
        }
    }

    if let Some(block) = options_block {
        match parse_options(block) {
            Ok(options) => apply_options(&mut desc, options),
            Err(err) => warn!(
                "options block in '{}' did not parse, using bare url: {}",
                template, err
            ),
        }
    }

    if desc.method == HttpMethod::Get {
        if let Some((path, query)) = desc.final_url.split_once('?') {
            let encoded = encode_query(query);
            desc.final_url = format!("{path}?{encoded}");
            desc.encoded_query = Some(encoded);
        }
    }

    desc
}

fn apply_options(desc: &mut RequestDescriptor, options: RequestOptions) {
    if let Some(method) = &options.method {
        desc.method = HttpMethod::parse(method);
    }
    desc.charset = options.charset.clone();
    desc.retry_count = options.retry_count();
    desc.use_browser_render = options.use_browser();
    desc.web_script = options.web_script();
    desc.delay_ms = options.web_view_delay_time.unwrap_or(0);
    desc.server_id = options.server_id;
    if let Some(t) = &options.content_type {
        desc.set_header("Content-Type", t.clone());
    }
    for (key, value) in options.header_pairs() {
        desc.set_header(&key, value);
    }
    match options.body_kind() {
        Some(BodyKind::Raw(body)) => desc.raw_body = Some(body),
        Some(BodyKind::Form(body)) => desc.encoded_form = Some(body),
        None => {}
    }
}

// ── Script segments ──

/// Consumes `<js>...</js>` and `@js:...` segments left to right. Literal
/// text between segments becomes the new running result, with `@result`
/// splicing in the previous one; each script runs with `result` bound to
/// the running value. `@js:` always extends to the end of the template.
/// The running value starts empty, so a failing script leaves whatever the
/// literals have built, never the raw segment markup.
fn run_script_segments(engine: &Engine, ctx: &ExecutionContext, template: &str) -> String {
    let segments = find_script_segments(template);
    if segments.is_empty() {
        return template.to_string();
    }
    let mut result = String::new();
    let mut cursor = 0;
    for (start, end, script) in &segments {
        if *start > cursor {
            let literal = template[cursor..*start].trim();
            if !literal.is_empty() {
                result = literal.replace("@result", &result);
            }
        }
        match run_script(engine, ctx, &result, script) {
            Ok(value) => result = render_scalar(&value),
            Err(err) => warn!("template script failed, segment skipped: {}", err),
        }
        cursor = *end;
    }
    if template.len() > cursor {
        let literal = template[cursor..].trim();
        if !literal.is_empty() {
            result = literal.replace("@result", &result);
        }
    }
    result
}

/// `(start, end, script)` for each segment, in order. Case-insensitive on
/// the markers. An unterminated `<js>` ends the scan; the rest of the
/// template stays literal.
fn find_script_segments(s: &str) -> Vec<(usize, usize, String)> {
    let lower = s.to_ascii_lowercase();
    let mut segments = Vec::new();
    let mut i = 0;
    while i < lower.len() {
        let open = lower[i..].find("<js>").map(|o| i + o);
        let inline = lower[i..].find("@js:").map(|o| i + o);
        match (open, inline) {
            (Some(o), a) if a.map_or(true, |a| o < a) => {
                match lower[o + 4..].find("</js>") {
                    Some(c) => {
                        let close = o + 4 + c;
                        segments.push((o, close + 5, s[o + 4..close].to_string()));
                        i = close + 5;
                    }
                    None => break,
                }
            }
            (_, Some(a)) => {
                segments.push((a, s.len(), s[a + 4..].to_string()));
                break;
            }
            _ => break,
        }
    }
    segments
}

// ── Placeholders ──

/// `<e1,e2,e3>` picks the 1-based `page` entry, clamped to the last one.
fn substitute_page(work: &str, page: i64) -> String {
    let mut out = String::with_capacity(work.len());
    let mut rest = work;
    while let Some(open) = rest.find('<') {
        match rest[open..].find('>') {
            Some(off) => {
                let close = open + off;
                out.push_str(&rest[..open]);
                let entries: Vec<&str> = rest[open + 1..close].split(',').map(str::trim).collect();
                let idx = ((page - 1).max(0) as usize).min(entries.len() - 1);
                out.push_str(entries[idx]);
                rest = &rest[close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

fn substitute_mustache(engine: &Engine, ctx: &ExecutionContext, work: &str) -> String {
    let mut out = String::with_capacity(work.len());
    let mut i = 0;
    while let Some(open) = work[i..].find("{{").map(|o| i + o) {
        out.push_str(&work[i..open]);
        match scan::skip_block(work, open) {
            Ok(end) => {
                let script = &work[open + 2..end - 2];
                match run_script(engine, ctx, work, script) {
                    Ok(value) => out.push_str(&render_scalar(&value)),
                    Err(err) => warn!("template substitution failed: {}", err),
                }
                i = end;
            }
            Err(_) => {
                // Unterminated block: keep the rest literal.
                out.push_str(&work[open..]);
                return out;
            }
        }
    }
    out.push_str(&work[i..]);
    out
}

// ── Options split and query encoding ──

/// Splits at the first `,` whose next non-space character is `{`.
fn split_options(work: &str) -> (&str, Option<&str>) {
    let mut from = 0;
    while let Some(pos) = scan::find_unescaped(work, ",", from, EscapePolicy::Rule) {
        let after = work[pos + 1..].trim_start();
        if after.starts_with('{') {
            return (&work[..pos], Some(after));
        }
        from = pos + 1;
    }
    (work, None)
}

/// Percent-encodes query values that are not already encoded. Keys and
/// pre-encoded values pass through untouched.
fn encode_query(query: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some((key, value)) if !looks_encoded(value) => {
                let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
                parts.push(format!("{key}={encoded}"));
            }
            _ => parts.push(pair.to_string()),
        }
    }
    parts.join("&")
}

fn looks_encoded(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes
        .windows(3)
        .any(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
}
