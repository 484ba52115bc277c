//! Request-template resolution over the public surface: options blocks,
//! pagination placeholders, script segments, cookie decoration, and the
//! serialized descriptor shape a fetch layer consumes.

use std::sync::Arc;

use assert_json_diff::assert_json_include;
use serde_json::{json, Value};

use auger::request::resolve_request;
use auger::{
    AugerError, AugerResult, CookieStore, Engine, ExecutionContext, HttpMethod, ScriptBindings,
    ScriptEvaluator,
};

struct PathEval;
impl ScriptEvaluator for PathEval {
    fn evaluate(&self, script: &str, b: &ScriptBindings<'_>) -> AugerResult<Value> {
        match script.trim() {
            "'v2'" => Ok(json!("v2")),
            "result + '.json'" => Ok(json!(format!("{}.json", b.result))),
            "encodeURI(key)" => Ok(json!("rust lang")),
            other => Err(AugerError::Script(format!("no binding for '{other}'"))),
        }
    }
}

#[test]
fn test_post_template_property() {
    let engine = Engine::new();
    let ctx = ExecutionContext::new("https://reads.example/");
    let desc = resolve_request(
        &engine,
        &ctx,
        r#"search,{"method":"post","body":"q=rust&p=1"}"#,
    );
    assert_eq!(desc.method, HttpMethod::Post);
    assert_eq!(desc.final_url, "https://reads.example/search");
    assert_eq!(desc.encoded_form.as_deref(), Some("q=rust&p=1"));
    assert!(desc.raw_body.is_none());
    // POST leaves the url query alone even when one is present.
    let desc = resolve_request(
        &engine,
        &ctx,
        r#"search?kind=book,{"method":"POST","body":"q=a b"}"#,
    );
    assert_eq!(desc.final_url, "https://reads.example/search?kind=book");
    assert!(desc.encoded_query.is_none());
}

#[test]
fn test_pagination_property() {
    let engine = Engine::new();
    let base = "https://reads.example/";
    // Entries are offsets here, not page numbers; the resolver only
    // indexes, it never interprets the values.
    let ctx = ExecutionContext::new(base).with_page(2);
    let desc = resolve_request(&engine, &ctx, "list?offset=<0, 20, 40>");
    assert_eq!(desc.final_url, "https://reads.example/list?offset=20");

    let ctx = ExecutionContext::new(base).with_page(9);
    let desc = resolve_request(&engine, &ctx, "list?offset=<0, 20, 40>");
    assert_eq!(desc.final_url, "https://reads.example/list?offset=40");
}

#[test]
fn test_search_flow_with_script_and_page() {
    let engine = Engine::new().with_evaluator(Arc::new(PathEval));
    let ctx = ExecutionContext::new("https://reads.example/").with_page(2);
    let desc = resolve_request(&engine, &ctx, "search.php?q={{encodeURI(key)}}&p=<1,2,3>");
    assert_eq!(
        desc.final_url,
        "https://reads.example/search.php?q=rust%20lang&p=2"
    );
    assert_eq!(desc.encoded_query.as_deref(), Some("q=rust%20lang&p=2"));
    assert_eq!(desc.method, HttpMethod::Get);
}

#[test]
fn test_chained_script_segments() {
    let engine = Engine::new().with_evaluator(Arc::new(PathEval));
    let ctx = ExecutionContext::new("https://reads.example/");
    let desc = resolve_request(
        &engine,
        &ctx,
        "<js>'v2'</js>api/@result/list<js>result + '.json'</js>",
    );
    assert_eq!(desc.final_url, "https://reads.example/api/v2/list.json");
}

#[test]
fn test_cookie_decoration_with_template_override() {
    struct Jar;
    impl CookieStore for Jar {
        fn get(&self, domain: &str) -> Option<String> {
            (domain == "reads.example").then(|| "sid=abc".to_string())
        }
    }
    let engine = Engine::new().with_cookies(Arc::new(Jar));
    let ctx = ExecutionContext::new("https://reads.example/");

    let desc = resolve_request(&engine, &ctx, "shelf");
    assert_eq!(desc.header("Cookie"), Some("sid=abc"));

    let desc = resolve_request(
        &engine,
        &ctx,
        r#"shelf,{"headers":{"Cookie":"sid=override","User-Agent":"auger"}}"#,
    );
    assert_eq!(desc.header("Cookie"), Some("sid=override"));
    // Lookup is case-insensitive.
    assert_eq!(desc.header("user-agent"), Some("auger"));
}

#[test]
fn test_descriptor_serialization_shape() {
    let engine = Engine::new();
    let ctx = ExecutionContext::new("https://reads.example/");
    let desc = resolve_request(
        &engine,
        &ctx,
        r#"api/search,{"method":"POST","charset":"utf-8","retry":2,
            "headers":{"Referer":"https://reads.example/"},"body":"{\"q\":\"rust\"}"}"#,
    );
    let value = serde_json::to_value(&desc).unwrap();
    assert_json_include!(
        actual: value,
        expected: json!({
            "final_url": "https://reads.example/api/search",
            "method": "POST",
            "charset": "utf-8",
            "retry_count": 2,
            "raw_body": "{\"q\":\"rust\"}",
        })
    );
}

#[test]
fn test_browser_render_options() {
    let engine = Engine::new();
    let ctx = ExecutionContext::new("https://reads.example/");
    let desc = resolve_request(
        &engine,
        &ctx,
        r#"spa/,{"webView":true,"webJs":"document.title","webViewDelayTime":500}"#,
    );
    assert!(desc.use_browser_render);
    assert_eq!(desc.web_script.as_deref(), Some("document.title"));
    assert_eq!(desc.delay_ms, 500);
}
