//! Markup backend — `@`-staged drill-down over HTML.
//!
//! A body like `div.book@tag.a.0@href` navigates stage by stage: every
//! stage before the last narrows the element set, the last stage extracts
//! strings. Stages understand a small micro-syntax (`children`,
//! `class.NAME`, `tag.NAME`, `id.NAME`, `text.NEEDLE`) and fall back to
//! raw CSS for anything else; any stage may carry a trailing index bracket.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AugerError, AugerResult};
use crate::rule::index::split_trailing_index;
use crate::scan;

fn script_style_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<script[^>]*>.*?</script\s*>|<style[^>]*>.*?</style\s*>")
            .expect("script/style strip pattern is valid")
    })
}

/// Evaluate a staged body for strings: navigate all but the last stage,
/// extract with the last. A single-stage body is an extraction applied to
/// the document root.
pub fn extract_strings(html: &str, body: &str, raw_css: bool) -> AugerResult<Vec<String>> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    if raw_css {
        let (css, directive) = split_raw_css(body);
        let elements = select_css(&[root], css.trim())?;
        return Ok(extract_from(&elements, directive));
    }
    let stages = split_stages(body);
    let (nav, last) = stages.split_at(stages.len() - 1);
    let mut current = vec![root];
    for stage in nav {
        current = apply_stage(&current, stage)?;
        if current.is_empty() {
            return Ok(Vec::new());
        }
    }
    Ok(extract_from(&current, last[0].trim()))
}

/// Evaluate a staged body for element fragments: every stage navigates,
/// each resulting element serializes to its outer HTML. Used when a rule
/// selects items for nested per-item extraction.
pub fn extract_fragments(html: &str, body: &str, raw_css: bool) -> AugerResult<Vec<String>> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    let elements = if raw_css {
        let (css, _) = split_raw_css(body);
        select_css(&[root], css.trim())?
    } else {
        let mut current = vec![root];
        for stage in split_stages(body) {
            current = apply_stage(&current, stage)?;
            if current.is_empty() {
                break;
            }
        }
        current
    };
    Ok(elements.iter().map(|el| el.html()).collect())
}

// ── Stage machinery ──

fn split_stages(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut cursor = 0;
    while let Some((pos, _)) = scan::find_top_level(body, &["@"], cursor) {
        parts.push(&body[cursor..pos]);
        cursor = pos + 1;
    }
    parts.push(&body[cursor..]);
    parts
}

/// `@CSS:` bodies hold one raw CSS selector up to the last `@`, then one
/// extraction directive. Without an `@` the whole body is the selector and
/// text extraction is implied.
fn split_raw_css(body: &str) -> (&str, &str) {
    let mut last = None;
    let mut cursor = 0;
    while let Some((pos, _)) = scan::find_top_level(body, &["@"], cursor) {
        last = Some(pos);
        cursor = pos + 1;
    }
    match last {
        Some(pos) => (&body[..pos], body[pos + 1..].trim()),
        None => (body, "text"),
    }
}

fn apply_stage<'a>(current: &[ElementRef<'a>], stage: &str) -> AugerResult<Vec<ElementRef<'a>>> {
    let stage = stage.trim();
    if stage.is_empty() {
        return Ok(current.to_vec());
    }
    let (stage, index) = split_trailing_index(stage);
    let stage = stage.trim();

    let matched: Vec<ElementRef<'a>> = if stage == "children" {
        current
            .iter()
            .flat_map(|el| el.children().filter_map(ElementRef::wrap))
            .collect()
    } else if let Some(rest) = stage.strip_prefix("class.") {
        let (name, pick) = split_micro_index(rest);
        pick_one(select_css(current, &format!("[class~=\"{name}\"]"))?, pick)
    } else if let Some(rest) = stage.strip_prefix("tag.") {
        let (name, pick) = split_micro_index(rest);
        pick_one(select_css(current, name)?, pick)
    } else if let Some(rest) = stage.strip_prefix("id.") {
        select_css(current, &format!("[id=\"{rest}\"]"))?
    } else if let Some(needle) = stage.strip_prefix("text.") {
        elements_with_own_text(current, needle)
    } else {
        select_css(current, stage)?
    };

    Ok(match index {
        Some(spec) => spec
            .apply(matched.len())
            .into_iter()
            .map(|p| matched[p])
            .collect(),
        None => matched,
    })
}

/// `class.NAME.N` and `tag.NAME.N` carry a single signed index after the
/// name. A final `.` segment that does not parse as an integer belongs to
/// the name.
fn split_micro_index(rest: &str) -> (&str, Option<i64>) {
    match rest.rfind('.') {
        Some(dot) => match rest[dot + 1..].parse::<i64>() {
            Ok(n) => (&rest[..dot], Some(n)),
            Err(_) => (rest, None),
        },
        None => (rest, None),
    }
}

fn pick_one(matched: Vec<ElementRef<'_>>, pick: Option<i64>) -> Vec<ElementRef<'_>> {
    let Some(n) = pick else {
        return matched;
    };
    let len = matched.len() as i64;
    let idx = if n < 0 { len + n } else { n };
    if idx >= 0 && idx < len {
        vec![matched[idx as usize]]
    } else {
        Vec::new()
    }
}

fn select_css<'a>(roots: &[ElementRef<'a>], css: &str) -> AugerResult<Vec<ElementRef<'a>>> {
    let sel = Selector::parse(css)
        .map_err(|_| AugerError::Selector(format!("invalid CSS selector '{css}'")))?;
    let mut out = Vec::new();
    for root in roots {
        for el in root.select(&sel) {
            out.push(el);
        }
    }
    Ok(out)
}

fn elements_with_own_text<'a>(roots: &[ElementRef<'a>], needle: &str) -> Vec<ElementRef<'a>> {
    let mut out = Vec::new();
    for root in roots {
        for node in root.descendants() {
            if let Some(el) = ElementRef::wrap(node) {
                if own_text(&el).contains(needle) {
                    out.push(el);
                }
            }
        }
    }
    out
}

// ── Extraction ──

pub(crate) fn extract_from(elements: &[ElementRef<'_>], directive: &str) -> Vec<String> {
    let mut out = Vec::new();
    for el in elements {
        match directive {
            "text" => out.push(element_text(el)),
            "textNodes" => out.push(text_nodes(el)),
            "ownText" => out.push(own_text(el)),
            "html" => out.push(strip_script_style(&el.inner_html())),
            "all" => out.push(el.html()),
            attr => {
                if let Some(val) = el.value().attr(attr) {
                    out.push(val.to_string());
                }
            }
        }
    }
    out
}

/// Collect all visible text content from an element, trimmed and
/// whitespace-collapsed.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Immediate text children only, whitespace-collapsed.
fn own_text(el: &ElementRef<'_>) -> String {
    el.children()
        .filter_map(|node| node.value().as_text().map(|t| t.trim().to_string()))
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Immediate text children as separate lines, empties dropped.
fn text_nodes(el: &ElementRef<'_>) -> String {
    el.children()
        .filter_map(|node| node.value().as_text())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_script_style(html: &str) -> String {
    script_style_pattern().replace_all(html, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="book list" id="shelf">
            <h2> The  Title </h2>
            <ul>
              <li class="item"><a href="/b/1">One</a></li>
              <li class="item"><a href="/b/2">Two</a></li>
              <li class="item hot"><a href="/b/3">Three</a></li>
            </ul>
            <p>intro <b>bold</b> tail</p>
            <script>var x = 1;</script>
          </div>
        </body></html>"#;

    fn strings(body: &str) -> Vec<String> {
        extract_strings(PAGE, body, false).unwrap()
    }

    #[test]
    fn test_staged_css_with_attr() {
        assert_eq!(strings("li.item@a@href"), vec!["/b/1", "/b/2", "/b/3"]);
    }

    #[test]
    fn test_text_extraction_collapses_whitespace() {
        assert_eq!(strings("h2@text"), vec!["The Title"]);
    }

    #[test]
    fn test_class_micro_syntax() {
        assert_eq!(strings("class.item@a@text"), vec!["One", "Two", "Three"]);
        assert_eq!(strings("class.item.1@a@text"), vec!["Two"]);
        assert_eq!(strings("class.item.-1@a@text"), vec!["Three"]);
    }

    #[test]
    fn test_tag_and_id_micro_syntax() {
        assert_eq!(strings("tag.li.0@a@text"), vec!["One"]);
        assert_eq!(strings("id.shelf@h2@text"), vec!["The Title"]);
    }

    #[test]
    fn test_text_micro_syntax() {
        assert_eq!(strings("text.intro@b@text"), vec!["bold"]);
    }

    #[test]
    fn test_children_stage() {
        // Direct children of <ul> are the three <li> items.
        assert_eq!(strings("ul@children@a@href").len(), 3);
    }

    #[test]
    fn test_index_filters_on_stage() {
        assert_eq!(strings("li.item[0,2]@a@text"), vec!["One", "Three"]);
        assert_eq!(strings("li.item[!0]@a@text"), vec!["Two", "Three"]);
        assert_eq!(strings("li.item[-1]@a@text"), vec!["Three"]);
    }

    #[test]
    fn test_own_text_and_text_nodes() {
        assert_eq!(strings("p@ownText"), vec!["intro tail"]);
        assert_eq!(strings("p@textNodes"), vec!["intro\ntail"]);
    }

    #[test]
    fn test_html_strips_scripts() {
        let out = strings("div.book@html");
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("<ul>"));
        assert!(!out[0].contains("<script>"));
    }

    #[test]
    fn test_all_keeps_outer_form() {
        let out = strings("h2@all");
        assert_eq!(out, vec!["<h2> The  Title </h2>"]);
    }

    #[test]
    fn test_single_stage_is_extraction_on_root() {
        assert!(strings("text")[0].contains("One"));
    }

    #[test]
    fn test_raw_css_body() {
        let out = extract_strings(PAGE, "ul > li.item a@text", true).unwrap();
        assert_eq!(out, vec!["One", "Two", "Three"]);
        let out = extract_strings(PAGE, "h2", true).unwrap();
        assert_eq!(out, vec!["The Title"]);
    }

    #[test]
    fn test_missing_elements_yield_empty() {
        assert!(strings(".absent@a@href").is_empty());
    }

    #[test]
    fn test_invalid_css_is_an_error() {
        assert!(extract_strings(PAGE, "li:::bad@text", false).is_err());
    }

    #[test]
    fn test_fragments_mode_serializes_elements() {
        let frags = extract_fragments(PAGE, "li.item", false).unwrap();
        assert_eq!(frags.len(), 3);
        assert!(frags[0].starts_with("<li"));
        assert!(frags[0].contains("/b/1"));
    }
}
