//! XPath-subset backend — path expressions translated to CSS.
//!
//! The supported subset covers the expressions rule authors actually
//! write: `//div`, `//div/a` (child), `//div//a` (descendant), `//*`,
//! predicates `[n]`, `[last()]`, `[@attr]`, `[@attr='v']`,
//! `[contains(@class,'v')]`, `[position()>n]`, relative `.//a`, and a
//! trailing `/@attr` or `/text()` extraction. Everything translates to one
//! CSS selector plus an optional position filter and is served by the
//! markup machinery; an expression that leaves untranslatable residue
//! fails selector parsing and comes back as an evaluation error.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::backend::markup::{element_text, extract_from};
use crate::error::{AugerError, AugerResult};

#[derive(Debug, Clone, PartialEq)]
enum Extract {
    Text,
    Attr(String),
}

#[derive(Debug, Clone)]
struct Translated {
    css: String,
    skip: Option<usize>,
    extract: Extract,
}

struct Patterns {
    trailing_attr: Regex,
    position_gt: Regex,
    class_attr: Regex,
    id_attr: Regex,
    contains_attr: Regex,
    generic_attr: Regex,
    has_attr: Regex,
    position_index: Regex,
    last: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let make = |p: &str| Regex::new(p).expect("predicate pattern is valid");
        Patterns {
            trailing_attr: make(r"/@([A-Za-z_][A-Za-z0-9_-]*)$"),
            position_gt: make(r"\[position\s*\(\s*\)\s*>\s*(\d+)\]"),
            class_attr: make(r#"\[@class=['"]([^'"]+)['"]\]"#),
            id_attr: make(r#"\[@id=['"]([^'"]+)['"]\]"#),
            contains_attr: make(
                r#"\[contains\s*\(\s*@([A-Za-z_][A-Za-z0-9_-]*)\s*,\s*['"]([^'"]+)['"]\s*\)\]"#,
            ),
            generic_attr: make(r#"\[@([A-Za-z_][A-Za-z0-9_-]*)=['"]([^'"]+)['"]\]"#),
            has_attr: make(r"\[@([A-Za-z_][A-Za-z0-9_-]*)\]"),
            position_index: make(r"\[(\d+)\]"),
            last: make(r"\[last\s*\(\s*\)\]"),
        }
    })
}

pub fn extract_strings(html: &str, body: &str) -> AugerResult<Vec<String>> {
    let translated = translate(body)?;
    let doc = Html::parse_document(html);
    let sel = parse_selector(&translated)?;
    let mut out = Vec::new();
    for el in doc.select(&sel).skip(translated.skip.unwrap_or(0)) {
        match &translated.extract {
            Extract::Attr(name) => out.extend(extract_from(&[el], name)),
            Extract::Text => out.push(element_text(&el)),
        }
    }
    Ok(out)
}

pub fn extract_fragments(html: &str, body: &str) -> AugerResult<Vec<String>> {
    let translated = translate(body)?;
    let doc = Html::parse_document(html);
    let sel = parse_selector(&translated)?;
    Ok(doc
        .select(&sel)
        .skip(translated.skip.unwrap_or(0))
        .map(|el| el.html())
        .collect())
}

fn parse_selector(t: &Translated) -> AugerResult<Selector> {
    Selector::parse(&t.css)
        .map_err(|_| AugerError::Selector(format!("untranslatable path expression '{}'", t.css)))
}

fn translate(xpath: &str) -> AugerResult<Translated> {
    let mut path = xpath.trim().to_string();
    if path.is_empty() {
        return Err(AugerError::Selector("empty path expression".into()));
    }

    // Text is also the default: a path without an explicit extraction
    // yields the matched elements' text content.
    let mut extract = Extract::Text;
    if let Some(stripped) = path.strip_suffix("/text()") {
        path = stripped.to_string();
    } else if let Some(caps) = patterns().trailing_attr.captures(&path) {
        extract = Extract::Attr(caps[1].to_string());
        let cut = caps.get(0).map(|m| m.start()).unwrap_or(path.len());
        path.truncate(cut);
    }

    if let Some(stripped) = path.strip_prefix(".//") {
        path = stripped.to_string();
    } else if let Some(stripped) = path.strip_prefix("//") {
        path = stripped.to_string();
    } else if let Some(stripped) = path.strip_prefix("./") {
        path = stripped.to_string();
    } else if let Some(stripped) = path.strip_prefix('/') {
        path = stripped.to_string();
    }

    let mut skip = None;
    if let Some(caps) = patterns().position_gt.captures(&path) {
        skip = caps[1].parse::<usize>().ok();
        path = patterns().position_gt.replace_all(&path, "").to_string();
    }

    let mut css_parts = Vec::new();
    for segment in split_segments(&path) {
        css_parts.push(convert_segment(&segment));
    }
    Ok(Translated {
        css: css_parts.join(" "),
        skip,
        extract,
    })
}

struct PathSegment {
    element: String,
    descendant: bool,
}

/// Split the remaining path on `/`, treating `//` as the descendant axis.
/// Slashes inside predicate brackets belong to the predicate.
fn split_segments(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut descendant = true;
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '/' if depth == 0 => {
                if !current.is_empty() {
                    segments.push(PathSegment {
                        element: std::mem::take(&mut current),
                        descendant,
                    });
                }
                descendant = chars.peek() == Some(&'/');
                if descendant {
                    chars.next();
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(PathSegment {
            element: current,
            descendant,
        });
    }
    segments
}

fn convert_segment(segment: &PathSegment) -> String {
    let p = patterns();
    let mut element = segment.element.clone();
    let combinator = if segment.descendant { "" } else { "> " };

    // A wildcard with a predicate drops the `*` (the predicate alone
    // selects); a bare `*` is already the CSS universal selector.
    if element.starts_with("*[") {
        element = element.replacen('*', "", 1);
    }

    let element = p
        .class_attr
        .replace_all(&element, |caps: &regex::Captures| {
            caps[1]
                .split_whitespace()
                .map(|c| format!(".{c}"))
                .collect::<String>()
        })
        .to_string();
    let element = p
        .id_attr
        .replace_all(&element, |caps: &regex::Captures| format!("#{}", &caps[1]))
        .to_string();
    let element = p
        .contains_attr
        .replace_all(&element, |caps: &regex::Captures| {
            format!("[{}*=\"{}\"]", &caps[1], &caps[2])
        })
        .to_string();
    let element = p
        .generic_attr
        .replace_all(&element, |caps: &regex::Captures| {
            format!("[{}=\"{}\"]", &caps[1], &caps[2])
        })
        .to_string();
    let element = p
        .has_attr
        .replace_all(&element, |caps: &regex::Captures| format!("[{}]", &caps[1]))
        .to_string();
    let element = p.last.replace_all(&element, ":last-of-type").to_string();
    let element = p
        .position_index
        .replace_all(&element, |caps: &regex::Captures| {
            format!(":nth-of-type({})", &caps[1])
        })
        .to_string();

    // A segment reduced to bare selectors (wildcard element) needs no
    // combinator prefix of its own.
    if element.starts_with('[')
        || element.starts_with('#')
        || element.starts_with('.')
        || element.starts_with(':')
    {
        element
    } else {
        format!("{combinator}{element}").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div id="main" class="wrap outer">
            <ul class="list">
              <li><a href="/1">First</a></li>
              <li><a href="/2">Second</a></li>
              <li><a href="/3">Third</a></li>
            </ul>
            <p lang="en">hello</p>
          </div>
        </body></html>"#;

    #[test]
    fn test_translate_axes() {
        assert_eq!(translate("//div/a").unwrap().css, "div > a");
        assert_eq!(translate("//div//a").unwrap().css, "div a");
        assert_eq!(translate(".//a").unwrap().css, "a");
    }

    #[test]
    fn test_translate_wildcards() {
        assert_eq!(translate("//ul/*").unwrap().css, "ul > *");
        assert_eq!(translate("//*[@id='main']").unwrap().css, "#main");
    }

    #[test]
    fn test_translate_predicates() {
        assert_eq!(
            translate("//div[@class='item']/a[2]").unwrap().css,
            "div.item > a:nth-of-type(2)"
        );
        assert_eq!(
            translate("//ul[contains(@class,'lis')]").unwrap().css,
            "ul[class*=\"lis\"]"
        );
        assert_eq!(translate("//a[@href]").unwrap().css, "a[href]");
        assert_eq!(translate("//li[last()]").unwrap().css, "li:last-of-type");
    }

    #[test]
    fn test_translate_extraction() {
        let t = translate("//h3/a/text()").unwrap();
        assert_eq!(t.css, "h3 > a");
        assert_eq!(t.extract, Extract::Text);

        let t = translate("//li/a/@href").unwrap();
        assert_eq!(t.css, "li > a");
        assert_eq!(t.extract, Extract::Attr("href".into()));
    }

    #[test]
    fn test_translate_position_filter() {
        let t = translate("//li[position()>1]").unwrap();
        assert_eq!(t.css, "li");
        assert_eq!(t.skip, Some(1));
    }

    #[test]
    fn test_extract_attrs() {
        let out = extract_strings(PAGE, "//ul/li/a/@href").unwrap();
        assert_eq!(out, vec!["/1", "/2", "/3"]);
    }

    #[test]
    fn test_extract_text() {
        let out = extract_strings(PAGE, "//li[1]/a/text()").unwrap();
        assert_eq!(out, vec!["First"]);
    }

    #[test]
    fn test_extract_with_position_skip() {
        let out = extract_strings(PAGE, "//li[position()>1]/a/text()").unwrap();
        assert_eq!(out, vec!["Second", "Third"]);
    }

    #[test]
    fn test_default_extraction_is_text() {
        let out = extract_strings(PAGE, "//p").unwrap();
        assert_eq!(out, vec!["hello"]);
    }

    #[test]
    fn test_unsupported_expression_is_an_error() {
        assert!(extract_strings(PAGE, "//li[text()='First']").is_err());
    }

    #[test]
    fn test_fragments() {
        let frags = extract_fragments(PAGE, "//ul/li").unwrap();
        assert_eq!(frags.len(), 3);
        assert!(frags[1].contains("/2"));
    }
}
