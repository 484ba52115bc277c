// Copyright 2026 Auger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Balanced scanner — bracket/quote-aware substring search.
//!
//! Single-pass byte scanning shared by the rule splitter, the rule compiler
//! and the request resolver. Every structural character (`[](){}'"\`) is
//! ASCII, so byte offsets reported here always fall on UTF-8 boundaries and
//! are safe to slice at.

use crate::error::{AugerError, AugerResult};

/// How backslashes are treated while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapePolicy {
    /// Script-block text: a backslash always escapes the next byte.
    Code,
    /// Selector text: a backslash only escapes inside quotes. Outside
    /// quotes it is an ordinary byte, so regex fragments like `\d` pass
    /// through untouched.
    Rule,
}

impl EscapePolicy {
    fn escapes(self, in_quote: bool) -> bool {
        match self {
            EscapePolicy::Code => true,
            EscapePolicy::Rule => in_quote,
        }
    }
}

/// Find the first occurrence of `needle` at or after `from` that sits
/// outside quotes and is not escaped under `policy`.
pub fn find_unescaped(s: &str, needle: &str, from: usize, policy: EscapePolicy) -> Option<usize> {
    let bytes = s.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() {
        return None;
    }
    let mut in_single = false;
    let mut in_double = false;
    let mut i = from;
    while i < bytes.len() {
        if !in_single && !in_double && bytes[i..].starts_with(n) {
            return Some(i);
        }
        let c = bytes[i];
        i += 1;
        if c == b'\\' && policy.escapes(in_single || in_double) {
            i += 1;
            continue;
        }
        if c == b'\'' && !in_double {
            in_single = !in_single;
        } else if c == b'"' && !in_single {
            in_double = !in_double;
        }
    }
    None
}

/// Consume a balanced bracket region. `from` must sit on the opening byte;
/// the returned position is one past the matching close.
///
/// Tracks an independent depth counter for the *other* bracket kind, so a
/// close appearing inside a nested region of the other kind (`[a(])]`) does
/// not terminate the scan early. Quotes suppress all structural
/// interpretation; backslashes follow `policy`.
pub fn consume_balanced(
    s: &str,
    open: u8,
    close: u8,
    from: usize,
    policy: EscapePolicy,
) -> AugerResult<usize> {
    let bytes = s.as_bytes();
    debug_assert_eq!(bytes.get(from).copied(), Some(open));
    let (other_open, other_close) = match (open, close) {
        (b'[', b']') => (b'(', b')'),
        (b'(', b')') => (b'[', b']'),
        _ => (0, 0),
    };
    let mut depth = 0usize;
    let mut other = 0usize;
    let mut in_single = false;
    let mut in_double = false;
    let mut i = from;
    loop {
        if i >= bytes.len() {
            return Err(AugerError::syntax(
                from,
                format!("no matching '{}' for '{}'", close as char, open as char),
            ));
        }
        let c = bytes[i];
        i += 1;
        if c == b'\\' && policy.escapes(in_single || in_double) {
            i += 1;
            continue;
        }
        if c == b'\'' && !in_double {
            in_single = !in_single;
            continue;
        }
        if c == b'"' && !in_single {
            in_double = !in_double;
            continue;
        }
        if in_single || in_double {
            continue;
        }
        if c == open {
            depth += 1;
        } else if c == close {
            if other == 0 {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
        } else if c == other_open && other_open != 0 {
            other += 1;
        } else if c == other_close && other > 0 {
            other -= 1;
        }
    }
}

/// True when `at` sits on the start of a skippable region: `[`, `(`, or a
/// two-byte `{{` script opener.
pub fn starts_block(s: &str, at: usize) -> bool {
    let bytes = s.as_bytes();
    match bytes.get(at) {
        Some(b'[') | Some(b'(') => true,
        Some(b'{') => bytes.get(at + 1) == Some(&b'{'),
        _ => false,
    }
}

/// Skip past the block starting at `from` (see [`starts_block`]). Bracket
/// regions scan with the rule policy; `{{...}}` script blocks scan braces
/// with the code policy, terminating once the brace depth opened by the
/// leading `{{` returns to zero.
pub fn skip_block(s: &str, from: usize) -> AugerResult<usize> {
    let bytes = s.as_bytes();
    match bytes.get(from) {
        Some(b'[') => consume_balanced(s, b'[', b']', from, EscapePolicy::Rule),
        Some(b'(') => consume_balanced(s, b'(', b')', from, EscapePolicy::Rule),
        Some(b'{') if bytes.get(from + 1) == Some(&b'{') => {
            consume_balanced(s, b'{', b'}', from, EscapePolicy::Code)
        }
        _ => Err(AugerError::syntax(from, "not at a block opener")),
    }
}

/// Find the first occurrence of `needle` at or after `from` that is not
/// inside a `{{...}}` script block. Quotes are not tracked at the top
/// level (rule text may contain lone apostrophes); an unbalanced script
/// opener is treated as inert text.
pub fn find_outside_blocks(s: &str, needle: &str, from: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() {
        return None;
    }
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            match skip_block(s, i) {
                Ok(end) => {
                    i = end;
                    continue;
                }
                Err(_) => {
                    i += 1;
                    continue;
                }
            }
        }
        if bytes[i..].starts_with(n) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Find the first occurrence of any of `needles` at the top nesting level:
/// outside `[...]` and `(...)` bracket regions and outside `{{...}}` script
/// blocks. Returns the position and the index of the needle that matched.
/// Unbalanced openers are treated as inert text so that a broken
/// alternative does not hide combinators that follow it.
pub fn find_top_level(s: &str, needles: &[&str], from: usize) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if starts_block(s, i) {
            match skip_block(s, i) {
                Ok(end) => {
                    i = end;
                    continue;
                }
                Err(_) => {
                    i += 1;
                    continue;
                }
            }
        }
        for (which, needle) in needles.iter().enumerate() {
            if !needle.is_empty() && bytes[i..].starts_with(needle.as_bytes()) {
                return Some((i, which));
            }
        }
        i += 1;
    }
    None
}

/// Verify that every `[`, `(` and `{{` opened at the top level of `s`
/// closes. Stray close characters are ignored (they are ordinary text for
/// most backends); only unclosed openers are an authoring error.
pub fn validate_balanced(s: &str) -> AugerResult<()> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if starts_block(s, i) {
            i = skip_block(s, i)?;
        } else {
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_balanced_nested() {
        let s = "[a[b]c]d";
        assert_eq!(consume_balanced(s, b'[', b']', 0, EscapePolicy::Rule).unwrap(), 7);
    }

    #[test]
    fn test_consume_balanced_other_kind_shields_close() {
        // The ']' inside the paren region must not close the outer bracket.
        let s = "[a(])]x";
        assert_eq!(consume_balanced(s, b'[', b']', 0, EscapePolicy::Rule).unwrap(), 6);
    }

    #[test]
    fn test_consume_balanced_quotes_suppress_structure() {
        let s = r#"[a="]"]x"#;
        assert_eq!(consume_balanced(s, b'[', b']', 0, EscapePolicy::Rule).unwrap(), 7);
    }

    #[test]
    fn test_consume_balanced_unbalanced_reports_start_offset() {
        let err = consume_balanced("ab[cd", b'[', b']', 2, EscapePolicy::Rule).unwrap_err();
        match err {
            AugerError::Syntax { offset, .. } => assert_eq!(offset, 2),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_code_policy_escapes_everywhere() {
        // The escaped bracket must not open a region under the code policy.
        let s = r"{{a\}b}}rest";
        assert_eq!(skip_block(s, 0).unwrap(), 8);
    }

    #[test]
    fn test_rule_policy_ignores_escape_outside_quotes() {
        // Under the rule policy `\[` still opens a bracket region.
        let s = r"\[a]b";
        assert_eq!(consume_balanced(s, b'[', b']', 1, EscapePolicy::Rule).unwrap(), 4);
    }

    #[test]
    fn test_find_unescaped_skips_quoted() {
        let s = r#"a",{"b,{c"#;
        assert_eq!(find_unescaped(s, ",{", 0, EscapePolicy::Rule), Some(6));
    }

    #[test]
    fn test_find_unescaped_plain() {
        assert_eq!(find_unescaped("a##b", "##", 0, EscapePolicy::Rule), Some(1));
        assert_eq!(find_unescaped("ab", "##", 0, EscapePolicy::Rule), None);
    }

    #[test]
    fn test_skip_script_block() {
        let s = "{{js code}}tail";
        assert_eq!(skip_block(s, 0).unwrap(), 11);
    }

    #[test]
    fn test_skip_script_block_with_braces_in_strings() {
        let s = r#"{{x = "}}"; y}}tail"#;
        assert_eq!(skip_block(s, 0).unwrap(), 15);
    }

    #[test]
    fn test_find_outside_blocks_skips_script() {
        let s = "a{{b##c}}d##e";
        assert_eq!(find_outside_blocks(s, "##", 0), Some(10));
    }

    #[test]
    fn test_find_outside_blocks_apostrophe_is_inert() {
        // A lone apostrophe in rule text must not hide later needles.
        let s = "won't##x";
        assert_eq!(find_outside_blocks(s, "##", 0), Some(5));
    }

    #[test]
    fn test_find_top_level_skips_brackets() {
        let s = "a[x&&y]&&b";
        assert_eq!(find_top_level(s, &["&&", "||", "%%"], 0), Some((7, 0)));
    }

    #[test]
    fn test_find_top_level_skips_parens_and_scripts() {
        let s = "a(p||q){{r%%s}}||b";
        assert_eq!(find_top_level(s, &["&&", "||", "%%"], 0), Some((15, 1)));
    }

    #[test]
    fn test_find_top_level_unbalanced_opener_is_inert() {
        // `div[1` never closes, but the combinator after it must be found.
        let s = "div[1 && .valid";
        assert_eq!(find_top_level(s, &["&&", "||", "%%"], 0), Some((6, 0)));
    }

    #[test]
    fn test_find_top_level_none() {
        assert_eq!(find_top_level("a[b&&c]", &["&&"], 0), None);
    }

    #[test]
    fn test_validate_balanced_ok() {
        validate_balanced("div.item[href=\"]\"]@a[0]").unwrap();
        validate_balanced("p{{ok}}[1]").unwrap();
        // The apostrophe opens a quote inside the script block and swallows
        // both closing braces.
        validate_balanced("p{{'}}[1]").unwrap_err();
    }

    #[test]
    fn test_validate_balanced_unclosed() {
        let err = validate_balanced("div[1").unwrap_err();
        assert!(matches!(err, AugerError::Syntax { offset: 3, .. }));
    }

    #[test]
    fn test_validate_balanced_stray_close_ignored() {
        validate_balanced("div]").unwrap();
    }
}
