//! Rule splitter — combinator detection and top-level alternative split.

use serde::{Deserialize, Serialize};

use crate::rule::starts_with_ci;
use crate::scan::find_top_level;

/// How the results of a rule's alternatives are merged.
///
/// Fixed once per raw rule string by the first combinator token found at
/// the top nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombinatorMode {
    /// `&&` — concatenate every alternative's non-empty result in order.
    And,
    /// `||` — first alternative with a non-empty result wins.
    Or,
    /// `%%` — interleave results by position.
    Zip,
    /// No combinator present; single alternative.
    None,
}

const COMBINATORS: [&str; 3] = ["&&", "||", "%%"];
const MODES: [CombinatorMode; 3] = [CombinatorMode::And, CombinatorMode::Or, CombinatorMode::Zip];

/// Split a raw rule string into its combinator mode and ordered
/// alternatives.
///
/// The first `&&`/`||`/`%%` found outside `[...]`, `(...)` and `{{...}}`
/// regions fixes the mode; the string is then split on that exact token at
/// the same depth. Whole-rule script (`@js:`/`<js>`), `@CSS:` and regex
/// (leading `:`) bodies are never split, since their payloads may contain
/// combinator-looking byte sequences.
pub fn split_rule(rule: &str) -> (CombinatorMode, Vec<&str>) {
    if starts_with_ci(rule, "@js:")
        || starts_with_ci(rule, "<js>")
        || starts_with_ci(rule, "@css:")
        || rule.starts_with(':')
    {
        return (CombinatorMode::None, vec![rule]);
    }
    let (first, which) = match find_top_level(rule, &COMBINATORS, 0) {
        Some(hit) => hit,
        None => return (CombinatorMode::None, vec![rule]),
    };
    let token = COMBINATORS[which];
    let mut parts = vec![&rule[..first]];
    let mut cursor = first + token.len();
    while let Some((pos, _)) = find_top_level(rule, &[token], cursor) {
        parts.push(&rule[cursor..pos]);
        cursor = pos + token.len();
    }
    parts.push(&rule[cursor..]);
    (MODES[which], parts)
}
