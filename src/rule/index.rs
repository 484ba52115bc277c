//! Element index filter — trailing `[...]` position selection.
//!
//! A stage like `tag.li[!0,2:4]` carries a trailing bracket whose interior
//! is an index expression rather than CSS. The interior only counts as an
//! index expression when it is made of digits, `-`, `,`, `:` and an
//! optional leading `!`; anything else is left to the selector syntax so
//! CSS attribute brackets keep working.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::scan;

/// One `start:end:step` triple. Bounds are inclusive; an omitted bound
/// means first (positive step) or last (negative step). Negative values
/// count from the end of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub step: i64,
}

/// A parsed index expression: bare positions plus ranges, with an optional
/// exclusion flag (`[!...]` keeps everything *except* the listed
/// positions).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexSpec {
    pub absolute: Vec<i64>,
    pub ranges: Vec<IndexRange>,
    pub exclude: bool,
}

impl IndexSpec {
    /// Resolve the spec against a list of `len` elements, returning the
    /// selected positions in ascending order, de-duplicated. Out-of-range
    /// positions are silently dropped; the call never panics.
    pub fn apply(&self, len: usize) -> Vec<usize> {
        let mut picked: BTreeSet<usize> = BTreeSet::new();
        let n = len as i64;
        for &a in &self.absolute {
            let p = if a < 0 { n + a } else { a };
            if p >= 0 && p < n {
                picked.insert(p as usize);
            }
        }
        for r in &self.ranges {
            range_positions(r, len, &mut picked);
        }
        if self.exclude {
            (0..len).filter(|p| !picked.contains(p)).collect()
        } else {
            picked.into_iter().collect()
        }
    }
}

fn range_positions(r: &IndexRange, len: usize, out: &mut BTreeSet<usize>) {
    if len == 0 || r.step == 0 {
        return;
    }
    let n = len as i64;
    let resolve = |v: i64| if v < 0 { n + v } else { v };
    if r.step > 0 {
        let start = resolve(r.start.unwrap_or(0)).max(0);
        let end = resolve(r.end.unwrap_or(-1)).min(n - 1);
        let mut p = start;
        while p <= end {
            out.insert(p as usize);
            // A step that overflows the cursor has left the range.
            let Some(next) = p.checked_add(r.step) else {
                break;
            };
            p = next;
        }
    } else {
        let start = resolve(r.start.unwrap_or(-1)).min(n - 1);
        let end = resolve(r.end.unwrap_or(0)).max(0);
        let mut p = start;
        while p >= end {
            out.insert(p as usize);
            let Some(next) = p.checked_add(r.step) else {
                break;
            };
            p = next;
        }
    }
}

/// Parse a bracket interior into an [`IndexSpec`]. Returns `None` when the
/// interior is not an index expression.
pub fn parse_index_spec(interior: &str) -> Option<IndexSpec> {
    let (exclude, rest) = match interior.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, interior),
    };
    if rest.is_empty()
        || !rest
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | ',' | ':'))
    {
        return None;
    }
    let mut spec = IndexSpec {
        exclude,
        ..IndexSpec::default()
    };
    for part in rest.split(',') {
        if part.contains(':') {
            let pieces: Vec<&str> = part.split(':').collect();
            if pieces.len() > 3 {
                return None;
            }
            let bound = |p: &str| -> Option<Option<i64>> {
                if p.is_empty() {
                    Some(None)
                } else {
                    p.parse::<i64>().ok().map(Some)
                }
            };
            let start = bound(pieces[0])?;
            let end = bound(pieces[1])?;
            let step = match pieces.get(2) {
                Some(p) if !p.is_empty() => p.parse::<i64>().ok().filter(|&s| s != 0)?,
                _ => 1,
            };
            spec.ranges.push(IndexRange { start, end, step });
        } else {
            spec.absolute.push(part.parse::<i64>().ok()?);
        }
    }
    Some(spec)
}

/// Split a trailing index bracket off a stage body. `a.link[!0]` becomes
/// `("a.link", spec)`; a stage whose final bracket is CSS (or unbalanced)
/// comes back untouched.
pub fn split_trailing_index(stage: &str) -> (&str, Option<IndexSpec>) {
    if !stage.ends_with(']') {
        return (stage, None);
    }
    let bytes = stage.as_bytes();
    let mut last_open = None;
    let mut i = 0;
    while i < bytes.len() {
        if scan::starts_block(stage, i) {
            match scan::skip_block(stage, i) {
                Ok(end) => {
                    if bytes[i] == b'[' && end == stage.len() {
                        last_open = Some(i);
                    }
                    i = end;
                }
                Err(_) => i += 1,
            }
        } else {
            i += 1;
        }
    }
    let Some(open) = last_open else {
        return (stage, None);
    };
    match parse_index_spec(&stage[open + 1..stage.len() - 1]) {
        Some(spec) => (&stage[..open], Some(spec)),
        None => (stage, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(interior: &str, len: usize) -> Vec<usize> {
        parse_index_spec(interior).unwrap().apply(len)
    }

    #[test]
    fn test_absolute_and_negative() {
        assert_eq!(apply("0,2,-1", 5), vec![0, 2, 4]);
    }

    #[test]
    fn test_inclusive_range() {
        assert_eq!(apply("1:3", 5), vec![1, 2, 3]);
    }

    #[test]
    fn test_exclusion() {
        assert_eq!(apply("!0", 5), vec![1, 2, 3, 4]);
        assert_eq!(apply("!1:3", 5), vec![0, 4]);
    }

    #[test]
    fn test_stepped_range_clamps() {
        assert_eq!(apply("0:10:2", 5), vec![0, 2, 4]);
    }

    #[test]
    fn test_open_bounds() {
        assert_eq!(apply(":", 3), vec![0, 1, 2]);
        assert_eq!(apply("::2", 5), vec![0, 2, 4]);
        assert_eq!(apply("2:", 5), vec![2, 3, 4]);
        assert_eq!(apply(":1", 5), vec![0, 1]);
    }

    #[test]
    fn test_negative_step() {
        // Direction only affects which positions are visited; output stays
        // ascending.
        assert_eq!(apply("3:0:-1", 5), vec![0, 1, 2, 3]);
        assert_eq!(apply("::-2", 5), vec![0, 2, 4]);
    }

    #[test]
    fn test_degenerate_ranges_collapse() {
        assert_eq!(apply("2:2", 5), vec![2]);
        assert_eq!(apply("0:4:9", 5), vec![0]);
    }

    #[test]
    fn test_extreme_steps_collapse_to_endpoints() {
        // i64::MAX / i64::MIN steps must not overflow the cursor.
        assert_eq!(apply("1:4:9223372036854775807", 5), vec![1]);
        assert_eq!(apply("::-9223372036854775808", 5), vec![4]);
    }

    #[test]
    fn test_out_of_range_dropped() {
        assert_eq!(apply("9", 3), Vec::<usize>::new());
        assert_eq!(apply("-9", 3), Vec::<usize>::new());
    }

    #[test]
    fn test_non_index_interiors_rejected() {
        assert!(parse_index_spec("href").is_none());
        assert!(parse_index_spec("data-id=3").is_none());
        assert!(parse_index_spec("").is_none());
        assert!(parse_index_spec("1:2:3:4").is_none());
        assert!(parse_index_spec("0,,2").is_none());
    }

    #[test]
    fn test_split_trailing_index() {
        let (body, spec) = split_trailing_index("a.link[!0]");
        assert_eq!(body, "a.link");
        assert!(spec.unwrap().exclude);

        let (body, spec) = split_trailing_index("a[href][0]");
        assert_eq!(body, "a[href]");
        assert_eq!(spec.unwrap().absolute, vec![0]);

        let (body, spec) = split_trailing_index("a[href=\"x[0]\"]");
        assert_eq!(body, "a[href=\"x[0]\"]");
        assert!(spec.is_none());

        let (body, spec) = split_trailing_index("div");
        assert_eq!(body, "div");
        assert!(spec.is_none());
    }
}
