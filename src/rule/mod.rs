//! Rule pipeline — split, compile, index-filter and execute selector rules.
//!
//! A rule string passes through the splitter (combinator detection), the
//! compiler (per-alternative mode + token extraction), and the executor
//! (token resolution, backend dispatch, combinator merge).

pub mod compiler;
pub mod executor;
pub mod index;
pub mod splitter;

/// ASCII case-insensitive prefix test, used for the `@XPath:`/`@Json:`/
/// `@CSS:`/`@js:`/`@put:`/`@get:` markers. Byte-wise so a multi-byte
/// character at the cut point cannot panic the slice.
pub(crate) fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}
