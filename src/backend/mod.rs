//! Selector backends — one module per selector mode.
//!
//! The executor pattern-matches on [`SelectorMode`](crate::rule::compiler::SelectorMode)
//! and calls into the matching module; there is no trait object in the
//! dispatch path. All backends share the same contract: evaluate one
//! resolved body against content and yield an ordered string list, turning
//! malformed selector syntax into an error the executor downgrades to an
//! empty result.

pub mod jsonpath;
pub mod markup;
pub mod pattern;
pub mod script;
pub mod xpath;
