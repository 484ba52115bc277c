// Copyright 2026 Auger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Auger — composable selector-rule engine.
//!
//! One combinator grammar (`&&`, `||`, `%%`, `##`, `[index]`) drives five
//! selector backends: CSS-flavored markup queries, an XPath subset, a
//! JSONPath subset, regex, and externally evaluated scripts. The same
//! tokenizer also resolves templated request descriptors. The engine does
//! no network I/O; script execution, cookies, variables, and caching are
//! capability traits supplied by the embedder.
//!
//! ```
//! use auger::{Content, Engine, ExecutionContext};
//!
//! let engine = Engine::new();
//! let mut ctx = ExecutionContext::new("https://example.com/");
//! let page = Content::from_html("<ul><li>a</li><li>b</li></ul>");
//! assert_eq!(engine.extract_list(&mut ctx, &page, "li@text"), ["a", "b"]);
//! ```

#![allow(
    dead_code,
    unused_imports,
    clippy::new_without_default,
    clippy::should_implement_trait
)]

pub mod backend;
pub mod capability;
pub mod content;
pub mod engine;
pub mod error;
pub mod request;
pub mod rule;
pub mod scan;

pub use capability::{
    CacheStore, CookieStore, MemoryCache, MemoryVariables, NoopCache, NoopCookies, NoopEvaluator,
    ScriptBindings, ScriptEvaluator, VariableStore,
};
pub use content::Content;
pub use engine::{Engine, EngineConfig, ExecutionContext};
pub use error::{AugerError, AugerResult};
pub use request::{HttpMethod, RequestDescriptor, RequestOptions};
pub use rule::compiler::{compile_rule, CompiledExpression, CompiledRule, SelectorMode};
pub use rule::splitter::CombinatorMode;
