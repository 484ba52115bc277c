//! Error types for rule compilation, evaluation and request resolution.

/// Errors that can occur in the rule engine.
///
/// Only [`AugerError::Syntax`] is surfaced to callers (through strict
/// compilation and the CLI `check` command). Evaluation-time failures are
/// caught inside the executor: the affected alternative contributes an
/// empty result and its siblings keep running.
#[derive(thiserror::Error, Debug)]
pub enum AugerError {
    /// Unbalanced brackets or quotes discovered while compiling a rule.
    /// `offset` is the byte position where the failed scan started.
    #[error("unbalanced syntax at byte {offset}: {detail}")]
    Syntax { offset: usize, detail: String },

    /// A selector body that is malformed for its backend (bad CSS, bad
    /// regex, untranslatable path expression).
    #[error("selector evaluation failed: {0}")]
    Selector(String),

    /// The script-evaluator capability reported a failure.
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// The trailing `,{...}` options block of a request template did not
    /// parse; the resolver falls back to the bare URL.
    #[error("request options malformed: {0}")]
    OptionParse(String),
}

impl AugerError {
    pub fn syntax(offset: usize, detail: impl Into<String>) -> Self {
        AugerError::Syntax {
            offset,
            detail: detail.into(),
        }
    }
}

/// Convenience result type.
pub type AugerResult<T> = Result<T, AugerError>;
