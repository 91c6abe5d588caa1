//! Error types with fix suggestions
//!
//! Every variant carries a stable `SB-xxx` code in its message so CLI output
//! and tests can match on it without depending on wording.

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum ScopeError {
    // ─────────────────────────────────────────────────────────────
    // Helper argument errors (SB-001 to SB-005)
    // ─────────────────────────────────────────────────────────────

    #[error("SB-001: {{{{#{helper}}}}} must be called with {usage} (got {count} arguments)")]
    WrongArity {
        helper: String,
        usage: String,
        count: usize,
    },

    #[error("SB-002: The {{{{#{helper}}}}} helper must be called with a block")]
    MissingBlock { helper: String },

    #[error("SB-003: {{{{#{helper}}}}} cannot bind a {kind} argument")]
    UnsupportedArgument { helper: String, kind: String },

    #[error("SB-004: Invalid alias '{alias}' (expected a plain identifier)")]
    InvalidAlias { alias: String },

    #[error("SB-005: Deprecated: {message}")]
    Deprecated { message: String },

    // ─────────────────────────────────────────────────────────────
    // Template errors (SB-010 to SB-011)
    // ─────────────────────────────────────────────────────────────

    #[error("SB-010: Template parse error at position {position}: {details}")]
    TemplateParse { position: usize, details: String },

    #[error("SB-011: Unknown helper '{name}'")]
    UnknownHelper { name: String },

    // ─────────────────────────────────────────────────────────────
    // Controller errors (SB-020)
    // ─────────────────────────────────────────────────────────────

    #[error("SB-020: Unknown controller '{name}'")]
    UnknownController { name: String },

    // ─────────────────────────────────────────────────────────────
    // Store errors (SB-030 to SB-031)
    // ─────────────────────────────────────────────────────────────

    #[error("SB-030: Invalid path syntax: '{path}'")]
    InvalidPath { path: String },

    #[error("SB-031: Cannot assign '{segment}' on {value_type} (path '{path}')")]
    InvalidAssignment {
        segment: String,
        value_type: String,
        path: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Config and IO
    // ─────────────────────────────────────────────────────────────

    #[error("SB-040: Config error: {reason}")]
    Config { reason: String },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScopeError {
    /// Stable error code (`SB-001`, ...); IO/parse wrappers have none
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::WrongArity { .. } => Some("SB-001"),
            Self::MissingBlock { .. } => Some("SB-002"),
            Self::UnsupportedArgument { .. } => Some("SB-003"),
            Self::InvalidAlias { .. } => Some("SB-004"),
            Self::Deprecated { .. } => Some("SB-005"),
            Self::TemplateParse { .. } => Some("SB-010"),
            Self::UnknownHelper { .. } => Some("SB-011"),
            Self::UnknownController { .. } => Some("SB-020"),
            Self::InvalidPath { .. } => Some("SB-030"),
            Self::InvalidAssignment { .. } => Some("SB-031"),
            Self::Config { .. } => Some("SB-040"),
            Self::Yaml(_) | Self::Json(_) | Self::Io(_) => None,
        }
    }

    /// Argument errors are caller-contract violations raised at invocation time
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::WrongArity { .. }
                | Self::MissingBlock { .. }
                | Self::UnsupportedArgument { .. }
                | Self::InvalidAlias { .. }
        )
    }
}

impl FixSuggestion for ScopeError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ScopeError::WrongArity { .. } => {
                Some("Use {{#with expr as name}} or pass exactly one argument")
            }
            ScopeError::MissingBlock { .. } => {
                Some("Use the block form: {{#with expr as name}}...{{/with}}")
            }
            ScopeError::UnsupportedArgument { .. } => {
                Some("Bind a property path, or alias a literal with {{#with \"value\" as name}}")
            }
            ScopeError::InvalidAlias { .. } => {
                Some("Alias names must be single identifiers like `item`, not paths like `a.b`")
            }
            ScopeError::Deprecated { .. } => {
                Some("Switch to the keyword form ({{#with foo as bar}}) or set deprecations: warn")
            }
            ScopeError::TemplateParse { .. } => {
                Some("Check that every {{#block}} has a matching {{/block}} and tags are closed")
            }
            ScopeError::UnknownHelper { .. } => Some("Register the helper on the Env before rendering"),
            ScopeError::UnknownController { .. } => {
                Some("Register the controller on the Env before rendering")
            }
            ScopeError::InvalidPath { .. } => Some("Use format: field.subfield or list.0.field"),
            ScopeError::InvalidAssignment { .. } => {
                Some("Check the path - you're trying to set a field on a non-object value")
            }
            ScopeError::Config { .. } => Some("Check the config file keys and values"),
            ScopeError::Yaml(_) => Some("Check YAML syntax: indentation and quoting"),
            ScopeError::Json(_) => Some("Check JSON syntax (try parsing with jq)"),
            ScopeError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
