//! Structured render diagnostics
//!
//! Helpers never print. They emit `DiagnosticKind` events through an
//! injected [`DiagnosticSink`]; the default sink is an append-only
//! [`DiagnosticLog`] that tests and the CLI can inspect afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Single diagnostic in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A deprecated template form was rendered
    Deprecation {
        helper: Arc<str>,
        message: String,
        /// Expression that triggered it
        source: String,
    },
    /// A block alias hides an alias of the same name from an outer block
    KeywordShadowed { helper: Arc<str>, alias: String },
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Deprecation { .. } => Severity::Warning,
            Self::KeywordShadowed { .. } => Severity::Info,
        }
    }

    pub fn helper(&self) -> &str {
        match self {
            Self::Deprecation { helper, .. } | Self::KeywordShadowed { helper, .. } => helper,
        }
    }

    pub fn is_deprecation(&self) -> bool {
        matches!(self, Self::Deprecation { .. })
    }

    /// One-line human readable form
    pub fn message(&self) -> String {
        match self {
            Self::Deprecation {
                message, source, ..
            } => format!("{message} (at `{source}`)"),
            Self::KeywordShadowed { helper, alias } => {
                format!("{{{{#{helper}}}}} alias '{alias}' shadows an outer alias")
            }
        }
    }
}

/// Receiver for diagnostics emitted while rendering
pub trait DiagnosticSink: Send + Sync {
    /// Record a diagnostic, returning its sequence ID
    fn emit(&self, kind: DiagnosticKind) -> u64;
}

/// Thread-safe, append-only diagnostics log
#[derive(Clone)]
pub struct DiagnosticLog {
    diagnostics: Arc<RwLock<Vec<Diagnostic>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self {
            diagnostics: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// All diagnostics (cloned)
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.read().clone()
    }

    pub fn deprecations(&self) -> Vec<Diagnostic> {
        self.diagnostics()
            .into_iter()
            .filter(|d| d.kind.is_deprecation())
            .collect()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.diagnostics()
            .into_iter()
            .filter(|d| d.kind.severity() == Severity::Warning)
            .collect()
    }

    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.diagnostics()).unwrap_or(Value::Null)
    }

    pub fn clear(&self) {
        self.diagnostics.write().clear();
    }

    pub fn len(&self) -> usize {
        self.diagnostics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn emit(&self, kind: DiagnosticKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(id, helper = kind.helper(), "{}", kind.message());
        let diagnostic = Diagnostic {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };
        self.diagnostics.write().push(diagnostic);
        id
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deprecation() -> DiagnosticKind {
        DiagnosticKind::Deprecation {
            helper: Arc::from("with"),
            message: "context switching is deprecated".to_string(),
            source: "user".to_string(),
        }
    }

    #[test]
    fn emit_assigns_sequential_ids() {
        let log = DiagnosticLog::new();
        assert_eq!(log.emit(deprecation()), 0);
        assert_eq!(
            log.emit(DiagnosticKind::KeywordShadowed {
                helper: Arc::from("with"),
                alias: "p".to_string(),
            }),
            1
        );
        assert_eq!(log.len(), 2);
        assert_eq!(log.deprecations().len(), 1);
        assert_eq!(log.warnings().len(), 1);
    }

    #[test]
    fn clones_share_storage() {
        let log = DiagnosticLog::new();
        let sink: Arc<dyn DiagnosticSink> = Arc::new(log.clone());
        sink.emit(deprecation());
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn serializes_with_type_tag() {
        let log = DiagnosticLog::new();
        log.emit(deprecation());
        let json = log.to_json();
        assert_eq!(json[0]["kind"]["type"], "deprecation");
        assert_eq!(json[0]["kind"]["helper"], "with");
    }

    #[test]
    fn message_mentions_source() {
        assert_eq!(
            deprecation().message(),
            "context switching is deprecated (at `user`)"
        );
    }
}
