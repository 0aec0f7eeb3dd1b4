//! Append-only diagnostics tree.
//!
//! Every long-running operation (certificate issuance, trust-store
//! installation, bootstrap workers) carries a [`Diagnostics`] node. The
//! node records non-fatal errors and path entries (breadcrumbs such as
//! "already exists, skipping"), and nests the nodes of its
//! sub-operations. Fatal errors still travel through `Result`; the tree is
//! what gets logged and reported once the operation completes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::{KilnError, KilnResult};

/// An error recorded in a diagnostics node.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiagnosticError {
    /// Stable leaf code, e.g. `tenant_not_found`.
    pub code: String,
    pub message: String,
    /// Component that raised it (`pki`, `bootstrap`, ...).
    pub module: String,
    pub metadata: serde_json::Value,
}

/// A breadcrumb left by an operation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PathEntry {
    pub id: String,
    pub module: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticEntry {
    Error(DiagnosticError),
    Path(PathEntry),
    Operation(Diagnostics),
}

/// One node of the diagnostics tree.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    operation: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    entries: Vec<DiagnosticEntry>,
}

impl Diagnostics {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            started_at: Utc::now(),
            completed_at: None,
            entries: Vec::new(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    fn push(&mut self, entry: DiagnosticEntry) {
        if self.is_complete() {
            warn!(
                operation = %self.operation,
                "Ignoring diagnostics entry appended after completion"
            );
            return;
        }
        self.entries.push(entry);
    }

    pub fn add_error(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        module: impl Into<String>,
    ) {
        self.add_error_with_metadata(code, message, module, serde_json::Value::Null);
    }

    pub fn add_error_with_metadata(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        module: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        self.push(DiagnosticEntry::Error(DiagnosticError {
            code: code.into(),
            message: message.into(),
            module: module.into(),
            metadata,
        }));
    }

    /// Record a [`KilnError`] using its leaf code.
    pub fn record(&mut self, module: impl Into<String>, err: &KilnError) {
        let metadata = match err {
            KilnError::Validation {
                details: Some(details),
                ..
            } => details.clone(),
            _ => serde_json::json!({ "kind": format!("{:?}", err.kind()) }),
        };
        self.add_error_with_metadata(err.code(), err.to_string(), module, metadata);
    }

    /// Pass a result through, recording the error if there is one.
    pub fn capture<T>(&mut self, module: &str, result: KilnResult<T>) -> KilnResult<T> {
        if let Err(err) = &result {
            self.record(module, err);
        }
        result
    }

    pub fn add_path_entry(&mut self, id: impl Into<String>, module: impl Into<String>) {
        self.add_path_entry_with_metadata(id, module, serde_json::Value::Null);
    }

    pub fn add_path_entry_with_metadata(
        &mut self,
        id: impl Into<String>,
        module: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        self.push(DiagnosticEntry::Path(PathEntry {
            id: id.into(),
            module: module.into(),
            metadata,
        }));
    }

    /// Nest a sub-operation's node.
    pub fn append(&mut self, sub: Diagnostics) {
        self.push(DiagnosticEntry::Operation(sub));
    }

    /// True iff any descendant is an error.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|entry| match entry {
            DiagnosticEntry::Error(_) => true,
            DiagnosticEntry::Path(_) => false,
            DiagnosticEntry::Operation(sub) => sub.has_errors(),
        })
    }

    /// All errors in the subtree, depth-first.
    pub fn errors(&self) -> Vec<&DiagnosticError> {
        let mut out = Vec::new();
        for entry in &self.entries {
            match entry {
                DiagnosticEntry::Error(err) => out.push(err),
                DiagnosticEntry::Path(_) => {}
                DiagnosticEntry::Operation(sub) => out.extend(sub.errors()),
            }
        }
        out
    }

    /// All path entries in the subtree, depth-first.
    pub fn path_entries(&self) -> Vec<&PathEntry> {
        let mut out = Vec::new();
        for entry in &self.entries {
            match entry {
                DiagnosticEntry::Error(_) => {}
                DiagnosticEntry::Path(path) => out.push(path),
                DiagnosticEntry::Operation(sub) => out.extend(sub.path_entries()),
            }
        }
        out
    }

    /// Direct sub-operation nodes.
    pub fn children(&self) -> impl Iterator<Item = &Diagnostics> {
        self.entries.iter().filter_map(|entry| match entry {
            DiagnosticEntry::Operation(sub) => Some(sub),
            _ => None,
        })
    }

    /// Find a sub-operation by name anywhere in the subtree.
    pub fn find(&self, operation: &str) -> Option<&Diagnostics> {
        if self.operation == operation {
            return Some(self);
        }
        self.children().find_map(|sub| sub.find(operation))
    }

    pub fn first_error(&self) -> Option<&DiagnosticError> {
        self.errors().into_iter().next()
    }

    /// Seal the node with a terminal timestamp. Idempotent.
    pub fn complete(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_node_has_no_errors() {
        let diag = Diagnostics::new("noop");
        assert!(!diag.has_errors());
        assert!(!diag.is_complete());
    }

    #[test]
    fn nested_error_bubbles_up() {
        let mut child = Diagnostics::new("child");
        child.add_path_entry("step-1", "pki");
        child.add_error("crypto_error", "signing failed", "pki");

        let mut parent = Diagnostics::new("parent");
        parent.add_path_entry("start", "bootstrap");
        assert!(!parent.has_errors());
        parent.append(child);

        assert!(parent.has_errors());
        assert_eq!(parent.errors().len(), 1);
        assert_eq!(parent.first_error().unwrap().code, "crypto_error");
        assert_eq!(parent.path_entries().len(), 2);
        assert!(parent.find("child").is_some());
    }

    #[test]
    fn completed_node_rejects_appends() {
        let mut diag = Diagnostics::new("sealed");
        diag.complete();
        let first = diag.completed_at();
        diag.add_error("late", "too late", "test");
        diag.complete();
        assert!(!diag.has_errors());
        assert_eq!(diag.completed_at(), first);
    }

    #[test]
    fn capture_records_only_failures() {
        let mut diag = Diagnostics::new("capture");
        let ok: KilnResult<u8> = Ok(1);
        assert_eq!(diag.capture("core", ok).unwrap(), 1);
        assert!(!diag.has_errors());

        let err: KilnResult<u8> = Err(KilnError::not_found("tenant", "t1"));
        assert!(diag.capture("core", err).is_err());
        assert_eq!(diag.first_error().unwrap().code, "tenant_not_found");
    }

    #[test]
    fn serializes_as_tagged_tree() {
        let mut diag = Diagnostics::new("root");
        diag.add_path_entry("a", "m");
        let json = diag.to_json();
        assert_eq!(json["operation"], "root");
        assert_eq!(json["entries"][0]["type"], "path");
    }
}
