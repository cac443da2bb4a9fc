use crate::document::Document;
use crate::markup::SOURCE_HASH_ATTR;

/// Outcome of applying a rendered result to a live document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The placeholder still stood for the same content and was replaced.
    Applied,
    /// The placeholder now stands for different content; nothing changed.
    Rejected,
    /// No node with that id is left in the document; nothing changed.
    Missing,
}

impl Reconciliation {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Applies rendered results to placeholders, re-validating identity at the
/// moment of application.
///
/// Incremental regeneration can reuse a node's id for unrelated content, so
/// the id alone isn't enough: the node's current source hash must still be
/// the one the task captured when it was created.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderReconciler;

impl PlaceholderReconciler {
    pub fn apply<D: Document>(
        &self,
        document: &mut D,
        id: &str,
        rendered: &str,
        kind: &str,
        expected_hash: &str,
    ) -> Reconciliation {
        let Some(node) = document.find_by_id(id) else {
            tracing::trace!(id, kind, "Placeholder no longer in document");
            return Reconciliation::Missing;
        };
        let current = document.attribute(&node, SOURCE_HASH_ATTR);
        if current.as_deref() != Some(expected_hash) {
            tracing::debug!(id, kind, expected_hash, ?current, "Placeholder identity changed; discarding stale result");
            return Reconciliation::Rejected;
        }
        document.replace_content(&node, rendered);
        Reconciliation::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;

    #[test]
    fn test_matching_hash_is_applied() {
        let mut doc = MemoryDocument::new();
        let node = doc.insert_placeholder("render-1-0", "h1");
        let outcome = PlaceholderReconciler.apply(&mut doc, "render-1-0", "<svg/>", "mermaid", "h1");
        assert_eq!(outcome, Reconciliation::Applied);
        assert_eq!(doc.content(node), Some("<svg/>"));
    }

    #[test]
    fn test_mismatched_hash_is_rejected_without_mutation() {
        let mut doc = MemoryDocument::new();
        let node = doc.insert_placeholder("render-1-0", "h1");
        let outcome = PlaceholderReconciler.apply(&mut doc, "render-1-0", "<svg/>", "mermaid", "h2");
        assert_eq!(outcome, Reconciliation::Rejected);
        assert_eq!(doc.content(node), Some(""));
        assert_eq!(doc.attribute(&node, SOURCE_HASH_ATTR).as_deref(), Some("h1"));
        assert!(doc.mutations().is_empty());
    }

    #[test]
    fn test_missing_placeholder_is_a_no_op() {
        let mut doc = MemoryDocument::new();
        let outcome = PlaceholderReconciler.apply(&mut doc, "render-1-0", "<svg/>", "mermaid", "h1");
        assert_eq!(outcome, Reconciliation::Missing);
        assert!(!outcome.is_applied());
        assert!(doc.mutations().is_empty());
    }
}
