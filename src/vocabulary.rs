//! Vocabulary terms for recognition biasing.
//!
//! Terms come from an external store (the app's custom-word list) and are
//! attached to a session at connect time only; they are immutable for the
//! session's lifetime. Each provider maps the list onto its own biasing
//! mechanism and cap.

/// Trait for sourcing vocabulary terms.
pub trait VocabularyStore: Send + Sync {
    /// Returns the user's terms in their stored order.
    fn terms(&self) -> Vec<String>;
}

/// Vocabulary store over a fixed term list.
#[derive(Debug, Clone, Default)]
pub struct StaticVocabulary {
    terms: Vec<String>,
}

impl StaticVocabulary {
    pub fn new(terms: Vec<String>) -> Self {
        Self { terms }
    }
}

impl VocabularyStore for StaticVocabulary {
    fn terms(&self) -> Vec<String> {
        self.terms.clone()
    }
}

/// Deduplicated, order-preserving vocabulary list for one session.
///
/// Duplicates are detected case-insensitively; the first spelling wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabularyList {
    terms: Vec<String>,
}

impl VocabularyList {
    /// Builds a list from raw terms: trims whitespace, drops empties, and
    /// removes case-insensitive duplicates while preserving insertion order.
    pub fn new(raw: impl IntoIterator<Item = String>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut terms = Vec::new();
        for term in raw {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            if seen.insert(term.to_lowercase()) {
                terms.push(term.to_string());
            }
        }
        Self { terms }
    }

    /// Builds a list from a store's terms.
    pub fn from_store(store: &dyn VocabularyStore) -> Self {
        Self::new(store.terms())
    }

    /// Returns a copy truncated to at most `limit` terms (a provider cap).
    pub fn capped(&self, limit: usize) -> Self {
        Self {
            terms: self.terms.iter().take(limit).cloned().collect(),
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Joins the terms with the given separator.
    pub fn join(&self, separator: &str) -> String {
        self.terms.join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(terms: &[&str]) -> VocabularyList {
        VocabularyList::new(terms.iter().map(|t| t.to_string()))
    }

    #[test]
    fn test_dedup_is_case_insensitive_and_order_preserving() {
        let vocab = list(&["Kubernetes", "gRPC", "kubernetes", "Tokio", "GRPC"]);
        assert_eq!(vocab.terms(), &["Kubernetes", "gRPC", "Tokio"]);
    }

    #[test]
    fn test_empty_and_whitespace_terms_dropped() {
        let vocab = list(&["", "  ", "alpha", " beta "]);
        assert_eq!(vocab.terms(), &["alpha", "beta"]);
    }

    #[test]
    fn test_capped_truncates_but_keeps_order() {
        let vocab = list(&["one", "two", "three"]).capped(2);
        assert_eq!(vocab.terms(), &["one", "two"]);
    }

    #[test]
    fn test_capped_beyond_len_is_identity() {
        let vocab = list(&["one", "two"]);
        assert_eq!(vocab.capped(10), vocab);
    }

    #[test]
    fn test_join() {
        let vocab = list(&["alpha", "beta"]);
        assert_eq!(vocab.join(", "), "alpha, beta");
    }

    #[test]
    fn test_from_store() {
        let store = StaticVocabulary::new(vec!["one".to_string(), "One".to_string()]);
        let vocab = VocabularyList::from_store(&store);
        assert_eq!(vocab.len(), 1);
    }
}
