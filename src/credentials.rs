//! API key lookup for cloud providers.
//!
//! The engine never stores secrets itself; the embedding application decides
//! where keys live (keychain, environment, config) and exposes them through
//! this trait.

use std::collections::HashMap;

/// Trait for looking up per-provider API keys.
pub trait CredentialStore: Send + Sync {
    /// Returns the secret for a provider id (e.g. "deepgram"), if configured.
    fn get(&self, provider: &str) -> Option<String>;
}

/// Credential store backed by environment variables.
///
/// Looks up `SOTTO_<PROVIDER>_API_KEY`, e.g. `SOTTO_DEEPGRAM_API_KEY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialStore;

impl CredentialStore for EnvCredentialStore {
    fn get(&self, provider: &str) -> Option<String> {
        let var = format!("SOTTO_{}_API_KEY", provider.to_uppercase());
        std::env::var(var).ok().filter(|key| !key.is_empty())
    }
}

/// In-memory credential store for tests and embedding applications.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    keys: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key for a provider, replacing any existing one.
    pub fn with_key(mut self, provider: &str, key: &str) -> Self {
        self.keys.insert(provider.to_string(), key.to_string());
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider: &str) -> Option<String> {
        self.keys.get(provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_returns_configured_key() {
        let store = MemoryCredentialStore::new().with_key("deepgram", "dg-secret");
        assert_eq!(store.get("deepgram"), Some("dg-secret".to_string()));
        assert_eq!(store.get("soniox"), None);
    }

    #[test]
    fn test_memory_store_replaces_key() {
        let store = MemoryCredentialStore::new()
            .with_key("openai", "first")
            .with_key("openai", "second");
        assert_eq!(store.get("openai"), Some("second".to_string()));
    }

    #[test]
    fn test_env_store_reads_variable() {
        unsafe {
            std::env::set_var("SOTTO_TESTVENDOR_API_KEY", "env-secret");
        }
        let store = EnvCredentialStore;
        assert_eq!(store.get("testvendor"), Some("env-secret".to_string()));
        unsafe {
            std::env::remove_var("SOTTO_TESTVENDOR_API_KEY");
        }
    }

    #[test]
    fn test_env_store_ignores_empty_variable() {
        unsafe {
            std::env::set_var("SOTTO_EMPTYVENDOR_API_KEY", "");
        }
        let store = EnvCredentialStore;
        assert_eq!(store.get("emptyvendor"), None);
        unsafe {
            std::env::remove_var("SOTTO_EMPTYVENDOR_API_KEY");
        }
    }
}
