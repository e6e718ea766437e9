//! sotto - Streaming dictation engine for macOS
//!
//! Live speech-to-text sessions against cloud speech services and an
//! on-device engine, behind one session lifecycle and one event model.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod bridge;
pub mod config;
pub mod credentials;
pub mod defaults;
pub mod error;
pub mod provider;
pub mod reporter;
pub mod session;
pub mod vocabulary;

// Core traits (caller → session → provider)
pub use credentials::{CredentialStore, EnvCredentialStore, MemoryCredentialStore};
pub use provider::{
    ConnectOptions, EventStream, Language, ModelSelection, Provider, ProviderKind,
    StreamingEvent, create_provider,
};
pub use vocabulary::{StaticVocabulary, VocabularyList, VocabularyStore};

// Session management
pub use session::{DictationSession, PartialCallback, SessionEvent, SessionState};

// Error handling
pub use error::{Result, SottoError};

// Config
pub use config::Config;

// Reporting (for embedders and tests)
pub use reporter::{ErrorReporter, LogReporter};

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.1+abc1234"` when git hash is available, `"0.3.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
