//! Speech provider abstraction.
//!
//! Each variant owns one connection to one backend and normalizes
//! connect/send/commit/disconnect behind a single trait, emitting a uniform
//! event sequence that the session consumes exactly once.

pub mod assemblyai;
pub mod deepgram;
pub mod local;
pub mod openai;
pub mod soniox;
pub(crate) mod ws;

use crate::credentials::CredentialStore;
use crate::defaults;
use crate::error::{Result, SottoError};
use crate::vocabulary::VocabularyList;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events produced by a provider during a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamingEvent {
    /// Backend accepted the session and is ready for audio.
    SessionStarted,
    /// Interim transcript text, subject to revision.
    Partial(String),
    /// Transcript text the backend guarantees is stable.
    Committed(String),
    /// Provider-level error detail. Non-fatal for the session.
    Error(String),
}

/// The provider's event sequence. Consumed by exactly one subscriber.
pub type EventStream = mpsc::UnboundedReceiver<StreamingEvent>;

pub(crate) type EventSender = mpsc::UnboundedSender<StreamingEvent>;

/// Spoken-language selection for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    /// Let the backend detect the language.
    Auto,
    /// Force a specific language code (e.g. "en").
    Code(String),
}

impl Language {
    /// Parses a configured language value ("auto" or a code).
    pub fn from_config(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(defaults::AUTO_LANGUAGE) {
            Language::Auto
        } else {
            Language::Code(value.to_string())
        }
    }

    /// Returns the language code, or `None` for auto-detection.
    pub fn code(&self) -> Option<&str> {
        match self {
            Language::Auto => None,
            Language::Code(code) => Some(code),
        }
    }
}

/// Everything a provider needs to open its session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Provider-specific model name (e.g. "nova-3", "base.en").
    pub model: String,
    pub language: Language,
    pub vocabulary: VocabularyList,
    pub sample_rate: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            language: Language::Auto,
            vocabulary: VocabularyList::default(),
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// One streaming speech-to-text backend.
///
/// A provider instance serves one session at a time and is not shared across
/// sessions.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier, also the credential lookup key.
    fn name(&self) -> &'static str;

    /// Opens the session. May suspend on the network handshake. Returns the
    /// provider's event sequence; the receiver must be consumed by exactly
    /// one subscriber.
    async fn connect(&self, options: &ConnectOptions) -> Result<EventStream>;

    /// Forwards one audio chunk. Fails with `NotConnected` outside the
    /// streaming state.
    async fn send_audio(&self, chunk: Vec<u8>) -> Result<()>;

    /// Signals end-of-utterance and requests finalization. Semantics are
    /// vendor-specific: an explicit control message for some backends,
    /// server-side endpointing for others.
    async fn commit(&self) -> Result<()>;

    /// Releases the connection. Idempotent; never fails.
    async fn disconnect(&self);
}

/// Provider identity. Every reachable variant has an implementation, so the
/// factory match below is exhaustive and an "unsupported provider" state is
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Deepgram,
    Soniox,
    AssemblyAi,
    OpenAi,
    Local,
}

impl ProviderKind {
    /// Parses a provider identifier.
    pub fn parse(id: &str) -> Result<Self> {
        match id {
            "deepgram" => Ok(ProviderKind::Deepgram),
            "soniox" => Ok(ProviderKind::Soniox),
            "assemblyai" => Ok(ProviderKind::AssemblyAi),
            "openai" => Ok(ProviderKind::OpenAi),
            "local" => Ok(ProviderKind::Local),
            other => Err(SottoError::InvalidModel {
                value: other.to_string(),
            }),
        }
    }

    /// The canonical identifier, also the credential lookup key.
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::Deepgram => "deepgram",
            ProviderKind::Soniox => "soniox",
            ProviderKind::AssemblyAi => "assemblyai",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Local => "local",
        }
    }

    /// True for WebSocket-backed variants, false for the on-device engine.
    pub fn is_cloud(&self) -> bool {
        !matches!(self, ProviderKind::Local)
    }
}

/// A parsed model selection: provider identity plus the provider's model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: ProviderKind,
    pub model: String,
}

impl ModelSelection {
    /// Parses a `provider/model` string, e.g. "deepgram/nova-3" or
    /// "local/base.en".
    pub fn parse(value: &str) -> Result<Self> {
        let (provider, model) = value.split_once('/').ok_or_else(|| SottoError::InvalidModel {
            value: value.to_string(),
        })?;
        if model.is_empty() {
            return Err(SottoError::InvalidModel {
                value: value.to_string(),
            });
        }
        Ok(Self {
            provider: ProviderKind::parse(provider)?,
            model: model.to_string(),
        })
    }
}

impl std::fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider.id(), self.model)
    }
}

/// Creates the provider variant for a provider identity.
///
/// Cloud variants take their API key from the credential store; a missing key
/// surfaces as `MissingCredential` at connect time. The on-device variant
/// resolves model files under `model_dir`.
pub fn create_provider(
    kind: ProviderKind,
    credentials: &dyn CredentialStore,
    model_dir: &Path,
) -> Arc<dyn Provider> {
    match kind {
        ProviderKind::Deepgram => {
            Arc::new(deepgram::DeepgramProvider::new(credentials.get("deepgram")))
        }
        ProviderKind::Soniox => Arc::new(soniox::SonioxProvider::new(credentials.get("soniox"))),
        ProviderKind::AssemblyAi => Arc::new(assemblyai::AssemblyAiProvider::new(
            credentials.get("assemblyai"),
        )),
        ProviderKind::OpenAi => Arc::new(openai::OpenAiProvider::new(credentials.get("openai"))),
        ProviderKind::Local => Arc::new(local::LocalProvider::new(model_dir.to_path_buf())),
    }
}
