//! On-device transcription provider.
//!
//! No network involved: `connect` loads a local Whisper engine selected by
//! the declared model version, audio accumulates into the decoder's input
//! buffer as it arrives, and `commit` runs one decode over the buffered
//! utterance, emitting a single committed event with the final string.
//!
//! # Feature Gate
//!
//! The real engine requires the `whisper` feature (and cmake to build).
//! Without it a stub engine is compiled that fails at decode time, so the
//! rest of the crate keeps building.

use crate::error::{Result, SottoError};
use crate::provider::{ConnectOptions, EventSender, EventStream, Language, Provider, StreamingEvent};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
    install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

const NAME: &str = "local";

/// Trait for local speech decoding.
///
/// This trait allows swapping implementations (real Whisper vs mock).
pub trait SpeechEngine: Send + Sync {
    /// Decode one utterance of 16-bit PCM at 16kHz mono into text.
    fn decode(&self, audio: &[i16]) -> Result<String>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the engine is ready
    fn is_ready(&self) -> bool;
}

/// Mock engine for testing
#[derive(Debug, Clone)]
pub struct MockSpeechEngine {
    model_name: String,
    response: String,
    should_fail: bool,
}

impl MockSpeechEngine {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on decode
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl SpeechEngine for MockSpeechEngine {
    fn decode(&self, _audio: &[i16]) -> Result<String> {
        if self.should_fail {
            Err(SottoError::Inference {
                message: "mock decode failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}

/// Whisper-based engine.
///
/// The WhisperContext is wrapped in a Mutex to ensure thread safety.
#[cfg(feature = "whisper")]
pub struct WhisperEngine {
    context: Mutex<WhisperContext>,
    language: Language,
    model_name: String,
}

/// Whisper-based engine placeholder (without whisper feature).
///
/// Enable the `whisper` feature for real on-device transcription.
#[cfg(not(feature = "whisper"))]
pub struct WhisperEngine {
    model_name: String,
}

fn model_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(feature = "whisper")]
impl WhisperEngine {
    /// Load the model at `model_path`.
    ///
    /// # Errors
    /// Returns `SottoError::ModelNotFound` if the model file doesn't exist,
    /// `SottoError::Inference` if loading fails.
    pub fn new(model_path: &Path, language: Language) -> Result<Self> {
        // Install logging hooks to suppress whisper.cpp output (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !model_path.exists() {
            return Err(SottoError::ModelNotFound {
                path: model_path.to_string_lossy().to_string(),
            });
        }

        let context = WhisperContext::new_with_params(
            model_path.to_str().ok_or_else(|| SottoError::Inference {
                message: "Invalid UTF-8 in model path".to_string(),
            })?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| SottoError::Inference {
            message: format!("Failed to load Whisper model: {}", e),
        })?;

        Ok(Self {
            context: Mutex::new(context),
            language,
            model_name: model_name_from_path(model_path),
        })
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperEngine {
    /// Stub constructor: only checks that the model file exists.
    pub fn new(model_path: &Path, _language: Language) -> Result<Self> {
        if !model_path.exists() {
            return Err(SottoError::ModelNotFound {
                path: model_path.to_string_lossy().to_string(),
            });
        }
        Ok(Self {
            model_name: model_name_from_path(model_path),
        })
    }
}

#[cfg(feature = "whisper")]
impl SpeechEngine for WhisperEngine {
    fn decode(&self, audio: &[i16]) -> Result<String> {
        if audio.is_empty() {
            return Ok(String::new());
        }

        // Whisper expects f32 samples normalized to [-1.0, 1.0]
        let audio_f32: Vec<f32> = audio.iter().map(|&s| s as f32 / 32768.0).collect();

        let context = self.context.lock().map_err(|e| SottoError::Inference {
            message: format!("Failed to acquire context lock: {}", e),
        })?;

        let mut state = context.create_state().map_err(|e| SottoError::Inference {
            message: format!("Failed to create Whisper state: {}", e),
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(self.language.code());
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio_f32)
            .map_err(|e| SottoError::Inference {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
        }
        Ok(text.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl SpeechEngine for WhisperEngine {
    fn decode(&self, _audio: &[i16]) -> Result<String> {
        Err(SottoError::Inference {
            message: concat!(
                "Whisper feature not enabled. This build has no on-device ",
                "speech recognition; rebuild with --features whisper."
            )
            .to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}

/// Converts little-endian 16-bit PCM bytes into samples. A trailing odd byte
/// is dropped.
fn samples_from_bytes(chunk: &[u8]) -> impl Iterator<Item = i16> + '_ {
    chunk
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}

/// On-device provider over a [`SpeechEngine`].
pub struct LocalProvider {
    model_dir: PathBuf,
    preloaded: Option<Arc<dyn SpeechEngine>>,
    engine: Mutex<Option<Arc<dyn SpeechEngine>>>,
    buffer: Mutex<Vec<i16>>,
    events: Mutex<Option<EventSender>>,
}

impl LocalProvider {
    /// Provider that resolves model files under `model_dir` at connect time.
    pub fn new(model_dir: PathBuf) -> Self {
        Self {
            model_dir,
            preloaded: None,
            engine: Mutex::new(None),
            buffer: Mutex::new(Vec::new()),
            events: Mutex::new(None),
        }
    }

    /// Provider over an already-loaded engine (tests, embedding apps that
    /// manage model lifecycle themselves).
    pub fn with_engine(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            model_dir: PathBuf::new(),
            preloaded: Some(engine),
            engine: Mutex::new(None),
            buffer: Mutex::new(Vec::new()),
            events: Mutex::new(None),
        }
    }

    /// Model file path for a declared model version, e.g. "base.en" →
    /// `<model_dir>/ggml-base.en.bin`.
    fn model_path(&self, version: &str) -> PathBuf {
        self.model_dir.join(format!("ggml-{}.bin", version))
    }

    fn current_engine(&self) -> Result<Arc<dyn SpeechEngine>> {
        self.engine
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(SottoError::NotConnected)
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<EventStream> {
        let engine: Arc<dyn SpeechEngine> = match &self.preloaded {
            Some(engine) => engine.clone(),
            None => Arc::new(WhisperEngine::new(
                &self.model_path(&options.model),
                options.language.clone(),
            )?),
        };

        if let Ok(mut guard) = self.engine.lock() {
            *guard = Some(engine);
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(StreamingEvent::SessionStarted).ok();
        if let Ok(mut events) = self.events.lock() {
            *events = Some(tx);
        }

        Ok(rx)
    }

    async fn send_audio(&self, chunk: Vec<u8>) -> Result<()> {
        self.current_engine()?;
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.extend(samples_from_bytes(&chunk));
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let engine = self.current_engine()?;
        let samples = self
            .buffer
            .lock()
            .map(|mut buffer| std::mem::take(&mut *buffer))
            .unwrap_or_default();

        // Inference is CPU-bound; keep it off the async worker threads.
        let decoded =
            tokio::task::spawn_blocking(move || engine.decode(&samples))
                .await
                .map_err(|e| SottoError::Inference {
                    message: format!("decode task failed: {}", e),
                })?;

        let events = self.events.lock().ok().and_then(|guard| guard.clone());
        if let Some(events) = events {
            match decoded {
                Ok(text) => {
                    events.send(StreamingEvent::Committed(text)).ok();
                }
                Err(e) => {
                    events.send(StreamingEvent::Error(e.to_string())).ok();
                }
            }
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if let Ok(mut engine) = self.engine.lock() {
            engine.take();
        }
        if let Ok(mut events) = self.events.lock() {
            events.take();
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_from_samples(samples: &[i16]) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_mock_engine_returns_response() {
        let engine = MockSpeechEngine::new("test-model").with_response("hello world");
        assert_eq!(engine.decode(&[0i16; 100]).unwrap(), "hello world");
        assert!(engine.is_ready());
    }

    #[test]
    fn test_mock_engine_failure() {
        let engine = MockSpeechEngine::new("test-model").with_failure();
        assert!(engine.decode(&[0i16; 100]).is_err());
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_samples_from_bytes_little_endian() {
        let bytes = chunk_from_samples(&[0, 16384, -16384, 32767, -32768]);
        let samples: Vec<i16> = samples_from_bytes(&bytes).collect();
        assert_eq!(samples, vec![0, 16384, -16384, 32767, -32768]);
    }

    #[test]
    fn test_samples_from_bytes_drops_trailing_odd_byte() {
        let samples: Vec<i16> = samples_from_bytes(&[0x01, 0x00, 0xFF]).collect();
        assert_eq!(samples, vec![1]);
    }

    #[test]
    fn test_model_path_resolution() {
        let provider = LocalProvider::new(PathBuf::from("/models"));
        assert_eq!(
            provider.model_path("base.en"),
            PathBuf::from("/models/ggml-base.en.bin")
        );
    }

    #[test]
    fn test_whisper_engine_missing_model_file() {
        let result = WhisperEngine::new(Path::new("/nonexistent/model.bin"), Language::Auto);
        assert!(matches!(result, Err(SottoError::ModelNotFound { .. })));
    }

    #[tokio::test]
    async fn test_connect_resolves_missing_model_to_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(dir.path().to_path_buf());
        let options = ConnectOptions {
            model: "base.en".to_string(),
            ..Default::default()
        };
        let result = provider.connect(&options).await;
        assert!(matches!(result, Err(SottoError::ModelNotFound { .. })));
    }

    #[tokio::test]
    async fn test_send_audio_before_connect_is_not_connected() {
        let provider = LocalProvider::with_engine(Arc::new(MockSpeechEngine::new("m")));
        let result = provider.send_audio(vec![0, 0]).await;
        assert!(matches!(result, Err(SottoError::NotConnected)));
    }

    #[tokio::test]
    async fn test_commit_emits_single_committed_event() {
        let provider = LocalProvider::with_engine(Arc::new(
            MockSpeechEngine::new("m").with_response("buffered text"),
        ));
        let mut events = provider.connect(&ConnectOptions::default()).await.unwrap();
        assert_eq!(events.recv().await, Some(StreamingEvent::SessionStarted));

        provider
            .send_audio(chunk_from_samples(&[100i16; 160]))
            .await
            .unwrap();
        provider.commit().await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(StreamingEvent::Committed("buffered text".to_string()))
        );
    }

    #[tokio::test]
    async fn test_commit_decode_failure_is_error_event_not_panic() {
        let provider = LocalProvider::with_engine(Arc::new(
            MockSpeechEngine::new("m").with_failure(),
        ));
        let mut events = provider.connect(&ConnectOptions::default()).await.unwrap();
        assert_eq!(events.recv().await, Some(StreamingEvent::SessionStarted));

        provider.commit().await.unwrap();

        match events.recv().await {
            Some(StreamingEvent::Error(detail)) => {
                assert!(detail.contains("mock decode failure"));
            }
            other => panic!("Expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_closes_events() {
        let provider = LocalProvider::with_engine(Arc::new(MockSpeechEngine::new("m")));
        let mut events = provider.connect(&ConnectOptions::default()).await.unwrap();
        assert_eq!(events.recv().await, Some(StreamingEvent::SessionStarted));

        provider.disconnect().await;
        provider.disconnect().await;

        // Event stream terminates once the provider lets go of the sender.
        assert_eq!(events.recv().await, None);

        assert!(matches!(
            provider.send_audio(vec![0, 0]).await,
            Err(SottoError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_buffer_cleared_between_sessions() {
        let provider = LocalProvider::with_engine(Arc::new(
            MockSpeechEngine::new("m").with_response("x"),
        ));
        let mut events = provider.connect(&ConnectOptions::default()).await.unwrap();
        provider.send_audio(vec![1, 0, 2, 0]).await.unwrap();
        provider.disconnect().await;
        while events.recv().await.is_some() {}

        // Reconnect: previous session's audio must not leak in.
        let _events = provider.connect(&ConnectOptions::default()).await.unwrap();
        assert!(provider.buffer.lock().unwrap().is_empty());
    }
}
