//! Live dictation session orchestration.
//!
//! One session drives one provider connection. Audio flows
//! caller → bridge → send loop → provider → network; events flow
//! provider → event loop → transcript accumulator. `stop()` drains the
//! bridge before committing, then races the acknowledgment against a fixed
//! timer, so callers always get an answer in bounded time and the
//! connection is always released.

use crate::bridge::{self, AudioBridge};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::defaults;
use crate::error::{Result, SottoError};
use crate::provider::{
    self, ConnectOptions, Language, ModelSelection, Provider, StreamingEvent,
};
use crate::reporter::{ErrorReporter, LogReporter};
use crate::vocabulary::{VocabularyList, VocabularyStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Callback receiving live partial text for display.
pub type PartialCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Lifecycle states for a dictation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session in progress, ready to start
    Idle,
    /// Waiting on the provider handshake
    Connecting,
    /// Audio flowing, events being consumed
    Streaming,
    /// Stop requested, waiting for the commit acknowledgment
    Committing,
    /// Session ended normally
    Done,
    /// Session ended with an error
    Failed,
    /// Session was cancelled by the caller
    Cancelled,
}

impl SessionState {
    /// Check if this state allows starting a new session
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Failed | SessionState::Cancelled
        )
    }

    /// Check if a session is in progress
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Streaming | SessionState::Committing
        )
    }
}

/// Events streamed to observers over the optional event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The provider accepted the session
    Started { provider: String },
    /// Live partial text (only while streaming)
    Partial { text: String },
    /// A segment was finalized
    Committed { text: String },
    /// Non-fatal provider error
    ProviderError { detail: String },
    /// Session finished normally with the given final text
    Finished { text: String },
    /// Session was cancelled
    Cancelled,
}

struct SessionInner {
    state: Mutex<SessionState>,
    provider: Mutex<Option<Arc<dyn Provider>>>,
    bridge: Mutex<Option<AudioBridge>>,
    send_task: Mutex<Option<JoinHandle<()>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    segments: Mutex<Vec<String>>,
    commit_ack: Mutex<Option<oneshot::Sender<()>>>,
    on_partial: Mutex<Option<PartialCallback>>,
    cancel_requested: AtomicBool,
    runtime: Mutex<Option<tokio::runtime::Handle>>,
    reporter: Arc<dyn ErrorReporter>,
    event_tx: Option<crossbeam_channel::Sender<SessionEvent>>,
    commit_timeout: Duration,
}

impl SessionInner {
    fn state(&self) -> SessionState {
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Failed)
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.event_tx {
            tx.send(event).ok();
        }
    }
}

/// Manages one live dictation session at a time.
///
/// All methods take `&self`; clones share the same session. Callers must
/// serialize session lifetimes — starting a new session while one is active
/// is a contract violation and is not guarded here.
#[derive(Clone)]
pub struct DictationSession {
    inner: Arc<SessionInner>,
}

impl Default for DictationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DictationSession {
    /// Creates a session manager with default settings.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState::Idle),
                provider: Mutex::new(None),
                bridge: Mutex::new(None),
                send_task: Mutex::new(None),
                event_task: Mutex::new(None),
                segments: Mutex::new(Vec::new()),
                commit_ack: Mutex::new(None),
                on_partial: Mutex::new(None),
                cancel_requested: AtomicBool::new(false),
                runtime: Mutex::new(None),
                reporter: Arc::new(LogReporter),
                event_tx: None,
                commit_timeout: Duration::from_secs(defaults::COMMIT_TIMEOUT_SECS),
            }),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_reporter(self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.rebuild(|inner| inner.reporter = reporter)
    }

    /// Overrides how long `stop()` waits for a commit acknowledgment.
    pub fn with_commit_timeout(self, timeout: Duration) -> Self {
        self.rebuild(|inner| inner.commit_timeout = timeout)
    }

    /// Streams session events to the given channel (non-blocking sends).
    pub fn with_event_sender(self, tx: crossbeam_channel::Sender<SessionEvent>) -> Self {
        self.rebuild(|inner| inner.event_tx = Some(tx))
    }

    // Builder methods run before the session is shared, when the Arc is
    // still uniquely owned.
    fn rebuild(self, configure: impl FnOnce(&mut SessionInner)) -> Self {
        let mut inner = Arc::into_inner(self.inner)
            .unwrap_or_else(|| panic!("session builders must run before the session is cloned"));
        configure(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Sets the live partial-text display callback.
    pub fn on_partial(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        if let Ok(mut guard) = self.inner.on_partial.lock() {
            *guard = Some(Box::new(callback));
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Starts a session against the provider for `model`, looking up
    /// credentials, vocabulary, and language from the given collaborators.
    pub async fn start_model(
        &self,
        model: &ModelSelection,
        credentials: &dyn CredentialStore,
        vocabulary: &dyn VocabularyStore,
        config: &Config,
    ) -> Result<()> {
        let provider =
            provider::create_provider(model.provider, credentials, &config.stt.model_dir);
        let options = ConnectOptions {
            model: model.model.clone(),
            language: Language::from_config(&config.stt.language),
            vocabulary: VocabularyList::new(vocabulary.terms()),
            sample_rate: defaults::SAMPLE_RATE,
        };
        self.start(provider, &options).await
    }

    /// Starts a session on an already-built provider.
    ///
    /// Connect-time failures propagate to the caller and fail the session.
    /// If `cancel()` arrives while the handshake is suspended, the provider
    /// is disconnected exactly once and streaming is never entered.
    pub async fn start(
        &self,
        provider: Arc<dyn Provider>,
        options: &ConnectOptions,
    ) -> Result<()> {
        let inner = &self.inner;
        inner.cancel_requested.store(false, Ordering::SeqCst);
        if let Ok(mut runtime) = inner.runtime.lock() {
            *runtime = Some(tokio::runtime::Handle::current());
        }
        if let Ok(mut segments) = inner.segments.lock() {
            segments.clear();
        }
        inner.set_state(SessionState::Connecting);

        let mut events = match provider.connect(options).await {
            Ok(events) => events,
            Err(e) => {
                inner.set_state(SessionState::Failed);
                return Err(e);
            }
        };

        // cancel() while connect was suspended: the provider slot was still
        // empty, so the disconnect happens here, exactly once.
        if inner.cancel_requested.load(Ordering::SeqCst) {
            provider.disconnect().await;
            return Ok(());
        }

        if let Ok(mut slot) = inner.provider.lock() {
            *slot = Some(provider.clone());
        }

        let (audio_bridge, mut audio_rx) = bridge::channel();
        if let Ok(mut slot) = inner.bridge.lock() {
            *slot = Some(audio_bridge);
        }

        inner.set_state(SessionState::Streaming);

        // Send loop: best-effort delivery. Individual send failures are
        // reported and skipped; they must not end a live recording.
        let send_provider = provider.clone();
        let send_reporter = inner.reporter.clone();
        let send_task = tokio::spawn(async move {
            while let Some(chunk) = audio_rx.recv().await {
                if let Err(e) = send_provider.send_audio(chunk).await {
                    send_reporter.report("send", &e.to_string());
                }
            }
        });
        if let Ok(mut slot) = inner.send_task.lock() {
            *slot = Some(send_task);
        }

        // Event loop: the sole consumer of the provider's event sequence.
        let event_inner = self.inner.clone();
        let provider_name = provider.name().to_string();
        let event_task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    StreamingEvent::SessionStarted => {
                        event_inner.emit(SessionEvent::Started {
                            provider: provider_name.clone(),
                        });
                    }
                    StreamingEvent::Partial(text) => {
                        // Suppressed outside streaming so a stopped recording
                        // doesn't flicker stale partials at the UI.
                        if event_inner.state() != SessionState::Streaming {
                            continue;
                        }
                        if let Ok(guard) = event_inner.on_partial.lock()
                            && let Some(callback) = guard.as_ref()
                        {
                            callback(&text);
                        }
                        event_inner.emit(SessionEvent::Partial { text });
                    }
                    StreamingEvent::Committed(text) => {
                        if !text.trim().is_empty() {
                            if let Ok(mut segments) = event_inner.segments.lock() {
                                segments.push(text.clone());
                            }
                        }
                        if let Ok(mut ack) = event_inner.commit_ack.lock()
                            && let Some(ack) = ack.take()
                        {
                            ack.send(()).ok();
                        }
                        event_inner.emit(SessionEvent::Committed { text });
                    }
                    StreamingEvent::Error(detail) => {
                        event_inner.reporter.report(&provider_name, &detail);
                        event_inner.emit(SessionEvent::ProviderError { detail });
                    }
                }
            }
        });
        if let Ok(mut slot) = inner.event_task.lock() {
            *slot = Some(event_task);
        }

        Ok(())
    }

    /// Enqueues captured audio. Callable from any thread; never suspends or
    /// blocks. A no-op outside a live session.
    pub fn push_audio(&self, chunk: Vec<u8>) {
        if let Ok(guard) = self.inner.bridge.lock()
            && let Some(bridge) = guard.as_ref()
        {
            bridge.push(chunk);
        }
    }

    /// Stops the session and returns the final text: every finalized segment
    /// joined by single spaces, empty if nothing was finalized.
    ///
    /// The bridge is drained before the commit goes out, so the commit
    /// strictly follows all previously enqueued audio. The commit
    /// acknowledgment is raced against a fixed timer; a timeout degrades to
    /// returning whatever was finalized so far, it never raises.
    pub async fn stop(&self) -> Result<String> {
        let inner = &self.inner;
        inner.set_state(SessionState::Committing);

        // Hand every queued chunk to the provider before committing.
        if let Ok(guard) = inner.bridge.lock()
            && let Some(audio_bridge) = guard.as_ref()
        {
            audio_bridge.finish();
        }
        let send_task = inner.send_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = send_task {
            task.await.ok();
        }

        let provider = inner.provider.lock().ok().and_then(|guard| guard.clone());
        let Some(provider) = provider else {
            inner.set_state(SessionState::Failed);
            self.cleanup().await;
            return Err(SottoError::NotConnected);
        };

        // Arm a fresh one-shot acknowledgment, then commit.
        let (ack_tx, ack_rx) = oneshot::channel();
        if let Ok(mut ack) = inner.commit_ack.lock() {
            *ack = Some(ack_tx);
        }

        if let Err(e) = provider.commit().await {
            inner.set_state(SessionState::Failed);
            self.cleanup().await;
            return Err(e);
        }

        // Whichever resolves first wins; the loser is dropped.
        tokio::select! {
            _ = ack_rx => {}
            _ = tokio::time::sleep(inner.commit_timeout) => {
                inner.reporter.report(
                    "commit",
                    "no acknowledgment before deadline; returning finalized text",
                );
            }
        }

        let text = inner
            .segments
            .lock()
            .map(|segments| segments.join(" "))
            .unwrap_or_default();

        inner.set_state(SessionState::Done);
        inner.emit(SessionEvent::Finished { text: text.clone() });
        self.cleanup().await;
        Ok(text)
    }

    /// Abandons the session without waiting for results. Synchronous: both
    /// loops are aborted, the bridge is closed, any pending commit waiter is
    /// released, and the disconnect is issued without waiting for it.
    ///
    /// Idempotent — repeated calls find nothing left to release.
    pub fn cancel(&self) {
        let inner = &self.inner;
        inner.cancel_requested.store(true, Ordering::SeqCst);
        inner.set_state(SessionState::Cancelled);

        if let Ok(mut guard) = inner.on_partial.lock() {
            guard.take();
        }
        if let Ok(mut slot) = inner.event_task.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
        if let Ok(mut slot) = inner.send_task.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
        if let Ok(mut guard) = inner.bridge.lock()
            && let Some(audio_bridge) = guard.take()
        {
            audio_bridge.finish();
        }
        if let Ok(mut ack) = inner.commit_ack.lock() {
            ack.take();
        }

        let provider = inner.provider.lock().ok().and_then(|mut guard| guard.take());
        if let Some(provider) = provider {
            // Fire-and-forget: the local session stops waiting on results;
            // remote teardown completes on its own time.
            let handle = inner.runtime.lock().ok().and_then(|guard| guard.clone());
            if let Some(handle) = handle {
                handle.spawn(async move {
                    provider.disconnect().await;
                });
            }
        }

        inner.emit(SessionEvent::Cancelled);
    }

    /// Single idempotent teardown shared by every exit path.
    async fn cleanup(&self) {
        let inner = &self.inner;
        if let Ok(mut slot) = inner.event_task.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
        if let Ok(mut slot) = inner.send_task.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
        if let Ok(mut guard) = inner.bridge.lock()
            && let Some(audio_bridge) = guard.take()
        {
            audio_bridge.finish();
        }
        if let Ok(mut ack) = inner.commit_ack.lock() {
            ack.take();
        }

        let provider = inner.provider.lock().ok().and_then(|mut guard| guard.take());
        if let Some(provider) = provider {
            provider.disconnect().await;
        }

        // A normal stop ends back at idle, ready for the next recording.
        // Failure and cancellation keep their state for the caller to see.
        if inner.state() == SessionState::Done {
            inner.set_state(SessionState::Idle);
        }
    }
}
