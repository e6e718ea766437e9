//! Default configuration constants for sotto.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Audio sample rate in Hz expected by every provider.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and bandwidth for voice applications.
pub const SAMPLE_RATE: u32 = 16_000;

/// Number of audio channels. Dictation input is always mono.
pub const CHANNELS: u32 = 1;

/// Default model selection, as `provider/model`.
pub const DEFAULT_MODEL: &str = "deepgram/nova-3";

/// Default language code for transcription.
///
/// "auto" lets the backend detect the spoken language. Set a specific code
/// (e.g. "en", "de") to force a language.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Default directory for on-device model files.
pub const DEFAULT_MODEL_DIR: &str = "models";

/// How long `stop()` waits for the backend to acknowledge a commit before
/// returning whatever text was finalized so far.
pub const COMMIT_TIMEOUT_SECS: u64 = 10;

/// Deadline for the WebSocket handshake when opening a session.
pub const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Interval between keepalive messages for providers whose remote end tears
/// down idle connections.
pub const KEEPALIVE_INTERVAL_SECS: u64 = 5;
