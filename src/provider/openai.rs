//! OpenAI Realtime transcription provider.
//!
//! Audio travels as JSON envelopes with base64 payloads rather than binary
//! frames, and the session is configured with one update message right after
//! the upgrade. Results arrive as transcript deltas that accumulate until an
//! explicit commit is answered by a completed event.

use crate::error::{Result, SottoError};
use crate::provider::ws::{self, FrameDecoder, WsLink};
use crate::provider::{ConnectOptions, EventStream, Language, Provider, StreamingEvent};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

const NAME: &str = "openai";
const URL: &str = "wss://api.openai.com/v1/realtime?intent=transcription";

pub struct OpenAiProvider {
    api_key: Option<String>,
    link: Arc<WsLink>,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            link: Arc::new(WsLink::new(NAME)),
        }
    }

    fn session_update(options: &ConnectOptions) -> serde_json::Value {
        let mut transcription = json!({ "model": options.model });
        if let Language::Code(code) = &options.language {
            transcription["language"] = json!(code);
        }
        if !options.vocabulary.is_empty() {
            // No dedicated biasing field; custom terms ride in the prompt.
            transcription["prompt"] = json!(options.vocabulary.join(", "));
        }
        json!({
            "type": "transcription_session.update",
            "session": {
                "input_audio_format": "pcm16",
                "input_audio_transcription": transcription,
                // Commits are driven by the app, not server VAD.
                "turn_detection": null,
            }
        })
    }
}

/// Delta-accumulation framing: each delta appends to a running accumulator;
/// the completed event commits and resets it.
#[derive(Default)]
struct DeltaDecoder {
    accumulator: String,
    started: bool,
}

impl FrameDecoder for DeltaDecoder {
    fn handle(&mut self, text: &str) -> Vec<StreamingEvent> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        match value["type"].as_str() {
            Some("transcription_session.created") | Some("transcription_session.updated") => {
                if self.started {
                    return Vec::new();
                }
                self.started = true;
                vec![StreamingEvent::SessionStarted]
            }
            Some("conversation.item.input_audio_transcription.delta") => {
                let delta = value["delta"].as_str().unwrap_or("");
                if delta.is_empty() {
                    return Vec::new();
                }
                self.accumulator.push_str(delta);
                vec![StreamingEvent::Partial(self.accumulator.clone())]
            }
            Some("conversation.item.input_audio_transcription.completed") => {
                let transcript = value["transcript"]
                    .as_str()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| self.accumulator.trim().to_string());
                self.accumulator.clear();
                if transcript.is_empty() {
                    return Vec::new();
                }
                vec![StreamingEvent::Committed(transcript)]
            }
            Some("error") => {
                let detail = value["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error");
                vec![StreamingEvent::Error(detail.to_string())]
            }
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<EventStream> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| SottoError::MissingCredential {
                provider: NAME.to_string(),
            })?;

        let headers = [
            ("Authorization", format!("Bearer {}", api_key)),
            ("OpenAI-Beta", "realtime=v1".to_string()),
        ];
        let (sink, stream) = ws::connect(NAME, URL, &headers).await?;
        self.link.install(sink).await;

        self.link.send_json(&Self::session_update(options)).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(ws::read_loop(stream, tx, DeltaDecoder::default()));
        self.link.track(reader);

        Ok(rx)
    }

    async fn send_audio(&self, chunk: Vec<u8>) -> Result<()> {
        let envelope = json!({
            "type": "input_audio_buffer.append",
            "audio": BASE64.encode(&chunk),
        });
        self.link.send_json(&envelope).await
    }

    async fn commit(&self) -> Result<()> {
        self.link
            .send_json(&json!({"type": "input_audio_buffer.commit"}))
            .await
    }

    async fn disconnect(&self) {
        self.link.shutdown(None).await;
    }
}
