//! Soniox streaming provider.
//!
//! The first message after the upgrade is a JSON configuration carrying the
//! API key and audio format; audio then flows as raw binary PCM frames.
//! Results arrive as token batches, each token individually marked
//! final/non-final, with a sentinel token (`<fin>`) signaling that endpoint
//! detection fired and finalized text should be flushed.

use crate::error::{Result, SottoError};
use crate::provider::ws::{self, FrameDecoder, WsLink};
use crate::provider::{ConnectOptions, EventStream, Language, Provider, StreamingEvent};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

const NAME: &str = "soniox";
const URL: &str = "wss://stt-rt.soniox.com/transcribe-websocket";

/// Sentinel token emitted by the server when an endpoint is detected.
const FLUSH_TOKEN: &str = "<fin>";

pub struct SonioxProvider {
    api_key: Option<String>,
    link: Arc<WsLink>,
}

impl SonioxProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            link: Arc::new(WsLink::new(NAME)),
        }
    }

    fn config_message(api_key: &str, options: &ConnectOptions) -> serde_json::Value {
        let mut config = json!({
            "api_key": api_key,
            "model": options.model,
            "audio_format": "pcm_s16le",
            "sample_rate": options.sample_rate,
            "num_channels": 1,
            "enable_endpoint_detection": true,
        });
        match &options.language {
            Language::Code(code) => {
                config["language_hints"] = json!([code]);
            }
            Language::Auto => {
                config["enable_language_identification"] = json!(true);
            }
        }
        if !options.vocabulary.is_empty() {
            config["context"] = json!(options.vocabulary.join(", "));
        }
        config
    }
}

/// Token-batch framing.
///
/// Invariant: a final token stabilizes all text received before it, so any
/// provisional text carried so far is promoted when a final token arrives.
/// Non-final tokens in a batch replace the provisional tail.
#[derive(Default)]
struct TokenDecoder {
    finalized: String,
    pending: String,
}

impl FrameDecoder for TokenDecoder {
    fn handle(&mut self, text: &str) -> Vec<StreamingEvent> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        if let Some(code) = value.get("error_code").and_then(|c| c.as_i64()) {
            let message = value["error_message"].as_str().unwrap_or("unknown error");
            return vec![StreamingEvent::Error(format!("{} ({})", message, code))];
        }

        let Some(tokens) = value["tokens"].as_array() else {
            return Vec::new();
        };
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut flush = false;
        let mut batch_pending = String::new();
        for token in tokens {
            let text = token["text"].as_str().unwrap_or("");
            if text == FLUSH_TOKEN {
                flush = true;
            } else if token["is_final"].as_bool().unwrap_or(false) {
                self.finalized.push_str(&self.pending);
                self.pending.clear();
                self.finalized.push_str(text);
            } else {
                batch_pending.push_str(text);
            }
        }
        if !batch_pending.is_empty() {
            self.pending = batch_pending;
        }

        if flush {
            let committed = std::mem::take(&mut self.finalized);
            self.pending.clear();
            let committed = committed.trim().to_string();
            if committed.is_empty() {
                return Vec::new();
            }
            return vec![StreamingEvent::Committed(committed)];
        }

        let display = format!("{}{}", self.finalized, self.pending)
            .trim()
            .to_string();
        if display.is_empty() {
            Vec::new()
        } else {
            vec![StreamingEvent::Partial(display)]
        }
    }
}

#[async_trait]
impl Provider for SonioxProvider {
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

        let (sink, stream) = ws::connect(NAME, URL, &[]).await?;
        self.link.install(sink).await;

        // Session configuration must be the first frame on the wire.
        let config = Self::config_message(&api_key, options);
        self.link.send_json(&config).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(StreamingEvent::SessionStarted).ok();

        let reader = tokio::spawn(ws::read_loop(stream, tx, TokenDecoder::default()));
        self.link.track(reader);

        Ok(rx)
    }

    async fn send_audio(&self, chunk: Vec<u8>) -> Result<()> {
        self.link.send_binary(chunk).await
    }

    async fn commit(&self) -> Result<()> {
        // An empty text frame marks end of audio; the server answers by
        // finalizing everything outstanding and emitting the flush token.
        self.link.send_text(String::new()).await
    }

    async fn disconnect(&self) {
        self.link.shutdown(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::VocabularyList;

    fn batch(tokens: &[(&str, bool)]) -> String {
        let tokens: Vec<serde_json::Value> = tokens
            .iter()
            .map(|(text, is_final)| json!({"text": text, "is_final": is_final}))
            .collect();
        json!({"tokens": tokens}).to_string()
    }

    #[test]
    fn test_config_message_shape() {
        let options = ConnectOptions {
            model: "stt-rt-preview".to_string(),
            language: Language::Code("en".to_string()),
            vocabulary: VocabularyList::new(["Tokio".to_string(), "serde".to_string()]),
            ..Default::default()
        };
        let config = SonioxProvider::config_message("sk-test", &options);

        assert_eq!(config["api_key"], "sk-test");
        assert_eq!(config["model"], "stt-rt-preview");
        assert_eq!(config["audio_format"], "pcm_s16le");
        assert_eq!(config["sample_rate"], 16000);
        assert_eq!(config["language_hints"], json!(["en"]));
        assert_eq!(config["context"], "Tokio, serde");
    }

    #[test]
    fn test_config_message_auto_language() {
        let config = SonioxProvider::config_message("k", &ConnectOptions::default());
        assert_eq!(config["enable_language_identification"], json!(true));
        assert!(config.get("language_hints").is_none());
        assert!(config.get("context").is_none());
    }

    #[test]
    fn test_decoder_nonfinal_tokens_are_partial() {
        let mut decoder = TokenDecoder::default();
        let events = decoder.handle(&batch(&[("he", false)]));
        assert_eq!(events, vec![StreamingEvent::Partial("he".to_string())]);
    }

    #[test]
    fn test_decoder_sentinel_flushes_finalized_text() {
        let mut decoder = TokenDecoder::default();
        decoder.handle(&batch(&[("he", false)]));

        let events = decoder.handle(&batch(&[("llo", true), (FLUSH_TOKEN, true)]));
        assert_eq!(events, vec![StreamingEvent::Committed("hello".to_string())]);
    }

    #[test]
    fn test_decoder_resets_after_flush() {
        let mut decoder = TokenDecoder::default();
        decoder.handle(&batch(&[("he", false)]));
        decoder.handle(&batch(&[("llo", true), (FLUSH_TOKEN, true)]));

        // The accumulator starts over for the next utterance.
        let events = decoder.handle(&batch(&[("again", false)]));
        assert_eq!(events, vec![StreamingEvent::Partial("again".to_string())]);
    }

    #[test]
    fn test_decoder_final_token_stabilizes_pending_prefix() {
        let mut decoder = TokenDecoder::default();
        decoder.handle(&batch(&[("good ", false)]));
        let events = decoder.handle(&batch(&[("morning", true), (" all", false)]));
        assert_eq!(
            events,
            vec![StreamingEvent::Partial("good morning all".to_string())]
        );
    }

    #[test]
    fn test_decoder_nonfinal_batch_replaces_previous_tail() {
        let mut decoder = TokenDecoder::default();
        decoder.handle(&batch(&[("helo", false)]));
        let events = decoder.handle(&batch(&[("hello", false)]));
        assert_eq!(events, vec![StreamingEvent::Partial("hello".to_string())]);
    }

    #[test]
    fn test_decoder_error_message() {
        let mut decoder = TokenDecoder::default();
        let events = decoder.handle(
            &json!({"error_code": 401, "error_message": "invalid api key"}).to_string(),
        );
        assert_eq!(
            events,
            vec![StreamingEvent::Error("invalid api key (401)".to_string())]
        );
    }

    #[test]
    fn test_decoder_ignores_empty_batches_and_garbage() {
        let mut decoder = TokenDecoder::default();
        assert!(decoder.handle(&json!({"tokens": []}).to_string()).is_empty());
        assert!(decoder.handle(&json!({"finished": true}).to_string()).is_empty());
        assert!(decoder.handle("garbage").is_empty());
    }

    #[tokio::test]
    async fn test_connect_without_key_is_missing_credential() {
        let provider = SonioxProvider::new(None);
        let result = provider.connect(&ConnectOptions::default()).await;
        assert!(matches!(result, Err(SottoError::MissingCredential { .. })));
    }

    #[tokio::test]
    async fn test_commit_before_connect_is_not_connected() {
        let provider = SonioxProvider::new(Some("key".to_string()));
        assert!(matches!(
            provider.commit().await,
            Err(SottoError::NotConnected)
        ));
    }
}
