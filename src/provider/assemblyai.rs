//! AssemblyAI streaming provider.
//!
//! Raw binary PCM frames over the v3 streaming endpoint, configured through
//! URL query parameters. Results arrive as `Turn` messages: each one carries
//! the whole current turn, replacing the partial display, and `end_of_turn`
//! marks it stable. Finalization relies on server-side endpointing — there is
//! no distinct commit acknowledgment, so the session's generic timeout path
//! governs the stop handshake.

use crate::error::{Result, SottoError};
use crate::provider::ws::{self, FrameDecoder, WsLink};
use crate::provider::{ConnectOptions, EventStream, Language, Provider, StreamingEvent};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

const NAME: &str = "assemblyai";
const BASE_URL: &str = "wss://streaming.assemblyai.com/v3/ws";

/// Key-term biasing cap per session.
const KEYTERM_LIMIT: usize = 100;

pub struct AssemblyAiProvider {
    api_key: Option<String>,
    link: Arc<WsLink>,
}

impl AssemblyAiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            link: Arc::new(WsLink::new(NAME)),
        }
    }

    fn stream_url(options: &ConnectOptions) -> String {
        let mut url = format!(
            "{}?sample_rate={}&encoding=pcm_s16le&format_turns=true",
            BASE_URL, options.sample_rate,
        );
        // The v3 endpoint is English-only unless a language is forced.
        if let Language::Code(code) = &options.language {
            url.push_str("&language=");
            url.push_str(&ws::encode_query(code));
        }
        let keyterms = options.vocabulary.capped(KEYTERM_LIMIT);
        if !keyterms.is_empty() {
            let encoded = serde_json::to_string(keyterms.terms()).unwrap_or_default();
            url.push_str("&keyterms_prompt=");
            url.push_str(&ws::encode_query(&encoded));
        }
        url
    }
}

/// Turn framing: every message replaces the current partial; `end_of_turn`
/// appends to the session's stable segments.
#[derive(Default)]
struct TurnDecoder {
    finalized: Vec<String>,
}

impl FrameDecoder for TurnDecoder {
    fn handle(&mut self, text: &str) -> Vec<StreamingEvent> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        match value["type"].as_str() {
            Some("Begin") => vec![StreamingEvent::SessionStarted],
            Some("Turn") => {
                let transcript = value["transcript"].as_str().unwrap_or("").trim().to_string();
                if transcript.is_empty() {
                    return Vec::new();
                }
                if value["end_of_turn"].as_bool().unwrap_or(false) {
                    self.finalized.push(transcript.clone());
                    vec![StreamingEvent::Committed(transcript)]
                } else {
                    let display = if self.finalized.is_empty() {
                        transcript
                    } else {
                        format!("{} {}", self.finalized.join(" "), transcript)
                    };
                    vec![StreamingEvent::Partial(display)]
                }
            }
            Some("Error") => {
                let detail = value["error"].as_str().unwrap_or("unknown error");
                vec![StreamingEvent::Error(detail.to_string())]
            }
            // Termination acknowledgments carry nothing we surface.
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Provider for AssemblyAiProvider {
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

        let url = Self::stream_url(options);
        let headers = [("Authorization", api_key)];
        let (sink, stream) = ws::connect(NAME, &url, &headers).await?;
        self.link.install(sink).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(ws::read_loop(stream, tx, TurnDecoder::default()));
        self.link.track(reader);

        Ok(rx)
    }

    async fn send_audio(&self, chunk: Vec<u8>) -> Result<()> {
        self.link.send_binary(chunk).await
    }

    async fn commit(&self) -> Result<()> {
        // Endpointing happens server-side when speech stops; there is no
        // finalize control message and no distinct acknowledgment. Committed
        // turns observed so far are already stable.
        Ok(())
    }

    async fn disconnect(&self) {
        self.link.shutdown(Some(json!({"type": "Terminate"}))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::VocabularyList;

    fn turn(transcript: &str, end_of_turn: bool) -> String {
        json!({"type": "Turn", "transcript": transcript, "end_of_turn": end_of_turn})
            .to_string()
    }

    #[test]
    fn test_stream_url_basics() {
        let url = AssemblyAiProvider::stream_url(&ConnectOptions::default());
        assert!(url.starts_with(BASE_URL));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("encoding=pcm_s16le"));
        assert!(url.contains("format_turns=true"));
        assert!(!url.contains("keyterms_prompt"));
    }

    #[test]
    fn test_stream_url_with_keyterms() {
        let options = ConnectOptions {
            vocabulary: VocabularyList::new(["Tokio".to_string()]),
            ..Default::default()
        };
        let url = AssemblyAiProvider::stream_url(&options);
        assert!(url.contains("keyterms_prompt=%5B%22Tokio%22%5D"));
    }

    #[test]
    fn test_decoder_begin_starts_session() {
        let mut decoder = TurnDecoder::default();
        let events = decoder.handle(&json!({"type": "Begin", "id": "abc"}).to_string());
        assert_eq!(events, vec![StreamingEvent::SessionStarted]);
    }

    #[test]
    fn test_decoder_turn_replaces_partial() {
        let mut decoder = TurnDecoder::default();
        decoder.handle(&turn("hel", false));
        let events = decoder.handle(&turn("hello", false));
        assert_eq!(events, vec![StreamingEvent::Partial("hello".to_string())]);
    }

    #[test]
    fn test_decoder_end_of_turn_commits() {
        let mut decoder = TurnDecoder::default();
        let events = decoder.handle(&turn("hello", true));
        assert_eq!(events, vec![StreamingEvent::Committed("hello".to_string())]);

        // Later partials display after the finalized text.
        let events = decoder.handle(&turn("there", false));
        assert_eq!(
            events,
            vec![StreamingEvent::Partial("hello there".to_string())]
        );
    }

    #[test]
    fn test_decoder_error() {
        let mut decoder = TurnDecoder::default();
        let events =
            decoder.handle(&json!({"type": "Error", "error": "rate limited"}).to_string());
        assert_eq!(
            events,
            vec![StreamingEvent::Error("rate limited".to_string())]
        );
    }

    #[test]
    fn test_decoder_ignores_termination_and_empty_turns() {
        let mut decoder = TurnDecoder::default();
        assert!(decoder.handle(&json!({"type": "Termination"}).to_string()).is_empty());
        assert!(decoder.handle(&turn("", false)).is_empty());
    }

    #[tokio::test]
    async fn test_commit_is_a_noop_without_ack() {
        // No connection needed: commit has no wire representation here.
        let provider = AssemblyAiProvider::new(Some("key".to_string()));
        assert!(provider.commit().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_without_key_is_missing_credential() {
        let provider = AssemblyAiProvider::new(None);
        let result = provider.connect(&ConnectOptions::default()).await;
        assert!(matches!(result, Err(SottoError::MissingCredential { .. })));
    }
}
