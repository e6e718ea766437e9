//! Deepgram streaming provider.
//!
//! Raw binary PCM frames over `wss://api.deepgram.com/v1/listen`, with the
//! session configured entirely through URL query parameters. Non-final
//! results fully replace the current partial display; `is_final` results
//! accumulate as stable segments. The remote end tears down idle
//! connections, so a keepalive message goes out every 5 seconds for the
//! session's duration.

use crate::defaults;
use crate::error::{Result, SottoError};
use crate::provider::ws::{self, FrameDecoder, WsLink};
use crate::provider::{ConnectOptions, EventStream, Language, Provider, StreamingEvent};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const NAME: &str = "deepgram";
const BASE_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Keyword biasing cap per session.
const KEYWORD_LIMIT: usize = 100;

pub struct DeepgramProvider {
    api_key: Option<String>,
    link: Arc<WsLink>,
}

impl DeepgramProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            link: Arc::new(WsLink::new(NAME)),
        }
    }

    fn stream_url(options: &ConnectOptions) -> String {
        let mut url = format!(
            "{}?model={}&encoding=linear16&sample_rate={}&channels={}&interim_results=true&smart_format=true&punctuate=true",
            BASE_URL,
            ws::encode_query(&options.model),
            options.sample_rate,
            defaults::CHANNELS,
        );
        match &options.language {
            Language::Code(code) => {
                url.push_str("&language=");
                url.push_str(&ws::encode_query(code));
            }
            Language::Auto => url.push_str("&detect_language=true"),
        }
        for term in options.vocabulary.capped(KEYWORD_LIMIT).terms() {
            url.push_str("&keywords=");
            url.push_str(&ws::encode_query(term));
        }
        url
    }
}

/// Replacement-style framing: each non-final `Results` message carries the
/// whole current utterance, not a delta. Finals join the session's segment
/// list; the displayed partial is finalized-so-far plus the live fragment.
#[derive(Default)]
struct ResultsDecoder {
    finalized: Vec<String>,
}

impl FrameDecoder for ResultsDecoder {
    fn handle(&mut self, text: &str) -> Vec<StreamingEvent> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        match value["type"].as_str() {
            Some("Results") => {
                let transcript = value["channel"]["alternatives"][0]["transcript"]
                    .as_str()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if transcript.is_empty() {
                    return Vec::new();
                }
                if value["is_final"].as_bool().unwrap_or(false) {
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
                let detail = value["description"]
                    .as_str()
                    .or_else(|| value["message"].as_str())
                    .unwrap_or("unknown error");
                vec![StreamingEvent::Error(detail.to_string())]
            }
            // Metadata, SpeechStarted, UtteranceEnd carry nothing we surface.
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Provider for DeepgramProvider {
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
        let headers = [("Authorization", format!("Token {}", api_key))];
        let (sink, stream) = ws::connect(NAME, &url, &headers).await?;
        self.link.install(sink).await;

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(StreamingEvent::SessionStarted).ok();

        let reader = tokio::spawn(ws::read_loop(stream, tx, ResultsDecoder::default()));
        self.link.track(reader);

        let link = self.link.clone();
        let keepalive = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(defaults::KEEPALIVE_INTERVAL_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the first immediate tick.
            interval.tick().await;
            loop {
                interval.tick().await;
                if link.send_json(&json!({"type": "KeepAlive"})).await.is_err() {
                    break;
                }
            }
        });
        self.link.track(keepalive);

        Ok(rx)
    }

    async fn send_audio(&self, chunk: Vec<u8>) -> Result<()> {
        self.link.send_binary(chunk).await
    }

    async fn commit(&self) -> Result<()> {
        self.link.send_json(&json!({"type": "Finalize"})).await
    }

    async fn disconnect(&self) {
        self.link.shutdown(Some(json!({"type": "CloseStream"}))).await;
    }
}
