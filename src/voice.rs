//! Speech output and wake word handling
//!
//! Speech synthesis itself happens downstream (device pipeline); the core
//! only pushes text at a [`SpeechSink`]. Wake word verification follows the
//! transcript-matching approach: normalize, then compare against the
//! configured words.

use std::sync::Arc;

use async_trait::async_trait;

use crate::session::Session;
use crate::transport::{DeviceTransport, OutboundFrame};

/// Sink for assistant speech
pub trait SpeechSink: Send + Sync {
    /// Queue text for synthesis and playback
    fn speak(&self, text: &str);
}

/// Speech sink that forwards text to the device as `tts` frames
pub struct TransportSpeech {
    transport: Arc<dyn DeviceTransport>,
}

impl TransportSpeech {
    /// Create a sink speaking through the given transport
    #[must_use]
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Arc<Self> {
        Arc::new(Self { transport })
    }
}

impl SpeechSink for TransportSpeech {
    fn speak(&self, text: &str) {
        if let Err(e) = self.transport.send(OutboundFrame::Tts {
            text: text.to_string(),
        }) {
            tracing::warn!(error = %e, "failed to queue speech frame");
        }
    }
}

/// Collaborator that may consume an utterance before intent detection
#[async_trait]
pub trait WakeWordResponder: Send + Sync {
    /// Handle the utterance if it is a wake word; returns true if consumed
    async fn consumes(&self, session: &Session, text: &str) -> bool;
}

/// Matches configured wake words and greets the user
pub struct WakeWordGreeter {
    wake_words: Vec<String>,
    greeting: String,
}

impl WakeWordGreeter {
    /// Create a greeter for the given wake words
    ///
    /// Words are normalized to lowercase and trimmed.
    #[must_use]
    pub fn new(wake_words: Vec<String>, greeting: impl Into<String>) -> Self {
        let normalized: Vec<String> = wake_words
            .iter()
            .map(|w| crate::intent::normalize_utterance(w))
            .filter(|w| !w.is_empty())
            .collect();

        tracing::debug!(wake_words = ?normalized, "wake word greeter initialized");

        Self {
            wake_words: normalized,
            greeting: greeting.into(),
        }
    }

    /// The configured wake words
    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }

    fn matches(&self, text: &str) -> Option<&str> {
        let normalized = crate::intent::normalize_utterance(text);
        self.wake_words
            .iter()
            .find(|w| normalized == w.as_str())
            .map(String::as_str)
    }
}

#[async_trait]
impl WakeWordResponder for WakeWordGreeter {
    async fn consumes(&self, session: &Session, text: &str) -> bool {
        let Some(word) = self.matches(text) else {
            return false;
        };

        tracing::info!(wake_word = word, "wake word consumed utterance");

        if let Err(e) = session.transport().send(OutboundFrame::WakeWord {
            wake_word: word.to_string(),
        }) {
            tracing::warn!(error = %e, "failed to send wake word frame");
        }
        session.speak_and_record(&self.greeting);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_words_normalized() {
        let greeter = WakeWordGreeter::new(
            vec!["  Hey LARK  ".to_string(), "lark".to_string()],
            "hello",
        );
        assert_eq!(greeter.wake_words(), &["hey lark", "lark"]);
    }

    #[test]
    fn test_exact_match_only() {
        let greeter = WakeWordGreeter::new(vec!["hey lark".to_string()], "hello");

        assert!(greeter.matches("Hey Lark!").is_some());
        assert!(greeter.matches("  hey lark ").is_some());
        assert!(greeter.matches("hey lark turn on the light").is_none());
    }
}
