//! Shared test utilities
//!
//! A scripted language model and a fully wired session harness backed by
//! channel transports, so flows can be driven without a device or a model
//! endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use lark_edge::bridge::run_dispatch_loop;
use lark_edge::config::ToolsConfig;
use lark_edge::{
    ChannelTransport, LanguageModel, Message, OutboundFrame, Result, Session, SessionParams,
    TransportSpeech, UnifiedToolHandler, WakeWordResponder, WorkerPool,
};

/// Language model double returning scripted values
#[derive(Default)]
pub struct ScriptedModel {
    /// Value returned by `detect_intent`
    pub intent: Mutex<Option<String>>,
    /// Value returned by `reply_result`
    pub reply: Mutex<Option<String>>,
    /// Value returned by `complete`
    pub completion: Mutex<Option<String>>,
    /// Recorded `reply_result` invocations as (tool result, original text)
    pub reply_calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    /// Model that reports the given intent JSON
    pub fn with_intent(intent: &str) -> Arc<Self> {
        let model = Self::default();
        *model.intent.lock().unwrap() = Some(intent.to_string());
        Arc::new(model)
    }

    /// Model that reports an intent and refines tool results
    pub fn with_intent_and_reply(intent: &str, reply: &str) -> Arc<Self> {
        let model = Self::with_intent(intent);
        *model.reply.lock().unwrap() = Some(reply.to_string());
        model
    }

    /// Model that never detects anything
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn detect_intent(&self, _dialogue: &[Message], _text: &str) -> Result<Option<String>> {
        Ok(self.intent.lock().unwrap().clone())
    }

    async fn complete(&self, _dialogue: &[Message], _text: &str) -> Result<Option<String>> {
        Ok(self.completion.lock().unwrap().clone())
    }

    fn reply_result(&self, tool_result: &str, original_text: &str) -> Option<String> {
        self.reply_calls
            .lock()
            .unwrap()
            .push((tool_result.to_string(), original_text.to_string()));
        self.reply.lock().unwrap().clone()
    }
}

/// A wired session plus the observable ends of its collaborators
pub struct Harness {
    /// The session under test
    pub session: Arc<Session>,
    /// Its unified tool handler, already initialized
    pub handler: Arc<UnifiedToolHandler>,
    /// Frames the session sent to the device
    pub frames: mpsc::UnboundedReceiver<OutboundFrame>,
}

/// Build a harness with default exit phrases and no wake word
pub async fn harness(model: Option<Arc<ScriptedModel>>) -> Harness {
    harness_with(model, vec!["goodbye".to_string()], None).await
}

/// Build a harness with full control over the session collaborators
pub async fn harness_with(
    model: Option<Arc<ScriptedModel>>,
    exit_phrases: Vec<String>,
    wake_word: Option<Arc<dyn WakeWordResponder>>,
) -> Harness {
    let (transport, frames) = ChannelTransport::channel();
    let speech = TransportSpeech::new(transport.clone());

    let (session, jobs) = Session::new(SessionParams {
        id: "sess_test".to_string(),
        device_id: "dev_test".to_string(),
        system_prompt: Some("You are Lark.".to_string()),
        exit_phrases,
        dispatch_queue: 8,
        transport,
        speech,
        model: model.map(|m| {
            let model: Arc<dyn LanguageModel> = m;
            model
        }),
        intent_analysis: true,
        wake_word,
        workers: WorkerPool::new(2),
    });

    let handler = UnifiedToolHandler::new(&ToolsConfig::default());
    tokio::spawn(run_dispatch_loop(
        Arc::clone(&session),
        Arc::clone(&handler),
        jobs,
    ));
    handler.initialize(&session).await;

    Harness {
        session,
        handler,
        frames,
    }
}

/// Receive the next device frame or panic after two seconds
pub async fn next_frame(frames: &mut mpsc::UnboundedReceiver<OutboundFrame>) -> OutboundFrame {
    tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("timed out waiting for a device frame")
        .expect("transport closed")
}

/// Wait until the dialogue reaches `len` messages or panic after two seconds
pub async fn wait_for_dialogue_len(session: &Arc<Session>, len: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if session.dialogue_snapshot().len() >= len {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "dialogue never reached {len} messages: {:?}",
            session.dialogue_snapshot()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
