//! Per-device session context
//!
//! A session is created on connect and destroyed on disconnect. It owns the
//! dialogue history exclusively and carries the collaborator handles the
//! dispatch core works through: device transport, speech sink, language
//! model, wake word responder, worker pool, and the dispatch bridge back to
//! the session's event loop task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::bridge::{DispatchBridge, DispatchJob, WorkerPool};
use crate::dialogue::{Dialogue, Message, Role};
use crate::llm::LanguageModel;
use crate::transport::{DeviceTransport, OutboundFrame};
use crate::voice::{SpeechSink, WakeWordResponder};

/// Everything needed to assemble a session
pub struct SessionParams {
    /// Unique session identifier
    pub id: String,
    /// Device identifier from the connection handshake
    pub device_id: String,
    /// Initial system prompt, if any
    pub system_prompt: Option<String>,
    /// Verbatim utterances that end the session
    pub exit_phrases: Vec<String>,
    /// Capacity of the dispatch job queue
    pub dispatch_queue: usize,
    /// Device transport handle
    pub transport: Arc<dyn DeviceTransport>,
    /// Speech output sink
    pub speech: Arc<dyn SpeechSink>,
    /// Language model, absent when no endpoint is configured
    pub model: Option<Arc<dyn LanguageModel>>,
    /// Whether utterances go through intent analysis before chat
    pub intent_analysis: bool,
    /// Wake word responder, absent when no wake words are configured
    pub wake_word: Option<Arc<dyn WakeWordResponder>>,
    /// Worker pool for blocking dispatch work
    pub workers: Arc<WorkerPool>,
}

/// One device connection's context
pub struct Session {
    id: String,
    device_id: String,
    exit_phrases: Vec<String>,
    dialogue: Mutex<Dialogue>,
    client_abort: AtomicBool,
    close_requested: AtomicBool,
    transport: Arc<dyn DeviceTransport>,
    speech: Arc<dyn SpeechSink>,
    model: Option<Arc<dyn LanguageModel>>,
    intent_analysis: bool,
    wake_word: Option<Arc<dyn WakeWordResponder>>,
    workers: Arc<WorkerPool>,
    bridge: DispatchBridge,
    turn_lock: tokio::sync::Mutex<()>,
}

impl Session {
    /// Assemble a session, returning it together with the dispatch job
    /// receiver to hand to [`crate::bridge::run_dispatch_loop`]
    #[must_use]
    pub fn new(params: SessionParams) -> (Arc<Self>, mpsc::Receiver<DispatchJob>) {
        let (bridge, jobs) = DispatchBridge::channel(params.dispatch_queue.max(1));
        let dialogue = params
            .system_prompt
            .map_or_else(Dialogue::new, |prompt| Dialogue::with_system_prompt(prompt));

        let session = Arc::new(Self {
            id: params.id,
            device_id: params.device_id,
            exit_phrases: params.exit_phrases,
            dialogue: Mutex::new(dialogue),
            client_abort: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            transport: params.transport,
            speech: params.speech,
            model: params.model,
            intent_analysis: params.intent_analysis,
            wake_word: params.wake_word,
            workers: params.workers,
            bridge,
            turn_lock: tokio::sync::Mutex::new(()),
        });
        (session, jobs)
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Device identifier
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Utterances that end the session
    #[must_use]
    pub fn exit_phrases(&self) -> &[String] {
        &self.exit_phrases
    }

    /// Run a closure against the locked dialogue
    pub fn with_dialogue<R>(&self, f: impl FnOnce(&mut Dialogue) -> R) -> R {
        let mut guard = self.dialogue.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Clone the dialogue history for the language model
    #[must_use]
    pub fn dialogue_snapshot(&self) -> Vec<Message> {
        self.with_dialogue(|d| d.snapshot())
    }

    /// Speak text and record it as an assistant message
    pub fn speak_and_record(&self, text: &str) {
        self.speech.speak(text);
        self.with_dialogue(|d| d.put(Role::Assistant, text));
    }

    /// Echo recognized text back to the device before dispatch
    pub fn echo_recognized(&self, text: &str) {
        if let Err(e) = self.transport.send(OutboundFrame::Stt {
            text: text.to_string(),
        }) {
            tracing::warn!(session_id = %self.id, error = %e, "failed to echo recognized text");
        }
    }

    /// Device transport handle
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn DeviceTransport> {
        &self.transport
    }

    /// Speech sink handle
    #[must_use]
    pub fn speech(&self) -> &Arc<dyn SpeechSink> {
        &self.speech
    }

    /// Language model, if an endpoint is configured
    #[must_use]
    pub fn model(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.model.as_ref()
    }

    /// Whether utterances go through intent analysis before chat
    #[must_use]
    pub const fn intent_analysis(&self) -> bool {
        self.intent_analysis
    }

    /// Wake word responder, if configured
    #[must_use]
    pub fn wake_word(&self) -> Option<&Arc<dyn WakeWordResponder>> {
        self.wake_word.as_ref()
    }

    /// Worker pool for blocking dispatch work
    #[must_use]
    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    /// Bridge to this session's dispatch task
    #[must_use]
    pub fn bridge(&self) -> &DispatchBridge {
        &self.bridge
    }

    /// Serialize conversation turns on this session
    ///
    /// Intent resolution must not run concurrently with itself; every
    /// caller (session reader, event injection) holds this for the turn.
    pub async fn lock_turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.turn_lock.lock().await
    }

    /// Set the client abort flag (device asked to stop speaking)
    pub fn set_abort(&self) {
        self.client_abort.store(true, Ordering::SeqCst);
    }

    /// Clear the client abort flag; done at the start of each dispatch
    pub fn clear_abort(&self) {
        self.client_abort.store(false, Ordering::SeqCst);
    }

    /// Whether the device asked to abort the current reply
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.client_abort.load(Ordering::SeqCst)
    }

    /// Ask the connection to close after in-flight work settles
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.transport.send(OutboundFrame::Goodbye) {
            tracing::debug!(session_id = %self.id, error = %e, "goodbye frame not delivered");
        }
    }

    /// Whether a close has been requested
    #[must_use]
    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }
}
