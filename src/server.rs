//! WebSocket server and device event surface
//!
//! One WebSocket connection per device. The reader loop parses device
//! frames, drives the intent flow for recognized text (one turn at a
//! time), and feeds IoT descriptors and MCP tunnel replies into the
//! session's tool handler. A small HTTP endpoint lets co-located services
//! inject event utterances into a live session.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::Result;
use crate::bridge::{WorkerPool, run_dispatch_loop};
use crate::config::Config;
use crate::dialogue::Role;
use crate::intent;
use crate::llm::{ChatConfig, LanguageModel, OpenAiChat};
use crate::session::{Session, SessionParams};
use crate::tools::IotDescriptor;
use crate::tools::handler::UnifiedToolHandler;
use crate::transport::ChannelTransport;
use crate::voice::{TransportSpeech, WakeWordGreeter};

/// Shared server state
pub struct AppState {
    config: Config,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

#[derive(Clone)]
struct SessionHandle {
    session: Arc<Session>,
    handler: Arc<UnifiedToolHandler>,
}

impl AppState {
    /// Create state around the loaded configuration
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Number of live device sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Inbound device frame
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    /// Recognized utterance from the device's speech pipeline
    Text { text: String },
    /// Device capability descriptors, sent after the handshake
    IotDescriptors { descriptors: Vec<IotDescriptor> },
    /// Reply frame for the MCP tunnel
    Mcp { payload: Value },
    /// Stop speaking the current reply
    Abort,
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceEventRequest {
    device_id: String,
    text: String,
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/stream", get(ws_upgrade))
        .route("/v1/events/device", post(device_event))
        .with_state(state)
}

/// Bind and serve until interrupted
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "lark edge server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let device_id = query
        .device_id
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, device_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, device_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (transport, mut frames) = ChannelTransport::channel();

    // Writer task: drain outbound frames onto the socket
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "unserializable outbound frame"),
            }
        }
    });

    let config = &state.config;
    let chat = config.model.enabled().then(|| {
        Arc::new(OpenAiChat::new(ChatConfig {
            base_url: config.model.base_url.clone(),
            api_key: config.model.api_key.clone(),
            model: config.model.model.clone(),
        }))
    });
    let model = chat.clone().map(|c| {
        let model: Arc<dyn LanguageModel> = c;
        model
    });
    let wake_word = (!config.session.wake_words.is_empty()).then(|| {
        let greeter: Arc<dyn crate::voice::WakeWordResponder> = Arc::new(WakeWordGreeter::new(
            config.session.wake_words.clone(),
            config.session.wake_greeting.clone(),
        ));
        greeter
    });

    let speech = TransportSpeech::new(transport.clone());
    let (session, jobs) = Session::new(SessionParams {
        id: Uuid::new_v4().simple().to_string(),
        device_id: device_id.clone(),
        system_prompt: config.session.system_prompt.clone(),
        exit_phrases: config.session.exit_phrases.clone(),
        dispatch_queue: config.session.dispatch_queue,
        transport: transport.clone(),
        speech,
        model,
        intent_analysis: config.model.intent_analysis,
        wake_word,
        workers: WorkerPool::new(config.session.worker_threads),
    });

    let handler = UnifiedToolHandler::new(&config.tools);
    tokio::spawn(run_dispatch_loop(
        Arc::clone(&session),
        Arc::clone(&handler),
        jobs,
    ));

    handler.initialize(&session).await;
    handler.device_mcp().start_discovery(transport.clone());
    if let Some(chat) = &chat {
        chat.set_functions(handler.get_functions());
    }

    tracing::info!(device_id = %device_id, session_id = %session.id(), "device connected");
    state.sessions.write().await.insert(
        device_id.clone(),
        SessionHandle {
            session: Arc::clone(&session),
            handler: Arc::clone(&handler),
        },
    );

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(raw) => {
                match serde_json::from_str::<InboundFrame>(&raw) {
                    Ok(frame) => {
                        handle_frame(&session, &handler, chat.as_deref(), frame).await;
                    }
                    Err(e) => {
                        tracing::debug!(device_id = %device_id, error = %e, "unparseable frame");
                    }
                }
                if session.close_requested() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    tracing::info!(device_id = %device_id, "device disconnected");
    handler.cleanup().await;
    state.sessions.write().await.remove(&device_id);
    writer.abort();
}

async fn handle_frame(
    session: &Arc<Session>,
    handler: &Arc<UnifiedToolHandler>,
    chat: Option<&OpenAiChat>,
    frame: InboundFrame,
) {
    match frame {
        InboundFrame::Text { text } => {
            let _turn = session.lock_turn().await;
            handle_text(session, handler, &text).await;
        }
        InboundFrame::IotDescriptors { descriptors } => {
            handler.register_iot_tools(descriptors);
            if let Some(chat) = chat {
                chat.set_functions(handler.get_functions());
            }
        }
        InboundFrame::Mcp { payload } => {
            handler.device_mcp().handle_device_payload(payload);
        }
        InboundFrame::Abort => session.set_abort(),
    }
}

/// One conversation turn: intent flow first, plain chat as fallback
async fn handle_text(session: &Arc<Session>, handler: &Arc<UnifiedToolHandler>, text: &str) {
    match intent::handle_user_intent(session, handler, text).await {
        Ok(true) => {}
        Ok(false) => chat_fallback(session, text).await,
        Err(e) => {
            tracing::error!(session_id = %session.id(), error = %e, "intent resolution failed");
        }
    }
}

async fn chat_fallback(session: &Arc<Session>, text: &str) {
    let Some(model) = session.model() else {
        return;
    };

    let history = session.dialogue_snapshot();
    session.with_dialogue(|d| d.put(Role::User, text));

    match model.complete(&history, text).await {
        Ok(Some(reply)) => session.speak_and_record(&reply),
        Ok(None) => tracing::debug!(session_id = %session.id(), "chat completion was empty"),
        Err(e) => tracing::warn!(session_id = %session.id(), error = %e, "chat completion failed"),
    }
}

async fn device_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeviceEventRequest>,
) -> impl IntoResponse {
    let handle = state.sessions.read().await.get(&request.device_id).cloned();
    let Some(handle) = handle else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": "device not connected" })),
        );
    };

    tracing::info!(device_id = %request.device_id, "device event injected");
    {
        let _turn = handle.session.lock_turn().await;
        handle_text(&handle.session, &handle.handler, &request.text).await;
    }
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_frame_parsing() {
        let text: InboundFrame =
            serde_json::from_str(r#"{ "type": "text", "text": "hello" }"#).unwrap();
        assert!(matches!(text, InboundFrame::Text { .. }));

        let iot: InboundFrame = serde_json::from_str(
            r#"{ "type": "iot_descriptors", "descriptors": [{ "name": "set_lamp" }] }"#,
        )
        .unwrap();
        match iot {
            InboundFrame::IotDescriptors { descriptors } => {
                assert_eq!(descriptors[0].name, "set_lamp");
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let abort: InboundFrame = serde_json::from_str(r#"{ "type": "abort" }"#).unwrap();
        assert!(matches!(abort, InboundFrame::Abort));
    }

    #[tokio::test]
    async fn test_state_tracks_sessions() {
        let state = AppState::new(Config::default());
        assert_eq!(state.session_count().await, 0);
    }
}
