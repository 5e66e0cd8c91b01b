//! Intent resolution flow
//!
//! Takes recognized text through exit check, wake word check, and model
//! intent detection, then dispatches any resulting function call through
//! the unified tool handler on a worker thread. The action branch after
//! dispatch runs on that worker and is the only place mutating the
//! session's dialogue post-dispatch.
//!
//! Callers must serialize `handle_user_intent` per session; the session
//! reader loop does this by awaiting each turn before reading the next
//! frame (HTTP event injection takes the same turn lock).

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::Result;
use crate::dialogue::Role;
use crate::session::Session;
use crate::tools::builtins;
use crate::tools::handler::{FunctionCallItem, FunctionCallPayload, UnifiedToolHandler};
use crate::tools::types::{Action, ActionResponse};

/// Sentinel function name meaning "this is ordinary conversation"
pub const CONTINUE_CHAT: &str = "continue_chat";

/// Strip punctuation, collapse surrounding whitespace, and lowercase
///
/// Exit phrases and wake words are matched against this normal form.
#[must_use]
pub fn normalize_utterance(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Resolve one recognized utterance
///
/// Returns `true` when the utterance was handled here (exit, wake word, or
/// a dispatched function call); `false` means the caller should fall back
/// to ordinary chat.
///
/// # Errors
///
/// Returns an error only for infrastructure failures (worker pool gone);
/// model and parse failures all degrade to `Ok(false)`.
pub async fn handle_user_intent(
    session: &Arc<Session>,
    handler: &Arc<UnifiedToolHandler>,
    text: &str,
) -> Result<bool> {
    let normalized = normalize_utterance(text);
    tracing::debug!(session_id = %session.id(), text, "resolving user intent");

    if check_direct_exit(session, text, &normalized) {
        return Ok(true);
    }

    if let Some(wake_word) = session.wake_word()
        && wake_word.consumes(session, text).await
    {
        return Ok(true);
    }

    let model = match session.model() {
        Some(model) if session.intent_analysis() => model,
        _ => {
            tracing::debug!(session_id = %session.id(), "intent analysis not configured");
            return Ok(false);
        }
    };

    let intent_result = match model.detect_intent(&session.dialogue_snapshot(), text).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::warn!(session_id = %session.id(), "intent detection returned nothing");
            return Ok(false);
        }
        Err(e) => {
            tracing::error!(session_id = %session.id(), error = %e, "intent detection failed");
            return Ok(false);
        }
    };

    tracing::debug!(session_id = %session.id(), intent = %intent_result, "intent result");
    process_intent_result(session, handler, &intent_result, text).await
}

/// Exit check: a normalized exact match against the session's exit phrases
/// speaks one acknowledgement and requests close
fn check_direct_exit(session: &Arc<Session>, text: &str, normalized: &str) -> bool {
    let matched = session
        .exit_phrases()
        .iter()
        .any(|phrase| normalize_utterance(phrase) == normalized);
    if !matched {
        return false;
    }

    tracing::info!(session_id = %session.id(), "exit command recognized");
    session.speech().speak(text.trim());
    session.request_close();
    true
}

/// Parse the intent JSON and dispatch a contained function call
async fn process_intent_result(
    session: &Arc<Session>,
    handler: &Arc<UnifiedToolHandler>,
    intent_result: &str,
    original_text: &str,
) -> Result<bool> {
    let Ok(intent) = serde_json::from_str::<Value>(intent_result) else {
        tracing::error!(session_id = %session.id(), "intent result is not valid JSON");
        return Ok(false);
    };

    let Some(call) = intent.get("function_call").and_then(Value::as_object) else {
        tracing::debug!(session_id = %session.id(), "no function call detected");
        return Ok(false);
    };
    let Some(name) = call.get("name").and_then(Value::as_str) else {
        tracing::debug!(session_id = %session.id(), "function call carries no name");
        return Ok(false);
    };

    if name == CONTINUE_CHAT {
        return Ok(false);
    }

    // On-demand registration for the playback built-in
    if name == builtins::PLAY_MUSIC && !handler.has_tool(name) {
        handler.registry().register(builtins::play_music());
        handler.refresh_tools();
    }

    let arguments = encode_arguments(call.get("arguments"))?;
    let payload = FunctionCallPayload::Single(FunctionCallItem {
        name: name.to_string(),
        id: Some(Uuid::new_v4().simple().to_string()),
        arguments: Some(Value::String(arguments)),
    });

    session.echo_recognized(original_text);
    session.clear_abort();

    let worker_session = Arc::clone(session);
    let worker_name = name.to_string();
    let worker_text = original_text.to_string();
    session
        .workers()
        .submit(move || run_tool_call(&worker_session, &worker_name, payload, &worker_text))
        .await?;

    Ok(true)
}

/// Normalize the `arguments` value into the JSON-encoded string the wire
/// contract carries
fn encode_arguments(arguments: Option<&Value>) -> Result<String> {
    match arguments {
        None | Some(Value::Null) => Ok("{}".to_string()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok("{}".to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(serde_json::to_string(other)?),
    }
}

/// Worker-side dispatch and action branch
fn run_tool_call(
    session: &Arc<Session>,
    name: &str,
    payload: FunctionCallPayload,
    original_text: &str,
) {
    session.with_dialogue(|d| d.put(Role::User, original_text));

    tracing::info!(session_id = %session.id(), tool = name, "executing tool call");
    let result = match session.bridge().dispatch_blocking(payload) {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(session_id = %session.id(), tool = name, error = %e, "tool call failed");
            ActionResponse::error(e.to_string())
        }
    };

    apply_action(session, name, result, original_text);
}

/// Post-execution state machine
fn apply_action(session: &Arc<Session>, name: &str, result: ActionResponse, original_text: &str) {
    match result.action {
        Action::Response => {
            if let Some(text) = result.response {
                session.speak_and_record(&text);
            }
        }
        Action::ReqLlm => {
            let Some(tool_result) = result.result else {
                if let Some(text) = result.response {
                    session.speak_and_record(&text);
                }
                return;
            };
            session.with_dialogue(|d| d.put(Role::Tool, tool_result.as_str()));
            let reply = session
                .model()
                .and_then(|m| m.reply_result(&tool_result, original_text))
                .unwrap_or_else(|| tool_result.clone());
            session.speak_and_record(&reply);
        }
        Action::NotFound | Action::Error => {
            if let Some(text) = result.result {
                session.speak_and_record(&text);
            }
        }
        Action::None => {
            // Legacy path for tools that manage their own output; the
            // playback built-in is excluded because its feedback is audio
            if name != builtins::PLAY_MUSIC {
                if let Some(text) = result.response.or(result.result) {
                    session.speak_and_record(&text);
                }
            }
        }
    }
}
