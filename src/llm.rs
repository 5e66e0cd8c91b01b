//! Language model collaborator
//!
//! The core consumes the model through a narrow contract: intent detection
//! over the dialogue, plain completion for ordinary chat, and a short
//! blocking refinement call used on the worker thread after a `REQLLM`
//! tool result. The bundled implementation speaks the OpenAI-compatible
//! chat-completions API.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::dialogue::Message;
use crate::{Error, Result};

/// Language model operations consumed by the intent flow
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Analyze the utterance against the dialogue; returns the raw intent
    /// JSON text, or `None` when the model produced nothing
    async fn detect_intent(&self, dialogue: &[Message], text: &str) -> Result<Option<String>>;

    /// Ordinary chat completion for non-tool turns
    async fn complete(&self, dialogue: &[Message], text: &str) -> Result<Option<String>>;

    /// Turn a tool result into a short spoken reply
    ///
    /// Called from a worker thread after dispatch, so this blocks; `None`
    /// means the caller should fall back to speaking the raw result.
    fn reply_result(&self, tool_result: &str, original_text: &str) -> Option<String>;
}

/// Connection settings for an OpenAI-compatible chat endpoint
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// API base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// Model identifier
    pub model: String,
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiChat {
    client: reqwest::Client,
    config: ChatConfig,
    /// Function-calling schemas advertised in the intent prompt; updated
    /// after handler initialization and tool refreshes
    functions: Mutex<Vec<Value>>,
}

impl OpenAiChat {
    /// Create a client for the given endpoint
    #[must_use]
    pub fn new(config: ChatConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            functions: Mutex::new(Vec::new()),
        }
    }

    /// Replace the advertised function schemas
    pub fn set_functions(&self, functions: Vec<Value>) {
        if let Ok(mut guard) = self.functions.lock() {
            *guard = functions;
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn intent_system_prompt(&self) -> String {
        let functions = self
            .functions
            .lock()
            .map(|f| serde_json::to_string(&*f).unwrap_or_else(|_| "[]".to_string()))
            .unwrap_or_else(|_| "[]".to_string());

        format!(
            "You decide whether the user's utterance should invoke one of the \
             available functions.\n\
             Available functions: {functions}\n\
             Reply with a JSON object. To invoke a function reply \
             {{\"function_call\": {{\"name\": ..., \"arguments\": {{...}}}}}}. \
             If the utterance is ordinary conversation reply \
             {{\"function_call\": {{\"name\": \"continue_chat\"}}}}."
        )
    }

    fn wire_messages(dialogue: &[Message], text: &str) -> Vec<Value> {
        let mut messages: Vec<Value> = dialogue
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        messages.push(json!({ "role": "user", "content": text }));
        messages
    }

    fn extract_content(body: &Value) -> Option<String> {
        body.get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    }

    async fn chat(&self, messages: Vec<Value>) -> Result<Option<String>> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "model": self.config.model, "messages": messages }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("chat endpoint error {status}: {body}")));
        }

        let body: Value = response.json().await?;
        Ok(Self::extract_content(&body))
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn detect_intent(&self, dialogue: &[Message], text: &str) -> Result<Option<String>> {
        let mut messages = vec![json!({ "role": "system", "content": self.intent_system_prompt() })];
        messages.extend(Self::wire_messages(dialogue, text));
        self.chat(messages).await
    }

    async fn complete(&self, dialogue: &[Message], text: &str) -> Result<Option<String>> {
        self.chat(Self::wire_messages(dialogue, text)).await
    }

    fn reply_result(&self, tool_result: &str, original_text: &str) -> Option<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "Answer the user's request in one short spoken sentence, \
                                based on the tool result.",
                },
                {
                    "role": "user",
                    "content": format!("Request: {original_text}\nTool result: {tool_result}"),
                },
            ],
        });

        let result = reqwest::blocking::Client::new()
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(|r| r.json::<Value>());

        match result {
            Ok(value) => Self::extract_content(&value),
            Err(e) => {
                tracing::warn!(error = %e, "tool result refinement failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::Role;

    fn client() -> OpenAiChat {
        OpenAiChat::new(ChatConfig {
            base_url: "http://localhost:9/v1/".to_string(),
            api_key: "test".to_string(),
            model: "test-model".to_string(),
        })
    }

    #[test]
    fn test_completions_url_trims_slash() {
        assert_eq!(
            client().completions_url(),
            "http://localhost:9/v1/chat/completions"
        );
    }

    #[test]
    fn test_intent_prompt_lists_functions() {
        let chat = client();
        chat.set_functions(vec![json!({
            "type": "function",
            "function": { "name": "get_time", "description": "", "parameters": {} }
        })]);

        let prompt = chat.intent_system_prompt();
        assert!(prompt.contains("get_time"));
        assert!(prompt.contains("continue_chat"));
    }

    #[test]
    fn test_wire_messages_appends_current_text() {
        let dialogue = vec![Message::new(Role::User, "earlier")];
        let messages = OpenAiChat::wire_messages(&dialogue, "now");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "now");
    }

    #[test]
    fn test_extract_content_handles_missing_choices() {
        assert!(OpenAiChat::extract_content(&json!({})).is_none());
        let body = json!({ "choices": [{ "message": { "content": "  hi  " } }] });
        assert_eq!(OpenAiChat::extract_content(&body).as_deref(), Some("hi"));
    }
}
