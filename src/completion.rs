//! Chat-completion backends.
//!
//! [`CompletionBackend`] maps a message list to generated text, optionally
//! offering the model a set of tools. Implementations:
//! - **[`DisabledCompletion`]**: always fails; answers degrade to fallbacks.
//! - **[`OllamaChat`]**: `POST /api/chat` on an Ollama instance.
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions`.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::error::CompletionError;
use crate::http;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls requested by an assistant message.
    pub tool_calls: Vec<ToolCall>,
    /// For `Role::Tool` messages: the call this message answers.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool_result(call_id: Option<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call_id,
            ..Self::new(Role::Tool, content)
        }
    }
}

/// A tool the model may call.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub tools: Vec<ToolSpec>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.9,
            tools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionReply, CompletionError>;
}

// ============ Disabled ============

pub struct DisabledCompletion;

#[async_trait]
impl CompletionBackend for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<CompletionReply, CompletionError> {
        Err(CompletionError::Disabled)
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl OllamaChat {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: config.base_url(),
            model: config.model_name(),
            max_retries: config.max_retries,
        })
    }
}

fn tools_json(tools: &[ToolSpec]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

fn ollama_message(m: &ChatMessage) -> serde_json::Value {
    let mut value = serde_json::json!({
        "role": m.role.as_str(),
        "content": m.content,
    });
    if !m.tool_calls.is_empty() {
        value["tool_calls"] = m
            .tool_calls
            .iter()
            .map(|c| serde_json::json!({"function": {"name": c.name, "arguments": c.arguments}}))
            .collect();
    }
    value
}

#[async_trait]
impl CompletionBackend for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionReply, CompletionError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages.iter().map(ollama_message).collect::<Vec<_>>(),
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "top_p": options.top_p,
            },
        });
        if !options.tools.is_empty() {
            body["tools"] = tools_json(&options.tools).into();
        }

        let json = http::post_json(
            &self.client,
            &format!("{}/api/chat", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await
        .map_err(CompletionError::Backend)?;

        let message = json
            .get("message")
            .ok_or_else(|| {
                CompletionError::Backend("Invalid Ollama response: missing message".into())
            })?;
        parse_message(message)
    }
}

// ============ OpenAI ============

pub struct OpenAIChat {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAIChat {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: config.base_url(),
            api_key,
            model: config.model_name(),
            max_retries: config.max_retries,
        })
    }
}

fn openai_message(m: &ChatMessage) -> serde_json::Value {
    let mut value = serde_json::json!({
        "role": m.role.as_str(),
        "content": m.content,
    });
    if !m.tool_calls.is_empty() {
        value["tool_calls"] = m
            .tool_calls
            .iter()
            .enumerate()
            .map(|(i, c)| {
                serde_json::json!({
                    "id": c.id.clone().unwrap_or_else(|| format!("call_{}", i)),
                    "type": "function",
                    "function": {"name": c.name, "arguments": c.arguments.to_string()},
                })
            })
            .collect();
    }
    if let Some(id) = &m.tool_call_id {
        value["tool_call_id"] = id.clone().into();
    }
    value
}

#[async_trait]
impl CompletionBackend for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionReply, CompletionError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages.iter().map(openai_message).collect::<Vec<_>>(),
            "temperature": options.temperature,
            "top_p": options.top_p,
        });
        if !options.tools.is_empty() {
            body["tools"] = tools_json(&options.tools).into();
        }

        let json = http::post_json(
            &self.client,
            &format!("{}/v1/chat/completions", self.url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(CompletionError::Backend)?;

        let message = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| {
                CompletionError::Backend("Invalid OpenAI response: missing choices[0].message".into())
            })?;
        parse_message(message)
    }
}

/// Parse an assistant message in either wire format. Tool-call arguments
/// may arrive as an object (Ollama) or a JSON-encoded string (OpenAI).
fn parse_message(message: &serde_json::Value) -> Result<CompletionReply, CompletionError> {
    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();

    let tool_calls: Vec<ToolCall> = message
        .get("tool_calls")
        .and_then(|t| t.as_array())
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let arguments = match function.get("arguments") {
                        Some(serde_json::Value::String(raw)) => {
                            serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
                        }
                        Some(other) => other.clone(),
                        None => serde_json::Value::Null,
                    };
                    Some(ToolCall {
                        id: call.get("id").and_then(|i| i.as_str()).map(str::to_string),
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if content.trim().is_empty() && tool_calls.is_empty() {
        return Err(CompletionError::EmptyResponse);
    }
    Ok(CompletionReply {
        content,
        tool_calls,
    })
}

/// Create the backend named by `completion.provider`.
pub fn create_backend(config: &CompletionConfig) -> Result<Arc<dyn CompletionBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ollama_tool_calls() {
        let message = serde_json::json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [
                {"function": {"name": "search_documents", "arguments": {"question": "vacation"}}}
            ]
        });
        let reply = parse_message(&message).unwrap();
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "search_documents");
        assert_eq!(reply.tool_calls[0].arguments["question"], "vacation");
        assert_eq!(reply.tool_calls[0].id, None);
    }

    #[test]
    fn parses_openai_string_arguments() {
        let message = serde_json::json!({
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "document_stats", "arguments": "{}"}
            }]
        });
        let reply = parse_message(&message).unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls[0].id.as_deref(), Some("call_abc"));
        assert_eq!(reply.tool_calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn empty_message_is_an_error() {
        let message = serde_json::json!({"role": "assistant", "content": "   "});
        assert!(matches!(
            parse_message(&message),
            Err(CompletionError::EmptyResponse)
        ));
    }

    #[test]
    fn openai_tool_result_carries_call_id() {
        let msg = ChatMessage::tool_result(Some("call_1".into()), "3 documents");
        let json = openai_message(&msg);
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn disabled_backend_fails() {
        let err = DisabledCompletion
            .complete(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Disabled));
    }
}
