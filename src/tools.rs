//! Tools offered to the chat model.
//!
//! Each supported tool is a [`ToolKind`] variant. A model's tool call is
//! parsed into a [`ToolInvocation`] carrying typed arguments, and the
//! service dispatches on it with an exhaustive `match`, so a tool added
//! here cannot be left without a handler.

use serde::Deserialize;
use thiserror::Error;

use crate::completion::{ToolCall, ToolSpec};

/// System note added when a search is requested without a question.
pub const MORE_INFORMATION_NOTE: &str =
    "The search question was empty. Request user to provide more information.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    SearchDocuments,
    ListDocuments,
    DocumentStats,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [
        ToolKind::SearchDocuments,
        ToolKind::ListDocuments,
        ToolKind::DocumentStats,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::SearchDocuments => "search_documents",
            ToolKind::ListDocuments => "list_documents",
            ToolKind::DocumentStats => "document_stats",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::SearchDocuments => {
                "Search the uploaded documents for passages relevant to a question."
            }
            ToolKind::ListDocuments => "List the uploaded documents with their processing status.",
            ToolKind::DocumentStats => {
                "Report how many documents and chunks are stored, by processing status."
            }
        }
    }

    /// JSON Schema of the arguments object.
    pub fn parameters(&self) -> serde_json::Value {
        match self {
            ToolKind::SearchDocuments => serde_json::json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "What to look for in the documents"
                    },
                    "top_k": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of passages to return"
                    }
                },
                "required": ["question"]
            }),
            ToolKind::ListDocuments | ToolKind::DocumentStats => serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Specs for every supported tool.
pub fn tool_specs() -> Vec<ToolSpec> {
    ToolKind::ALL.iter().map(ToolKind::spec).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchArgs {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// A parsed tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    SearchDocuments(SearchArgs),
    ListDocuments,
    DocumentStats,
}

#[derive(Debug, Error, PartialEq)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
}

impl ToolInvocation {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolInvocation::SearchDocuments(_) => ToolKind::SearchDocuments,
            ToolInvocation::ListDocuments => ToolKind::ListDocuments,
            ToolInvocation::DocumentStats => ToolKind::DocumentStats,
        }
    }

    pub fn parse(call: &ToolCall) -> Result<Self, ToolCallError> {
        let kind = ToolKind::from_name(&call.name)
            .ok_or_else(|| ToolCallError::Unknown(call.name.clone()))?;
        match kind {
            ToolKind::SearchDocuments => {
                // Models sometimes send `null` for an argument-less call.
                let args = if call.arguments.is_null() {
                    SearchArgs::default()
                } else {
                    serde_json::from_value(call.arguments.clone()).map_err(|e| {
                        ToolCallError::InvalidArguments {
                            tool: kind.name(),
                            reason: e.to_string(),
                        }
                    })?
                };
                Ok(ToolInvocation::SearchDocuments(args))
            }
            ToolKind::ListDocuments => Ok(ToolInvocation::ListDocuments),
            ToolKind::DocumentStats => Ok(ToolInvocation::DocumentStats),
        }
    }
}

/// Result of running one tool: the content sent back to the model and an
/// optional extra system message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub system_note: Option<String>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            system_note: None,
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::text(format!("Tool error: {}", message))
    }
}
