//! Domain types shared by the index, the responders and the chat service.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;
pub type Meta = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the conversation sent to a responder.
///
/// `grounding` marks the message that carries the retrieved knowledge-base
/// passages so that responders talking to context-injecting proxies can drop
/// it. It never goes over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip)]
    pub grounding: bool,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), grounding: false }
    }

    pub fn system(content: impl Into<String>) -> Self { Self::new(Role::System, content) }

    pub fn user(content: impl Into<String>) -> Self { Self::new(Role::User, content) }

    /// System message holding the retrieved context block.
    pub fn grounding(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), grounding: true }
    }
}

/// A retrieved chunk as handed to a responder.
///
/// Serializes to the `{id, text, score, metadata}` shape of the HTTP wire
/// contract; `label` is only used for local rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextPassage {
    pub id: ChunkId,
    pub text: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Meta,
    #[serde(skip)]
    pub label: String,
}

/// A retrieved chunk as shown to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextItem {
    pub id: ChunkId,
    pub label: String,
    pub snippet: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Meta,
}

/// Result of one `answer()` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagChatResponse {
    pub question: String,
    pub answer: String,
    pub context: Vec<ContextItem>,
}

/// A stored knowledge-base document of one tenant.
///
/// - `id`: random token, also the prefix of `filename`
/// - `name`: the client-supplied filename
/// - `filename`: the name on disk below the tenant's `uploads/` directory
/// - `uploaded_at`/`updated_at`: RFC 3339 timestamps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: String,
    pub updated_at: String,
}
