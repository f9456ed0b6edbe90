pub mod azure;
pub mod openai;
pub mod service;
pub mod sse;
pub mod transport;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    pub model_id: Option<String>,
    pub finish_reason: Option<String>,
}

/// One incremental piece of a streamed reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamFragment {
    pub role: Option<Role>,
    pub model_id: Option<String>,
    pub content: String,
    pub finish_reason: Option<String>,
}

/// Sampling knobs sent with every request. Unset fields use the provider defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CompletionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Finite, ordered, single-use sequence of reply fragments.
pub type FragmentStream<'a> = Box<dyn Iterator<Item = Result<StreamFragment, TransportError>> + 'a>;

pub trait ChatCompletion {
    fn stream_chat(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
        params: &CompletionParams,
    ) -> Result<FragmentStream<'_>, TransportError>;
}
