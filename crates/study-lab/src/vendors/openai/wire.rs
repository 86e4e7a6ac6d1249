use serde::de::DeserializeOwned;

use crate::backend::{AssistantSpec, JsonChatRequest};
use crate::content::{NewMessage, ThreadMessage};
use crate::errors::ProviderError;
use crate::model::{AssistantId, FileId, VectorStoreId};

#[derive(serde::Deserialize)]
pub(crate) struct IdOnly {
    pub id: String,
}

#[derive(serde::Deserialize)]
pub(crate) struct MessagePage {
    pub data: Vec<ThreadMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

#[derive(serde::Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(serde::Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub(crate) fn assistant_body(spec: &AssistantSpec) -> serde_json::Value {
    let tools = if spec.file_search {
        serde_json::json!([{ "type": "file_search" }])
    } else {
        serde_json::json!([])
    };
    serde_json::json!({
        "name": spec.name,
        "instructions": spec.instructions,
        "model": spec.model,
        "tools": tools,
    })
}

pub(crate) fn vector_store_body(name: &str) -> serde_json::Value {
    serde_json::json!({ "name": name })
}

pub(crate) fn file_batch_body(files: &[FileId]) -> serde_json::Value {
    serde_json::json!({ "file_ids": files })
}

pub(crate) fn attach_vector_store_body(vector_store: &VectorStoreId) -> serde_json::Value {
    serde_json::json!({
        "tool_resources": {
            "file_search": { "vector_store_ids": [vector_store] }
        }
    })
}

pub(crate) fn thread_body(messages: &[NewMessage]) -> serde_json::Value {
    serde_json::json!({ "messages": messages })
}

pub(crate) fn run_body(assistant: &AssistantId) -> serde_json::Value {
    serde_json::json!({
        "assistant_id": assistant,
        "stream": false,
    })
}

pub(crate) fn chat_json_body(req: &JsonChatRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": req.model,
        "messages": [{ "role": "system", "content": req.system_prompt }],
        "response_format": { "type": "json_object" },
    });
    if let Some(temperature) = req.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    body
}

pub(crate) fn decode<T: DeserializeOwned>(operation: &str, body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| {
        ProviderError::protocol(operation, format!("unexpected response body: {e}"))
    })
}

/// Extracts `choices[0].message.content` from a chat completion.
pub(crate) fn first_choice_content(operation: &str, body: &str) -> Result<String, ProviderError> {
    let completion: ChatCompletion = decode(operation, body)?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::protocol(operation, "completion has no message content"))
}
