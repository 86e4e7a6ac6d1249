//! Contract between the lab workflows and a hosted assistant service.
//!
//! Workflows only talk to the service through [`AssistantBackend`], so tests
//! can substitute an in-memory implementation and other vendors can be added
//! under `vendors::*`.
use std::path::Path;

use crate::content::{NewMessage, ThreadMessage};
use crate::errors::ProviderError;
use crate::model::{
    AssistantId, BatchId, FileBatch, FileId, FileObject, Run, RunId, ThreadId, VectorStoreId,
};

/// Assistant resource to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
    /// Enables the document retrieval (file search) tool.
    pub file_search: bool,
}

/// Single-shot generation request constrained to a JSON object response.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonChatRequest {
    pub model: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
}

/// Remote operations used by the bootstrap, ask and notes workflows.
///
/// Implementations must not retry; every failure is returned to the caller.
#[async_trait::async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Short vendor name used in logs.
    fn name(&self) -> &str;

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ProviderError>;

    async fn create_vector_store(&self, name: &str) -> Result<VectorStoreId, ProviderError>;

    /// Uploads a local file for use by assistants.
    async fn upload_file(&self, path: &Path) -> Result<FileId, ProviderError>;

    /// Starts indexing the given files into a vector store.
    async fn create_file_batch(
        &self,
        vector_store: &VectorStoreId,
        files: &[FileId],
    ) -> Result<FileBatch, ProviderError>;

    async fn retrieve_file_batch(
        &self,
        vector_store: &VectorStoreId,
        batch: &BatchId,
    ) -> Result<FileBatch, ProviderError>;

    /// Links a vector store to the assistant's file search tool.
    async fn attach_vector_store(
        &self,
        assistant: &AssistantId,
        vector_store: &VectorStoreId,
    ) -> Result<(), ProviderError>;

    async fn create_thread(&self, messages: &[NewMessage]) -> Result<ThreadId, ProviderError>;

    /// Starts a non-streaming run of `assistant` over `thread`.
    async fn create_run(
        &self,
        thread: &ThreadId,
        assistant: &AssistantId,
    ) -> Result<Run, ProviderError>;

    async fn retrieve_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ProviderError>;

    /// Lists thread messages, oldest first.
    async fn list_messages(&self, thread: &ThreadId) -> Result<Vec<ThreadMessage>, ProviderError>;

    async fn retrieve_file(&self, file: &FileId) -> Result<FileObject, ProviderError>;

    /// Returns the raw text of the first completion choice.
    async fn chat_json(&self, request: &JsonChatRequest) -> Result<String, ProviderError>;
}
