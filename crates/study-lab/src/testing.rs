//! In-memory backend for workflow tests.
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backend::{AssistantBackend, AssistantSpec, JsonChatRequest};
use crate::content::{
    Annotation, ContentBlock, FileCitation, MessageRole, NewMessage, TextContent, ThreadMessage,
};
use crate::errors::ProviderError;
use crate::model::{
    AssistantId, BatchId, BatchStatus, FileBatch, FileId, FileObject, Run, RunId, RunLastError,
    RunStatus, ThreadId, VectorStoreId,
};
use crate::poll::AbortHandle;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateAssistant(AssistantSpec),
    CreateVectorStore(String),
    UploadFile(PathBuf),
    CreateFileBatch(VectorStoreId, Vec<FileId>),
    RetrieveFileBatch(BatchId),
    AttachVectorStore(AssistantId, VectorStoreId),
    CreateThread(Vec<NewMessage>),
    CreateRun(ThreadId, AssistantId),
    RetrieveRun(RunId),
    ListMessages(ThreadId),
    RetrieveFile(FileId),
    ChatJson(JsonChatRequest),
}

impl Call {
    pub(crate) fn operation(&self) -> &'static str {
        match self {
            Self::CreateAssistant(_) => "create_assistant",
            Self::CreateVectorStore(_) => "create_vector_store",
            Self::UploadFile(_) => "upload_file",
            Self::CreateFileBatch(..) => "create_file_batch",
            Self::RetrieveFileBatch(_) => "retrieve_file_batch",
            Self::AttachVectorStore(..) => "attach_vector_store",
            Self::CreateThread(_) => "create_thread",
            Self::CreateRun(..) => "create_run",
            Self::RetrieveRun(_) => "retrieve_run",
            Self::ListMessages(_) => "list_messages",
            Self::RetrieveFile(_) => "retrieve_file",
            Self::ChatJson(_) => "chat_json",
        }
    }
}

/// Scripted backend. Status queues repeat their last entry once drained.
pub(crate) struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    run_statuses: Mutex<VecDeque<RunStatus>>,
    run_error: Option<RunLastError>,
    batch_statuses: Mutex<VecDeque<BatchStatus>>,
    messages: Vec<ThreadMessage>,
    files: HashMap<FileId, String>,
    chat_responses: Mutex<VecDeque<String>>,
    failures: HashMap<&'static str, ProviderError>,
    abort_on: Option<(&'static str, AbortHandle)>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            run_statuses: Mutex::new(VecDeque::from([RunStatus::Completed])),
            run_error: None,
            batch_statuses: Mutex::new(VecDeque::from([BatchStatus::Completed])),
            messages: Vec::new(),
            files: HashMap::new(),
            chat_responses: Mutex::new(VecDeque::new()),
            failures: HashMap::new(),
            abort_on: None,
        }
    }

    pub(crate) fn with_run_statuses(self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        *self.run_statuses.lock().expect("lock") = statuses.into_iter().collect();
        self
    }

    pub(crate) fn with_run_error(mut self, code: &str, message: &str) -> Self {
        self.run_error = Some(RunLastError {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub(crate) fn with_batch_statuses(
        self,
        statuses: impl IntoIterator<Item = BatchStatus>,
    ) -> Self {
        *self.batch_statuses.lock().expect("lock") = statuses.into_iter().collect();
        self
    }

    pub(crate) fn with_messages(mut self, messages: Vec<ThreadMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub(crate) fn with_file(mut self, id: &str, filename: &str) -> Self {
        self.files.insert(FileId::new(id), filename.to_string());
        self
    }

    pub(crate) fn with_chat_responses<S: Into<String>>(
        self,
        responses: impl IntoIterator<Item = S>,
    ) -> Self {
        *self.chat_responses.lock().expect("lock") =
            responses.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn failing_on(mut self, operation: &'static str, err: ProviderError) -> Self {
        self.failures.insert(operation, err);
        self
    }

    /// Fires `handle` while serving `operation`; the call itself still succeeds.
    pub(crate) fn aborting_on(mut self, operation: &'static str, handle: AbortHandle) -> Self {
        self.abort_on = Some((operation, handle));
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    pub(crate) fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    fn record(&self, call: Call) -> Result<(), ProviderError> {
        let operation = call.operation();
        self.calls.lock().expect("lock").push(call);
        if let Some((target, handle)) = &self.abort_on
            && *target == operation
        {
            handle.abort();
        }
        match self.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn next_from<T: Clone>(queue: &Mutex<VecDeque<T>>, fallback: T) -> T {
        let mut queue = queue.lock().expect("lock");
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(fallback)
        } else {
            queue.front().cloned().unwrap_or(fallback)
        }
    }
}

#[async_trait::async_trait]
impl AssistantBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ProviderError> {
        self.record(Call::CreateAssistant(spec.clone()))?;
        Ok(AssistantId::new("asst_fake"))
    }

    async fn create_vector_store(&self, name: &str) -> Result<VectorStoreId, ProviderError> {
        self.record(Call::CreateVectorStore(name.to_string()))?;
        Ok(VectorStoreId::new("vs_fake"))
    }

    async fn upload_file(&self, path: &Path) -> Result<FileId, ProviderError> {
        self.record(Call::UploadFile(path.to_path_buf()))?;
        Ok(FileId::new("file_doc"))
    }

    async fn create_file_batch(
        &self,
        vector_store: &VectorStoreId,
        files: &[FileId],
    ) -> Result<FileBatch, ProviderError> {
        self.record(Call::CreateFileBatch(vector_store.clone(), files.to_vec()))?;
        Ok(FileBatch {
            id: BatchId::new("vsfb_fake"),
            vector_store_id: vector_store.clone(),
            status: BatchStatus::InProgress,
        })
    }

    async fn retrieve_file_batch(
        &self,
        vector_store: &VectorStoreId,
        batch: &BatchId,
    ) -> Result<FileBatch, ProviderError> {
        self.record(Call::RetrieveFileBatch(batch.clone()))?;
        Ok(FileBatch {
            id: batch.clone(),
            vector_store_id: vector_store.clone(),
            status: Self::next_from(&self.batch_statuses, BatchStatus::Completed),
        })
    }

    async fn attach_vector_store(
        &self,
        assistant: &AssistantId,
        vector_store: &VectorStoreId,
    ) -> Result<(), ProviderError> {
        self.record(Call::AttachVectorStore(assistant.clone(), vector_store.clone()))
    }

    async fn create_thread(&self, messages: &[NewMessage]) -> Result<ThreadId, ProviderError> {
        self.record(Call::CreateThread(messages.to_vec()))?;
        Ok(ThreadId::new("thread_fake"))
    }

    async fn create_run(
        &self,
        thread: &ThreadId,
        assistant: &AssistantId,
    ) -> Result<Run, ProviderError> {
        self.record(Call::CreateRun(thread.clone(), assistant.clone()))?;
        Ok(Run {
            id: RunId::new("run_fake"),
            thread_id: thread.clone(),
            status: RunStatus::Queued,
            last_error: None,
        })
    }

    async fn retrieve_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ProviderError> {
        self.record(Call::RetrieveRun(run.clone()))?;
        let status = Self::next_from(&self.run_statuses, RunStatus::Completed);
        let last_error = if status.is_failure() {
            self.run_error.clone()
        } else {
            None
        };
        Ok(Run {
            id: run.clone(),
            thread_id: thread.clone(),
            status,
            last_error,
        })
    }

    async fn list_messages(&self, thread: &ThreadId) -> Result<Vec<ThreadMessage>, ProviderError> {
        self.record(Call::ListMessages(thread.clone()))?;
        Ok(self.messages.clone())
    }

    async fn retrieve_file(&self, file: &FileId) -> Result<FileObject, ProviderError> {
        self.record(Call::RetrieveFile(file.clone()))?;
        match self.files.get(file) {
            Some(filename) => Ok(FileObject {
                id: file.clone(),
                filename: filename.clone(),
            }),
            None => Err(ProviderError::provider(
                "retrieve_file",
                format!("No such File object: {file}"),
                Some(404),
            )),
        }
    }

    async fn chat_json(&self, request: &JsonChatRequest) -> Result<String, ProviderError> {
        self.record(Call::ChatJson(request.clone()))?;
        self.chat_responses
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| ProviderError::protocol("chat_json", "no scripted response left"))
    }
}

/// Builds a thread message from `(text, cited file ids)` blocks.
pub(crate) fn message(role: MessageRole, blocks: &[(&str, &[&str])]) -> ThreadMessage {
    ThreadMessage {
        id: format!("msg_{}", blocks.len()),
        role,
        content: blocks
            .iter()
            .map(|(text, cited)| ContentBlock::Text {
                text: TextContent {
                    value: (*text).to_string(),
                    annotations: cited
                        .iter()
                        .map(|file_id| Annotation::FileCitation {
                            text: String::new(),
                            file_citation: FileCitation {
                                file_id: FileId::new(*file_id),
                            },
                        })
                        .collect(),
                },
            })
            .collect(),
    }
}
