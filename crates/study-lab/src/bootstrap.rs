use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{Instrument as _, debug, error, info, info_span};

use crate::backend::AssistantSpec;
use crate::errors::LabError;
use crate::lab::LabInner;
use crate::model::{AssistantId, BatchStatus, FileBatch, FileId, VectorStoreId};
use crate::poll::{AbortSignal, PollPolicy, cancellable, poll_until};
use crate::state::{LabState, StateStore};

pub const DEFAULT_ASSISTANT_NAME: &str = "Study Q&A Assistant";
pub const DEFAULT_ASSISTANT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_VECTOR_STORE_NAME: &str = "Study Materials";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful tutor. \
Use the knowledge in the attached files to answer study questions. \
Cite sources (file citations) where possible.";

/// What the bootstrap creates remotely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapPlan {
    pub document: PathBuf,
    pub assistant_name: String,
    pub instructions: String,
    pub model: String,
    pub vector_store_name: String,
}

impl BootstrapPlan {
    /// Plan with the default tutor assistant for one document.
    pub fn new(document: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            model: DEFAULT_ASSISTANT_MODEL.to_string(),
            vector_store_name: DEFAULT_VECTOR_STORE_NAME.to_string(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = name.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn vector_store_name(mut self, name: impl Into<String>) -> Self {
        self.vector_store_name = name.into();
        self
    }

    fn validate(&self) -> Result<(), LabError> {
        for (field, value) in [
            ("assistant name", &self.assistant_name),
            ("instructions", &self.instructions),
            ("model", &self.model),
            ("vector store name", &self.vector_store_name),
        ] {
            if value.trim().is_empty() {
                return Err(LabError::Validation(format!("{field} must not be empty")));
            }
        }
        ensure_readable_file(&self.document)
    }
}

fn ensure_readable_file(path: &Path) -> Result<(), LabError> {
    let display = path.display();
    let metadata = std::fs::metadata(path)
        .map_err(|e| LabError::Precondition(format!("could not find document {display}: {e}")))?;
    if !metadata.is_file() {
        return Err(LabError::Precondition(format!(
            "document {display} is not a regular file"
        )));
    }
    std::fs::File::open(path)
        .map_err(|e| LabError::Precondition(format!("document {display} is not readable: {e}")))?;
    Ok(())
}

/// Progress notifications emitted after each completed bootstrap step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapStep {
    AssistantCreated(AssistantId),
    VectorStoreCreated(VectorStoreId),
    DocumentIndexed {
        file_id: FileId,
        status: BatchStatus,
    },
    VectorStoreAttached,
    StateWritten(PathBuf),
}

/// Result of a successful bootstrap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapReport {
    pub state: LabState,
    pub file_id: FileId,
    pub batch_status: BatchStatus,
    pub state_path: PathBuf,
}

type StepObserver = Box<dyn FnMut(&BootstrapStep) + Send>;

/// Builder for creating the assistant, indexing the document and persisting
/// the resulting ids.
pub struct BootstrapBuilder {
    lab: Arc<LabInner>,
    plan: BootstrapPlan,
    store: StateStore,
    poll: PollPolicy,
    abort: AbortSignal,
    on_step: Option<StepObserver>,
}

impl BootstrapBuilder {
    pub(crate) fn new(lab: Arc<LabInner>, plan: BootstrapPlan, store: StateStore) -> Self {
        let poll = lab.poll.clone();
        Self {
            lab,
            plan,
            store,
            poll,
            abort: AbortSignal::never(),
            on_step: None,
        }
    }

    /// Overrides the wait policy used while the document is indexed.
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = policy;
        self
    }

    /// Lets the caller cancel the indexing wait.
    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = signal;
        self
    }

    /// Called after each completed step.
    pub fn on_step(mut self, observer: impl FnMut(&BootstrapStep) + Send + 'static) -> Self {
        self.on_step = Some(Box::new(observer));
        self
    }

    /// Runs every step; the state file is written only if all remote steps
    /// succeed.
    ///
    /// All local preconditions are checked before the first remote call.
    pub async fn run(self) -> Result<BootstrapReport, LabError> {
        self.plan.validate()?;
        self.poll.validate()?;
        let span = info_span!("bootstrap", request_id = %uuid::Uuid::new_v4(), document = %self.plan.document.display());
        self.execute().instrument(span).await
    }

    fn emit(&mut self, step: BootstrapStep) {
        debug!(?step, "bootstrap step finished");
        if let Some(observer) = self.on_step.as_mut() {
            observer(&step);
        }
    }

    async fn execute(mut self) -> Result<BootstrapReport, LabError> {
        let backend = self.lab.backend.clone();

        let spec = AssistantSpec {
            name: self.plan.assistant_name.clone(),
            instructions: self.plan.instructions.clone(),
            model: self.plan.model.clone(),
            file_search: true,
        };
        let assistant_id = cancellable(&mut self.abort, backend.create_assistant(&spec)).await?;
        info!(assistant_id = %assistant_id, "assistant created");
        self.emit(BootstrapStep::AssistantCreated(assistant_id.clone()));

        let vector_store_id = cancellable(
            &mut self.abort,
            backend.create_vector_store(&self.plan.vector_store_name),
        )
        .await?;
        info!(vector_store_id = %vector_store_id, "vector store created");
        self.emit(BootstrapStep::VectorStoreCreated(vector_store_id.clone()));

        let file_id =
            cancellable(&mut self.abort, backend.upload_file(&self.plan.document)).await?;
        let batch = cancellable(
            &mut self.abort,
            backend.create_file_batch(&vector_store_id, std::slice::from_ref(&file_id)),
        )
        .await?;
        info!(file_id = %file_id, batch_id = %batch.id, "document uploaded, waiting for indexing");

        let batch = {
            let backend = &*backend;
            let store_ref = &vector_store_id;
            let batch_ref = &batch.id;
            poll_until(
                &format!("file batch {}", batch.id),
                &self.poll,
                &mut self.abort,
                move || async move {
                    backend
                        .retrieve_file_batch(store_ref, batch_ref)
                        .await
                        .map_err(LabError::from)
                },
                |batch: &FileBatch| batch.status.is_terminal(),
                |batch: &FileBatch| debug!(batch_id = %batch.id, status = %batch.status, "indexing pending"),
            )
            .await?
        };
        if batch.status != BatchStatus::Completed {
            error!(batch_id = %batch.id, status = %batch.status, "document indexing failed");
            return Err(LabError::IndexingFailed {
                batch_id: batch.id,
                status: batch.status,
            });
        }
        self.emit(BootstrapStep::DocumentIndexed {
            file_id: file_id.clone(),
            status: batch.status.clone(),
        });

        cancellable(
            &mut self.abort,
            backend.attach_vector_store(&assistant_id, &vector_store_id),
        )
        .await?;
        info!(assistant_id = %assistant_id, vector_store_id = %vector_store_id, "vector store attached");
        self.emit(BootstrapStep::VectorStoreAttached);

        if self.abort.is_aborted() {
            return Err(LabError::Cancelled);
        }
        let state = LabState::new(assistant_id, vector_store_id);
        self.store.save(&state)?;
        let state_path = self.store.path().to_path_buf();
        self.emit(BootstrapStep::StateWritten(state_path.clone()));

        Ok(BootstrapReport {
            state,
            file_id,
            batch_status: batch.status,
            state_path,
        })
    }
}
