use std::sync::Arc;

use crate::ask::AskBuilder;
use crate::backend::AssistantBackend;
use crate::bootstrap::{BootstrapBuilder, BootstrapPlan};
use crate::errors::LabError;
use crate::notes::NotesBuilder;
use crate::poll::PollPolicy;
use crate::state::{LabState, StateStore};

pub(crate) struct LabInner {
    pub(crate) backend: Arc<dyn AssistantBackend>,
    pub(crate) poll: PollPolicy,
}

/// Entry point for the bootstrap, ask and notes workflows.
#[derive(Clone)]
pub struct Lab {
    pub(crate) inner: Arc<LabInner>,
}

impl Lab {
    /// Starts a builder for choosing a backend and default wait policy.
    pub fn builder() -> LabBuilder {
        LabBuilder::default()
    }

    /// Name of the configured backend (for example `openai`).
    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    /// Starts building a bootstrap that persists its result to `store`.
    pub fn bootstrap(&self, plan: BootstrapPlan, store: StateStore) -> BootstrapBuilder {
        BootstrapBuilder::new(self.inner.clone(), plan, store)
    }

    /// Starts building a question run against the bootstrapped assistant.
    pub fn ask(&self, state: &LabState) -> AskBuilder {
        AskBuilder::new(self.inner.clone(), state.clone())
    }

    /// Starts building a structured note generation.
    pub fn notes(&self, state: &LabState) -> NotesBuilder {
        NotesBuilder::new(self.inner.clone(), state.clone())
    }
}

/// Builder used to configure a `Lab`.
#[derive(Default)]
pub struct LabBuilder {
    backend: Option<Arc<dyn AssistantBackend>>,
    poll: PollPolicy,
}

impl LabBuilder {
    /// Sets the remote backend. The last call wins.
    pub fn backend(mut self, backend: Arc<dyn AssistantBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the default wait policy for runs and document indexing.
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = policy;
        self
    }

    /// Builds the lab and validates its configuration.
    pub fn build(self) -> Result<Lab, LabError> {
        let backend = self
            .backend
            .ok_or_else(|| LabError::Config("no backend configured".into()))?;
        self.poll.validate()?;
        Ok(Lab {
            inner: Arc::new(LabInner {
                backend,
                poll: self.poll,
            }),
        })
    }
}
