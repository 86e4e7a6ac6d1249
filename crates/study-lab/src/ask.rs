use std::sync::Arc;

use tracing::{Instrument as _, error, info, info_span, warn};

use crate::content::{Answer, Citation, MessageRole, NewMessage};
use crate::errors::LabError;
use crate::lab::LabInner;
use crate::model::{Run, RunStatus};
use crate::poll::{AbortSignal, PollPolicy, cancellable, poll_until};
use crate::state::LabState;

type StatusObserver = Box<dyn FnMut(&RunStatus) + Send>;

/// Builder for asking the bootstrapped assistant a single question.
///
/// Each question gets a fresh thread holding exactly one user message.
pub struct AskBuilder {
    lab: Arc<LabInner>,
    state: LabState,
    question: String,
    poll: PollPolicy,
    abort: AbortSignal,
    on_status: Option<StatusObserver>,
}

impl AskBuilder {
    pub(crate) fn new(lab: Arc<LabInner>, state: LabState) -> Self {
        let poll = lab.poll.clone();
        Self {
            lab,
            state,
            question: String::new(),
            poll,
            abort: AbortSignal::never(),
            on_status: None,
        }
    }

    /// Sets the question text. Surrounding whitespace is ignored.
    pub fn question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }

    /// Overrides the lab's default wait policy for this run.
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = policy;
        self
    }

    /// Lets the caller cancel the wait for the run.
    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = signal;
        self
    }

    /// Called with every non-terminal run status observed while waiting.
    pub fn on_status(mut self, observer: impl FnMut(&RunStatus) + Send + 'static) -> Self {
        self.on_status = Some(Box::new(observer));
        self
    }

    /// Runs the question to completion and returns the answer with citations.
    pub async fn send(self) -> Result<Answer, LabError> {
        let question = self.question.trim().to_string();
        if question.is_empty() {
            return Err(LabError::Validation("question must not be empty".into()));
        }
        self.poll.validate()?;

        let span = info_span!("ask", request_id = %uuid::Uuid::new_v4(), assistant_id = %self.state.assistant_id);
        self.run(question).instrument(span).await
    }

    async fn run(mut self, question: String) -> Result<Answer, LabError> {
        let backend = &*self.lab.backend;

        let thread = cancellable(
            &mut self.abort,
            backend.create_thread(&[NewMessage::user(question)]),
        )
        .await?;
        let run = cancellable(
            &mut self.abort,
            backend.create_run(&thread, &self.state.assistant_id),
        )
        .await?;
        info!(thread_id = %thread, run_id = %run.id, status = %run.status, "run created");

        let thread_ref = &thread;
        let run_ref = &run.id;
        let on_status = &mut self.on_status;
        let finished = poll_until(
            &format!("run {}", run.id),
            &self.poll,
            &mut self.abort,
            move || async move {
                backend
                    .retrieve_run(thread_ref, run_ref)
                    .await
                    .map_err(LabError::from)
            },
            |run: &Run| run.status.is_terminal(),
            |run: &Run| {
                info!(run_id = %run.id, status = %run.status, "run still pending");
                if let Some(observer) = on_status.as_mut() {
                    observer(&run.status);
                }
            },
        )
        .await?;

        if finished.status.is_failure() {
            error!(run_id = %finished.id, status = %finished.status, last_error = ?finished.last_error, "run failed");
            return Err(LabError::RunFailed {
                run_id: finished.id,
                status: finished.status,
                last_error: finished.last_error,
            });
        }

        let messages = cancellable(&mut self.abort, backend.list_messages(&thread)).await?;
        let Some(reply) = messages
            .into_iter()
            .find(|message| message.role == MessageRole::Assistant)
        else {
            warn!(run_id = %finished.id, thread_id = %thread, "completed run left no assistant message");
            return Err(LabError::protocol_msg(format!(
                "run {} completed but thread {thread} has no assistant message",
                finished.id
            )));
        };

        let mut citations = Vec::new();
        for file_id in reply.cited_file_ids() {
            let file = cancellable(&mut self.abort, backend.retrieve_file(&file_id)).await?;
            citations.push(Citation {
                file_id,
                filename: file.filename,
            });
        }
        info!(run_id = %finished.id, citations = citations.len(), "answer received");

        Ok(Answer {
            run_id: finished.id,
            text: reply.text(),
            citations,
        })
    }
}
