//! Study assistant lab: bootstrap a retrieval-augmented assistant, ask it
//! questions, and generate schema-validated study notes.
//!
//! Vendor-specific APIs are namespaced under `vendors::*`; workflows only see
//! the [`AssistantBackend`] trait.
//!
//! # Builder-first usage (OpenAI)
//!
//! ```no_run
//! use study_lab::prelude::*;
//! use study_lab::vendors::openai::OpenAiLabBuilderExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), LabError> {
//! let lab = Lab::builder().openai_from_env()?.build()?;
//! let state = StateStore::for_profile(".", None)?.load()?;
//!
//! let answer = lab
//!     .ask(&state)
//!     .question("What problem does multi-head attention solve?")
//!     .on_status(|status| eprintln!("still {status}"))
//!     .send()
//!     .await?;
//!
//! println!("{}", answer.text.trim());
//! # Ok(())
//! # }
//! ```

/// Question runs against the bootstrapped assistant.
pub mod ask;
/// Remote service contract.
pub mod backend;
/// Assistant creation, document indexing and state persistence.
pub mod bootstrap;
/// Thread message content, citations and answers.
pub mod content;
/// Public error types.
pub mod errors;
/// Lab entry point and builder.
pub mod lab;
/// Remote ids, run and batch statuses.
pub mod model;
/// Structured note generation and validation.
pub mod notes;
/// Process-wide logging setup.
pub mod observability;
/// Bounded polling with backoff and cancellation.
pub mod poll;
/// Common imports for typical usage.
pub mod prelude;
/// Local state file.
pub mod state;
/// Vendor-specific backends and extension traits.
pub mod vendors;

#[cfg(test)]
pub(crate) mod testing;

pub use ask::AskBuilder;
pub use backend::{AssistantBackend, AssistantSpec, JsonChatRequest};
pub use bootstrap::{BootstrapBuilder, BootstrapPlan, BootstrapReport, BootstrapStep};
pub use content::{Answer, Citation, MessageRole, NewMessage, ThreadMessage};
pub use errors::{LabError, OutputStage, ProviderError};
pub use lab::{Lab, LabBuilder};
pub use model::{AssistantId, RunStatus, VectorStoreId};
pub use notes::{FieldProblem, Note, NoteIssue, NotesBuilder};
pub use poll::{AbortHandle, AbortSignal, PollPolicy, abort_pair};
pub use state::{LabState, StateStore};
