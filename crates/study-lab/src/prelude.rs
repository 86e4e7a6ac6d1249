//! Common imports for typical lab usage.
//!
//! This module exports the builder/runtime types the CLI and most callers
//! need, so they can get by with a single import line.
pub use crate::{
    AbortHandle, AbortSignal, Answer, BootstrapPlan, BootstrapStep, Citation, Lab, LabBuilder,
    LabError, LabState, Note, NoteIssue, OutputStage, PollPolicy, RunStatus, StateStore,
    abort_pair,
};
