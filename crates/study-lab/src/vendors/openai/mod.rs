//! OpenAI backend integration and request options.
//!
//! Vendor-specific configuration lives here so the workflow API can remain
//! vendor-agnostic.
mod adapter;
mod config;
mod options;
mod wire;

use std::sync::Arc;

pub use adapter::OpenAiBackend;
pub use config::OpenAiClientConfig;
pub use options::OpenAiRequestOptions;

use crate::errors::LabError;
use crate::lab::LabBuilder;

/// Extension trait for registering the OpenAI backend on a `LabBuilder`.
pub trait OpenAiLabBuilderExt: Sized {
    /// Uses an `OpenAiBackend` built from explicit configuration.
    fn openai(self, config: OpenAiClientConfig) -> Result<Self, LabError>;

    /// Uses an `OpenAiBackend` configured from `OPENAI_*` environment variables.
    fn openai_from_env(self) -> Result<Self, LabError> {
        self.openai(OpenAiClientConfig::from_env()?)
    }
}

impl OpenAiLabBuilderExt for LabBuilder {
    fn openai(self, config: OpenAiClientConfig) -> Result<Self, LabError> {
        Ok(self.backend(Arc::new(OpenAiBackend::new(config)?)))
    }
}
