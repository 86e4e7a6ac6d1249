//! Local state shared between the bootstrap and the other workflows.
//!
//! The bootstrap writes the remote ids once; ask and notes read them. The file
//! is a flat JSON object and is replaced wholesale on every save.
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::LabError;
use crate::model::{AssistantId, VectorStoreId};

/// Default state file name in the working directory.
pub const DEFAULT_STATE_FILE: &str = "config.json";

/// Remote ids produced by the bootstrap.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LabState {
    pub assistant_id: AssistantId,
    pub vector_store_id: VectorStoreId,
}

impl LabState {
    pub fn new(assistant_id: AssistantId, vector_store_id: VectorStoreId) -> Self {
        Self {
            assistant_id,
            vector_store_id,
        }
    }
}

#[derive(serde::Deserialize)]
struct RawState {
    assistant_id: Option<String>,
    vector_store_id: Option<String>,
}

/// Resolves, loads and saves the state file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Uses an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolves the state file for an optional profile inside `dir`.
    ///
    /// No profile maps to `config.json`; profile `exam` maps to
    /// `config.exam.json`.
    pub fn for_profile(dir: impl AsRef<Path>, profile: Option<&str>) -> Result<Self, LabError> {
        let file_name = match profile {
            None => DEFAULT_STATE_FILE.to_string(),
            Some(profile) => {
                validate_profile(profile)?;
                format!("config.{profile}.json")
            }
        };
        Ok(Self::at(dir.as_ref().join(file_name)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the state file.
    pub fn load(&self) -> Result<LabState, LabError> {
        let shown = self.path.display().to_string();
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(LabError::MissingState { path: shown });
            }
            Err(err) => return Err(LabError::io(format!("reading {shown}"), err)),
        };
        let raw: RawState =
            serde_json::from_slice(&bytes).map_err(|e| LabError::InvalidState {
                path: shown.clone(),
                message: format!("not a JSON object: {e}"),
            })?;
        let assistant_id = required_field(raw.assistant_id, "assistant_id", &shown)?;
        let vector_store_id = required_field(raw.vector_store_id, "vector_store_id", &shown)?;
        debug!(path = %shown, "loaded lab state");
        Ok(LabState::new(
            AssistantId::new(assistant_id),
            VectorStoreId::new(vector_store_id),
        ))
    }

    /// Replaces the state file with `state`.
    ///
    /// Content goes to a sibling temporary file first and is then renamed over
    /// the target, so readers never observe a partial file.
    pub fn save(&self, state: &LabState) -> Result<(), LabError> {
        let shown = self.path.display().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LabError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut body = serde_json::to_string_pretty(state)
            .map_err(|e| LabError::Io(format!("serializing state: {e}")))?;
        body.push('\n');

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, body)
            .map_err(|e| LabError::io(format!("writing {}", tmp.display()), e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| LabError::io(format!("replacing {shown}"), e))?;
        info!(path = %shown, assistant_id = %state.assistant_id, vector_store_id = %state.vector_store_id, "wrote lab state");
        Ok(())
    }
}

fn required_field(value: Option<String>, field: &str, path: &str) -> Result<String, LabError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(LabError::InvalidState {
            path: path.to_string(),
            message: format!("field '{field}' is empty"),
        }),
        None => Err(LabError::InvalidState {
            path: path.to_string(),
            message: format!("missing field '{field}'"),
        }),
    }
}

fn validate_profile(profile: &str) -> Result<(), LabError> {
    let valid = !profile.is_empty()
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LabError::Config(format!(
            "invalid profile name '{profile}' (allowed: letters, digits, '-', '_')"
        )))
    }
}
