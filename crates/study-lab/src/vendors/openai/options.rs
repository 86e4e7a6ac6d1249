/// Header-level OpenAI request options shared by every call.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OpenAiRequestOptions {
    /// Value of the `OpenAI-Beta` header sent to assistant, thread and vector
    /// store endpoints.
    pub assistants_beta: String,
    /// Optional `OpenAI-Organization` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Optional `OpenAI-Project` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl Default for OpenAiRequestOptions {
    fn default() -> Self {
        Self {
            assistants_beta: "assistants=v2".to_string(),
            organization: None,
            project: None,
        }
    }
}

impl OpenAiRequestOptions {
    /// Sets the organization header.
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Sets the project header.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub(crate) fn headers(&self, beta: bool) -> Vec<(&'static str, &str)> {
        let mut headers = Vec::with_capacity(3);
        if beta {
            headers.push(("OpenAI-Beta", self.assistants_beta.as_str()));
        }
        if let Some(org) = self.organization.as_deref() {
            headers.push(("OpenAI-Organization", org));
        }
        if let Some(project) = self.project.as_deref() {
            headers.push(("OpenAI-Project", project));
        }
        headers
    }
}
