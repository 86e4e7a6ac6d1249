use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backend::{AssistantBackend, AssistantSpec, JsonChatRequest};
use crate::content::{NewMessage, ThreadMessage};
use crate::errors::{LabError, ProviderError};
use crate::model::{
    AssistantId, BatchId, FileBatch, FileId, FileObject, Run, RunId, ThreadId, VectorStoreId,
};

use super::config::OpenAiClientConfig;
use super::wire;

const OPENAI_BACKEND: &str = "openai";
const MESSAGE_PAGE_LIMIT: &str = "100";

/// Backend for OpenAI's Assistants (v2), Files, Vector Stores and Chat
/// Completions APIs.
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiClientConfig,
}

impl OpenAiBackend {
    /// Creates a backend from explicit client configuration.
    pub fn new(config: OpenAiClientConfig) -> Result<Self, LabError> {
        if config.api_key.trim().is_empty() {
            return Err(LabError::Config(
                "OpenAI client config api_key must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LabError::Config(format!("failed to build OpenAI client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a backend using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, LabError> {
        Self::new(OpenAiClientConfig::from_env()?)
    }

    fn request(&self, method: reqwest::Method, path: &str, beta: bool) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.config.url(path))
            .bearer_auth(&self.config.api_key);
        for (name, value) in self.config.options.headers(beta) {
            builder = builder.header(name, value);
        }
        builder
    }

    async fn send_text(
        &self,
        operation: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<String, ProviderError> {
        debug!(backend = OPENAI_BACKEND, operation, "sending request");
        let response = builder.send().await.map_err(|e| {
            ProviderError::transport(operation, format!("OpenAI request failed: {e}"))
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::transport(operation, format!("failed to read OpenAI response: {e}"))
        })?;
        if !status.is_success() {
            return Err(ProviderError::provider(
                operation,
                format!("OpenAI request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }
        Ok(body)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let body = self.send_text(operation, builder).await?;
        wire::decode(operation, &body)
    }
}

#[async_trait::async_trait]
impl AssistantBackend for OpenAiBackend {
    fn name(&self) -> &str {
        OPENAI_BACKEND
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ProviderError> {
        let req = self
            .request(reqwest::Method::POST, "assistants", true)
            .json(&wire::assistant_body(spec));
        let created: wire::IdOnly = self.send("create_assistant", req).await?;
        Ok(AssistantId::new(created.id))
    }

    async fn create_vector_store(&self, name: &str) -> Result<VectorStoreId, ProviderError> {
        let req = self
            .request(reqwest::Method::POST, "vector_stores", true)
            .json(&wire::vector_store_body(name));
        let created: wire::IdOnly = self.send("create_vector_store", req).await?;
        Ok(VectorStoreId::new(created.id))
    }

    async fn upload_file(&self, path: &Path) -> Result<FileId, ProviderError> {
        const OPERATION: &str = "upload_file";
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ProviderError::transport(OPERATION, format!("reading {}: {e}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        let req = self
            .request(reqwest::Method::POST, "files", false)
            .multipart(form);
        let created: wire::IdOnly = self.send(OPERATION, req).await?;
        Ok(FileId::new(created.id))
    }

    async fn create_file_batch(
        &self,
        vector_store: &VectorStoreId,
        files: &[FileId],
    ) -> Result<FileBatch, ProviderError> {
        let req = self
            .request(
                reqwest::Method::POST,
                &format!("vector_stores/{vector_store}/file_batches"),
                true,
            )
            .json(&wire::file_batch_body(files));
        self.send("create_file_batch", req).await
    }

    async fn retrieve_file_batch(
        &self,
        vector_store: &VectorStoreId,
        batch: &BatchId,
    ) -> Result<FileBatch, ProviderError> {
        let req = self.request(
            reqwest::Method::GET,
            &format!("vector_stores/{vector_store}/file_batches/{batch}"),
            true,
        );
        self.send("retrieve_file_batch", req).await
    }

    async fn attach_vector_store(
        &self,
        assistant: &AssistantId,
        vector_store: &VectorStoreId,
    ) -> Result<(), ProviderError> {
        let req = self
            .request(reqwest::Method::POST, &format!("assistants/{assistant}"), true)
            .json(&wire::attach_vector_store_body(vector_store));
        let _: wire::IdOnly = self.send("attach_vector_store", req).await?;
        Ok(())
    }

    async fn create_thread(&self, messages: &[NewMessage]) -> Result<ThreadId, ProviderError> {
        let req = self
            .request(reqwest::Method::POST, "threads", true)
            .json(&wire::thread_body(messages));
        let created: wire::IdOnly = self.send("create_thread", req).await?;
        Ok(ThreadId::new(created.id))
    }

    async fn create_run(
        &self,
        thread: &ThreadId,
        assistant: &AssistantId,
    ) -> Result<Run, ProviderError> {
        let req = self
            .request(reqwest::Method::POST, &format!("threads/{thread}/runs"), true)
            .json(&wire::run_body(assistant));
        self.send("create_run", req).await
    }

    async fn retrieve_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, ProviderError> {
        let req = self.request(
            reqwest::Method::GET,
            &format!("threads/{thread}/runs/{run}"),
            true,
        );
        self.send("retrieve_run", req).await
    }

    async fn list_messages(&self, thread: &ThreadId) -> Result<Vec<ThreadMessage>, ProviderError> {
        let mut messages = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let req = {
                let mut query = vec![("order", "asc"), ("limit", MESSAGE_PAGE_LIMIT)];
                if let Some(cursor) = after.as_deref() {
                    query.push(("after", cursor));
                }
                self.request(
                    reqwest::Method::GET,
                    &format!("threads/{thread}/messages"),
                    true,
                )
                .query(&query)
            };
            let page: wire::MessagePage = self.send("list_messages", req).await?;
            messages.extend(page.data);
            match (page.has_more, page.last_id) {
                (true, Some(last_id)) => after = Some(last_id),
                _ => break,
            }
        }
        Ok(messages)
    }

    async fn retrieve_file(&self, file: &FileId) -> Result<FileObject, ProviderError> {
        let req = self.request(reqwest::Method::GET, &format!("files/{file}"), false);
        self.send("retrieve_file", req).await
    }

    async fn chat_json(&self, request: &JsonChatRequest) -> Result<String, ProviderError> {
        const OPERATION: &str = "chat_json";
        let req = self
            .request(reqwest::Method::POST, "chat/completions", false)
            .json(&wire::chat_json_body(request));
        let body = self.send_text(OPERATION, req).await?;
        wire::first_choice_content(OPERATION, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunStatus;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    /// Serves one canned HTTP response and returns the raw request head.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let mut chunk = [0_u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.expect("read");
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket
                .write_all(response.as_bytes())
                .await
                .expect("write");
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn backend_for(base_url: &str) -> OpenAiBackend {
        OpenAiBackend::new(OpenAiClientConfig::new("sk-test").base_url(base_url)).expect("backend")
    }

    #[test]
    fn new_rejects_blank_api_key() {
        assert!(matches!(
            OpenAiBackend::new(OpenAiClientConfig::new("  ")),
            Err(LabError::Config(_))
        ));
    }

    #[tokio::test]
    async fn retrieve_run_hits_thread_run_path_with_beta_header() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"id":"run_1","thread_id":"t_1","status":"in_progress","last_error":null}"#,
        )
        .await;
        let run = backend_for(&base)
            .retrieve_run(&ThreadId::new("t_1"), &RunId::new("run_1"))
            .await
            .expect("run");
        assert_eq!(run.status, RunStatus::InProgress);

        let head = server.await.expect("server").to_ascii_lowercase();
        assert!(head.starts_with("get /v1/threads/t_1/runs/run_1 "));
        assert!(head.contains("openai-beta: assistants=v2"));
        assert!(head.contains("authorization: bearer sk-test"));
    }

    #[tokio::test]
    async fn error_status_maps_to_provider_error_with_body() {
        let (base, server) = serve_once(
            "401 Unauthorized",
            r#"{"error":{"message":"Incorrect API key provided"}}"#,
        )
        .await;
        let err = backend_for(&base)
            .retrieve_file(&FileId::new("file_1"))
            .await
            .expect_err("unauthorized");
        let _ = server.await;
        match err {
            ProviderError::Provider {
                operation,
                message,
                status_code,
            } => {
                assert_eq!(operation, "retrieve_file");
                assert_eq!(status_code, Some(401));
                assert!(message.contains("Incorrect API key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn env_gated_smoke_chat_json_if_key_present() {
        if std::env::var("OPENAI_API_KEY")
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            eprintln!("skipping OpenAI smoke test (OPENAI_API_KEY missing)");
            return;
        }

        let backend = OpenAiBackend::from_env().expect("backend");
        let result = backend
            .chat_json(&JsonChatRequest {
                model: "gpt-4o-mini".into(),
                system_prompt: "Return the JSON object {\"ok\": true} and nothing else.".into(),
                temperature: Some(0.0),
            })
            .await;

        assert!(result.is_ok(), "OpenAI smoke failed: {result:?}");
    }
}
