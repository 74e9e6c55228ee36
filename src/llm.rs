use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::citations::{Annotation, FileLookup};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// A run as reported by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub last_error: Option<RunFailure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunFailure {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub filename: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

/// Client for the hosted assistants API.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let api_key = dotenv::var("OPENAI_API_KEY").context("OPENAI_API_KEY required")?;
        let base_url =
            dotenv::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = dotenv::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve an API path against the base URL.
    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if base.ends_with("/v1") {
            format!("{}/{}", base, path)
        } else {
            format!("{}/v1/{}", base, path)
        }
    }

    /// Send a request with auth headers and decode the JSON body.
    /// Non-2xx responses become errors carrying the service's message.
    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let resp = req
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            bail!("{} failed with HTTP {}: {}", what, status, message);
        }
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {} JSON", what))
    }

    fn id_of(json: &Value, what: &str) -> Result<String> {
        json["id"]
            .as_str()
            .map(str::to_string)
            .with_context(|| format!("{} response has no id", what))
    }

    pub async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        vector_store_ids: &[String],
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "name": name,
            "instructions": instructions,
            "tools": [{ "type": "file_search" }],
            "tool_resources": {
                "file_search": { "vector_store_ids": vector_store_ids }
            },
            "temperature": 0.3,
        });
        let json = self
            .send(self.client.post(self.endpoint("assistants")).json(&body), "create assistant")
            .await?;
        Self::id_of(&json, "create assistant")
    }

    pub async fn create_thread(&self) -> Result<String> {
        let json = self
            .send(
                self.client
                    .post(self.endpoint("threads"))
                    .json(&serde_json::json!({})),
                "create thread",
            )
            .await?;
        Self::id_of(&json, "create thread")
    }

    pub async fn add_message(&self, thread_id: &str, content: &str) -> Result<String> {
        let body = serde_json::json!({ "role": "user", "content": content });
        let json = self
            .send(
                self.client
                    .post(self.endpoint(&format!("threads/{}/messages", thread_id)))
                    .json(&body),
                "add message",
            )
            .await?;
        Self::id_of(&json, "add message")
    }

    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let body = serde_json::json!({ "assistant_id": assistant_id });
        let json = self
            .send(
                self.client
                    .post(self.endpoint(&format!("threads/{}/runs", thread_id)))
                    .json(&body),
                "create run",
            )
            .await?;
        serde_json::from_value(json).context("Unexpected create run response")
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let json = self
            .send(
                self.client
                    .get(self.endpoint(&format!("threads/{}/runs/{}", thread_id, run_id))),
                "get run",
            )
            .await?;
        serde_json::from_value(json).context("Unexpected run response")
    }

    /// Messages produced by `run_id`, newest first.
    pub async fn list_messages(&self, thread_id: &str, run_id: &str) -> Result<Vec<ThreadMessage>> {
        let req = self
            .client
            .get(self.endpoint(&format!("threads/{}/messages", thread_id)))
            .query(&[("order", "desc"), ("limit", "20"), ("run_id", run_id)]);
        let json = self.send(req, "list messages").await?;
        let list: MessageList =
            serde_json::from_value(json).context("Unexpected message list response")?;
        debug!(thread_id, run_id, count = list.data.len(), "Fetched thread messages");
        Ok(list.data)
    }

    pub async fn retrieve_file(&self, file_id: &str) -> Result<FileObject> {
        let json = self
            .send(
                self.client.get(self.endpoint(&format!("files/{}", file_id))),
                "retrieve file",
            )
            .await?;
        let file: FileObject =
            serde_json::from_value(json).context("Unexpected file response")?;
        debug!(file_id = %file.id, filename = %file.filename, "File resolved");
        Ok(file)
    }
}

#[async_trait]
impl FileLookup for LlmClient {
    async fn file_name(&self, file_id: &str) -> Result<String> {
        Ok(self.retrieve_file(file_id).await?.filename)
    }
}
