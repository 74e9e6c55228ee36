pub mod prompts;
pub mod run;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::citations::{self, Annotation, CitationOptions};
use crate::knowledge::{KnowledgeSource, KnowledgeSources};
use crate::llm::{LlmClient, MessageContent, ThreadMessage};

use run::{PollPolicy, RunError};

/// Per-question knobs, snapshotted from the runtime config.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub poll: PollPolicy,
    pub citations: CitationOptions,
}

pub struct Answer {
    /// Answer text with numbered citation markers.
    pub text: String,
    /// Rendered source list; empty when nothing was cited.
    pub sources: String,
    pub citation_count: usize,
    pub source_name: String,
    pub poll_attempts: u32,
}

pub struct RagEngine {
    llm: Arc<LlmClient>,
    knowledge: KnowledgeSources,
    instructions: String,
    /// Assistant id per knowledge source name.
    assistants: RwLock<HashMap<String, String>>,
}

impl RagEngine {
    pub fn new(
        llm: Arc<LlmClient>,
        knowledge: KnowledgeSources,
        instructions: String,
        preset_assistant: Option<String>,
    ) -> Self {
        let mut assistants = HashMap::new();
        if let Some(id) = preset_assistant {
            assistants.insert(knowledge.default_source().name.clone(), id);
        }
        Self {
            llm,
            knowledge,
            instructions,
            assistants: RwLock::new(assistants),
        }
    }

    pub fn knowledge(&self) -> &KnowledgeSources {
        &self.knowledge
    }

    /// The assistant bound to `source`, created on first use.
    async fn assistant_for(&self, source: &KnowledgeSource) -> Result<String> {
        cached_or_insert(&self.assistants, &source.name, || async {
            let id = self
                .llm
                .create_assistant(
                    &format!("kb-{}", source.name),
                    &self.instructions,
                    &source.vector_store_ids,
                )
                .await?;
            info!(
                source = source.name,
                assistant_id = %id,
                model = self.llm.model(),
                "Assistant created"
            );
            Ok::<_, anyhow::Error>(id)
        })
        .await
    }

    /// Answer `question` from the named knowledge source (default when `None`).
    pub async fn ask(
        &self,
        question: &str,
        source: Option<&str>,
        settings: &RunSettings,
    ) -> Result<Answer> {
        let source = self.knowledge.select(source)?;
        let assistant_id = self.assistant_for(source).await?;

        let thread_id = self.llm.create_thread().await?;
        let message_id = self.llm.add_message(&thread_id, question).await?;
        let run = self.llm.create_run(&thread_id, &assistant_id).await?;
        debug!(
            source = source.name,
            thread_id,
            message_id,
            run_id = run.id,
            "Run started"
        );

        let attempts = run::poll_until_done(&settings.poll, || {
            self.llm.get_run(&thread_id, &run.id)
        })
        .await?;

        let messages = self.llm.list_messages(&thread_id, &run.id).await?;
        let (raw, annotations) =
            extract_reply(&messages, &run.id).ok_or(RunError::EmptyReply)?;
        debug!(
            raw_len = raw.len(),
            annotation_count = annotations.len(),
            "Reply received"
        );

        let cited =
            citations::process(&raw, &annotations, self.llm.as_ref(), &settings.citations).await;

        info!(
            source = source.name,
            attempts,
            answer_len = cited.text.len(),
            citation_count = cited.citation_count,
            "Question answered"
        );

        Ok(Answer {
            text: cited.text,
            sources: cited.sources,
            citation_count: cited.citation_count,
            source_name: source.name.clone(),
            poll_attempts: attempts,
        })
    }
}

/// The value cached under `key`, or the output of `create` stored there.
/// `create` runs without holding the lock; if another caller filled the slot
/// in the meantime, the stored value is kept.
async fn cached_or_insert<F, Fut>(
    cache: &RwLock<HashMap<String, String>>,
    key: &str,
    create: F,
) -> Result<String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    if let Some(value) = cache.read().await.get(key) {
        return Ok(value.clone());
    }

    let created = create().await?;
    let mut cache = cache.write().await;
    let value = cache.entry(key.to_string()).or_insert(created);
    Ok(value.clone())
}

/// Text and annotations of the newest assistant message belonging to `run_id`.
/// Text parts are joined by a blank line; annotations keep their order.
pub fn extract_reply(messages: &[ThreadMessage], run_id: &str) -> Option<(String, Vec<Annotation>)> {
    let message = messages.iter().find(|m| {
        m.role == "assistant" && m.run_id.as_deref().map_or(true, |id| id == run_id)
    })?;
    debug!(message_id = message.id, "Using assistant message");

    let mut parts = Vec::new();
    let mut annotations = Vec::new();
    for content in &message.content {
        if let MessageContent::Text { text } = content {
            parts.push(text.value.as_str());
            annotations.extend(text.annotations.iter().cloned());
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some((parts.join("\n\n"), annotations))
}
