use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use thiserror::Error;

/// A named retrieval index (one or more vector stores) answers are grounded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeSource {
    pub name: String,
    pub vector_store_ids: Vec<String>,
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("unknown knowledge source `{name}`; available: {available}")]
    UnknownSource { name: String, available: String },
}

/// The configured knowledge sources. The first one is the default.
#[derive(Debug, Clone)]
pub struct KnowledgeSources {
    sources: Vec<KnowledgeSource>,
}

impl KnowledgeSources {
    /// Read `VECTOR_STORES` (`name=vs_1[+vs_2],other=vs_3`), falling back to
    /// a single `VECTOR_STORE_ID` named `default`.
    pub fn from_env() -> Result<Self> {
        if let Ok(spec) = dotenv::var("VECTOR_STORES") {
            return Self::parse(&spec).context("Invalid VECTOR_STORES");
        }
        let id = dotenv::var("VECTOR_STORE_ID")
            .context("VECTOR_STORES or VECTOR_STORE_ID required")?;
        Self::parse(&format!("default={}", id)).context("Invalid VECTOR_STORE_ID")
    }

    pub fn parse(spec: &str) -> Result<Self> {
        let mut sources = Vec::new();
        let mut names = HashSet::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((name, ids)) = entry.split_once('=') else {
                bail!("expected `name=vector_store_id`, got `{}`", entry);
            };
            let name = name.trim();
            if name.is_empty() {
                bail!("knowledge source name missing in `{}`", entry);
            }
            if !names.insert(name.to_lowercase()) {
                bail!("duplicate knowledge source `{}`", name);
            }
            let vector_store_ids: Vec<String> = ids
                .split('+')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            if vector_store_ids.is_empty() {
                bail!("knowledge source `{}` has no vector store id", name);
            }
            sources.push(KnowledgeSource {
                name: name.to_string(),
                vector_store_ids,
            });
        }

        if sources.is_empty() {
            bail!("no knowledge sources configured");
        }
        Ok(Self { sources })
    }

    pub fn default_source(&self) -> &KnowledgeSource {
        &self.sources[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &KnowledgeSource> {
        self.sources.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name.as_str())
    }

    /// Pick a source by name (case-insensitive), or the default when `None`.
    pub fn select(&self, name: Option<&str>) -> Result<&KnowledgeSource, KnowledgeError> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(self.default_source());
        };
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| KnowledgeError::UnknownSource {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }
}
