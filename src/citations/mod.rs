//! Citation annotation normalization.
//!
//! Takes the raw answer text plus the citation markers the model service
//! attached to it and produces numbered, de-duplicated text with a matching
//! source list. All state lives inside one [`process`] call.

pub mod cleanup;
pub mod collect;
pub mod render;
pub mod resolve;

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

pub use resolve::FileLookup;

pub const DEFAULT_QUOTE_MAX_CHARS: usize = 150;
pub const DEFAULT_HEADER: &str = "**Sources:**";

/// A citation marker attached to a span of generated text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type", default, deserialize_with = "null_as_empty")]
    pub kind: String,
    /// The exact span of answer text this marker covers.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
    #[serde(default)]
    pub file_citation: Option<FileCitation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileCitation {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub file_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub quote: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The numbered form of one cited source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationRecord {
    pub index: usize,
    pub file_id: String,
    pub display_name: String,
    pub quote: String,
}

/// Records for one response, indexed densely from 1 in first-seen order.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    records: Vec<CitationRecord>,
    by_key: HashMap<String, usize>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending index order.
    pub fn records(&self) -> &[CitationRecord] {
        &self.records
    }

    fn index_of(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    /// Register a new source under `key` and return its index.
    fn register(&mut self, key: String, file_id: &str, display_name: String, quote: &str) -> usize {
        let index = self.records.len() + 1;
        self.records.push(CitationRecord {
            index,
            file_id: file_id.to_string(),
            display_name,
            quote: quote.to_string(),
        });
        self.by_key.insert(key, index);
        index
    }
}

/// How in-text citation markers are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerStyle {
    /// `[3]`
    #[default]
    Bracket,
    /// `[^3]`
    Footnote,
}

impl MarkerStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bracket" => Some(Self::Bracket),
            "footnote" => Some(Self::Footnote),
            _ => None,
        }
    }

    pub fn marker(self, index: usize) -> String {
        match self {
            Self::Bracket => format!("[{}]", index),
            Self::Footnote => format!("[^{}]", index),
        }
    }

    /// Regex fragment matching one marker, without capture groups.
    pub(crate) fn pattern(self) -> &'static str {
        match self {
            Self::Bracket => r"\[\d+\]",
            Self::Footnote => r"\[\^\d+\]",
        }
    }
}

/// Which annotations share a citation index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupStrategy {
    /// One index per distinct file.
    #[default]
    ByFileId,
    /// One index per annotation.
    PerAnnotation,
}

impl DedupStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "file" | "by_file_id" | "file_id" => Some(Self::ByFileId),
            "none" | "per_annotation" => Some(Self::PerAnnotation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CitationOptions {
    pub style: MarkerStyle,
    pub dedup: DedupStrategy,
    pub quote_max_chars: usize,
    pub header: String,
}

impl Default for CitationOptions {
    fn default() -> Self {
        Self {
            style: MarkerStyle::default(),
            dedup: DedupStrategy::default(),
            quote_max_chars: DEFAULT_QUOTE_MAX_CHARS,
            header: DEFAULT_HEADER.to_string(),
        }
    }
}

/// Output of the pipeline, ready for the presentation layer.
#[derive(Debug, Clone)]
pub struct Cited {
    pub text: String,
    /// Rendered source list; empty when nothing was cited.
    pub sources: String,
    pub citation_count: usize,
}

/// Run the full pipeline: collect, clean up, render.
pub async fn process<L>(
    text: &str,
    annotations: &[Annotation],
    lookup: &L,
    options: &CitationOptions,
) -> Cited
where
    L: FileLookup + ?Sized,
{
    let (marked, registry) = collect::collect(text, annotations, lookup, options).await;
    Cited {
        text: cleanup::clean(&marked, options.style),
        sources: render::render(&registry, options),
        citation_count: registry.len(),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{cite, StaticLookup};
    use super::*;

    #[test]
    fn test_annotation_from_service_json() {
        let json = serde_json::json!({
            "type": "file_citation",
            "text": "【4:0†handbook.pdf】",
            "start_index": 10,
            "end_index": 28,
            "file_citation": { "file_id": "file-abc123", "quote": null }
        });
        let annotation: Annotation = serde_json::from_value(json).unwrap();
        assert_eq!(annotation.kind, "file_citation");
        assert_eq!(annotation.text, "【4:0†handbook.pdf】");
        let citation = annotation.file_citation.unwrap();
        assert_eq!(citation.file_id, "file-abc123");
        assert_eq!(citation.quote, "");
    }

    #[test]
    fn test_annotation_without_payload() {
        let json = serde_json::json!({
            "type": "file_path",
            "text": "sandbox:/mnt/data/out.csv",
            "file_path": { "file_id": "file-xyz" }
        });
        let annotation: Annotation = serde_json::from_value(json).unwrap();
        assert!(annotation.file_citation.is_none());
    }

    #[test]
    fn test_marker_styles() {
        assert_eq!(MarkerStyle::Bracket.marker(3), "[3]");
        assert_eq!(MarkerStyle::Footnote.marker(3), "[^3]");
        assert_eq!(MarkerStyle::parse("Footnote"), Some(MarkerStyle::Footnote));
        assert_eq!(MarkerStyle::parse("superscript"), None);
    }

    #[test]
    fn test_dedup_parse() {
        assert_eq!(DedupStrategy::parse("by-file-id"), Some(DedupStrategy::ByFileId));
        assert_eq!(DedupStrategy::parse("none"), Some(DedupStrategy::PerAnnotation));
        assert_eq!(DedupStrategy::parse("quote"), None);
    }

    #[tokio::test]
    async fn test_process_end_to_end() {
        let lookup = StaticLookup::new(&[("file-a", "Handbook.pdf"), ("file-b", "faq.md")]);
        let text = "Leave is 20 days【4:0†source】. Requests go to HR【4:1†source】【4:2†source】.";
        let annotations = vec![
            cite("file-a", "Employees receive 20 days", "【4:0†source】"),
            cite("file-b", "Submit requests to HR", "【4:1†source】"),
            cite("file-a", "ignored second quote", "【4:2†source】"),
        ];

        let cited = process(text, &annotations, &lookup, &CitationOptions::default()).await;

        assert_eq!(
            cited.text,
            "Leave is 20 days[1].\n\nRequests go to HR[2][1]."
        );
        assert_eq!(cited.citation_count, 2);
        assert_eq!(
            cited.sources,
            "**Sources:**\n[1] Handbook\n    > Employees receive 20 days\n[2] faq\n    > Submit requests to HR"
        );
    }

    #[tokio::test]
    async fn test_process_without_annotations() {
        let lookup = StaticLookup::default();
        let cited = process("Plain answer.", &[], &lookup, &CitationOptions::default()).await;
        assert_eq!(cited.text, "Plain answer.");
        assert!(cited.sources.is_empty());
        assert_eq!(cited.citation_count, 0);
        assert_eq!(lookup.call_count(), 0);
    }
}
