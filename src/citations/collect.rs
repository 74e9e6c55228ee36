use std::collections::HashMap;

use tracing::debug;

use super::resolve::{self, FileLookup};
use super::{Annotation, CitationOptions, DedupStrategy, SourceRegistry};

/// Number the cited sources and tag each marker span in `text` with its index.
///
/// Annotations without a file citation are skipped entirely. A source's
/// quote is the one from its first annotation; later quotes are dropped.
pub async fn collect<L>(
    text: &str,
    annotations: &[Annotation],
    lookup: &L,
    options: &CitationOptions,
) -> (String, SourceRegistry)
where
    L: FileLookup + ?Sized,
{
    let mut registry = SourceRegistry::new();
    // One lookup per file id per response.
    let mut names: HashMap<String, String> = HashMap::new();
    let mut out = text.to_string();

    for (position, annotation) in annotations.iter().enumerate() {
        let Some(citation) = annotation
            .file_citation
            .as_ref()
            .filter(|c| !c.file_id.is_empty())
        else {
            debug!(position, kind = %annotation.kind, "Skipping annotation without file citation");
            continue;
        };

        let key = match options.dedup {
            DedupStrategy::ByFileId => citation.file_id.clone(),
            DedupStrategy::PerAnnotation => format!("{}#{}", citation.file_id, position),
        };

        let index = match registry.index_of(&key) {
            Some(index) => index,
            None => {
                let display_name = match names.get(&citation.file_id) {
                    Some(name) => name.clone(),
                    None => {
                        let name = resolve::display_name(lookup, &citation.file_id).await;
                        names.insert(citation.file_id.clone(), name.clone());
                        name
                    }
                };
                registry.register(key, &citation.file_id, display_name, &citation.quote)
            }
        };

        if !tag_first_occurrence(&mut out, &annotation.text, &options.style.marker(index)) {
            debug!(position, index, "Marker span not found in text");
        }
    }

    (out, registry)
}

/// Append `marker` after the first occurrence of `span`.
fn tag_first_occurrence(text: &mut String, span: &str, marker: &str) -> bool {
    if span.is_empty() {
        return false;
    }
    match text.find(span) {
        Some(pos) => {
            text.insert_str(pos + span.len(), marker);
            true
        }
        None => false,
    }
}
