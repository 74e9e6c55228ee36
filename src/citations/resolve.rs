use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// Extensions dropped from display names (compared case-insensitively).
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "pdf", "doc", "docx", "rtf", "md"];

const FALLBACK_PREFIX: &str = "File-";

/// Remote file metadata service.
#[async_trait]
pub trait FileLookup: Send + Sync {
    /// Fetch the stored filename for a knowledge-base file id.
    async fn file_name(&self, file_id: &str) -> Result<String>;
}

/// Resolve a file id to a human-readable name.
///
/// One lookup attempt; failures are logged and replaced by a name derived
/// from the id, never returned.
pub async fn display_name<L>(lookup: &L, file_id: &str) -> String
where
    L: FileLookup + ?Sized,
{
    match lookup.file_name(file_id).await {
        Ok(filename) => {
            let name = strip_document_extension(filename.trim());
            if name.is_empty() {
                fallback_name(file_id)
            } else {
                name.to_string()
            }
        }
        Err(e) => {
            warn!(file_id, error = %e, "File name lookup failed, using fallback");
            fallback_name(file_id)
        }
    }
}

pub fn strip_document_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && DOCUMENT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known)) =>
        {
            stem
        }
        _ => filename,
    }
}

pub fn fallback_name(file_id: &str) -> String {
    let short: String = file_id.chars().take(8).collect();
    format!("{}{}", FALLBACK_PREFIX, short)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::testing::StaticLookup;

    #[test]
    fn test_strip_known_extensions() {
        assert_eq!(strip_document_extension("handbook.pdf"), "handbook");
        assert_eq!(strip_document_extension("Notes.DOCX"), "Notes");
        assert_eq!(strip_document_extension("readme.Md"), "readme");
        assert_eq!(strip_document_extension("policy.v2.txt"), "policy.v2");
    }

    #[test]
    fn test_keep_unknown_extensions() {
        assert_eq!(strip_document_extension("data.csv"), "data.csv");
        assert_eq!(strip_document_extension("archive.tar.gz"), "archive.tar.gz");
        assert_eq!(strip_document_extension("no_extension"), "no_extension");
        assert_eq!(strip_document_extension(".md"), ".md");
    }

    #[test]
    fn test_fallback_name() {
        assert_eq!(fallback_name("file-abc123xyz"), "File-file-abc");
        assert_eq!(fallback_name("abc"), "File-abc");
    }

    #[tokio::test]
    async fn test_display_name_success() {
        let lookup = StaticLookup::new(&[("file-1", "Employee Handbook.PDF")]);
        assert_eq!(display_name(&lookup, "file-1").await, "Employee Handbook");
    }

    #[tokio::test]
    async fn test_display_name_lookup_failure() {
        let lookup = StaticLookup::default();
        assert_eq!(display_name(&lookup, "9f8e7d6c5b4a").await, "File-9f8e7d6c");
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn test_display_name_empty_filename() {
        let lookup = StaticLookup::new(&[("file-1", "  ")]);
        assert_eq!(display_name(&lookup, "file-1").await, "File-file-1");
    }
}
