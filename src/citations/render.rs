use std::borrow::Cow;

use super::{CitationOptions, CitationRecord, SourceRegistry};

/// Render the numbered source list. Empty when nothing was cited.
pub fn render(registry: &SourceRegistry, options: &CitationOptions) -> String {
    if registry.is_empty() {
        return String::new();
    }

    let mut records: Vec<&CitationRecord> = registry.records().iter().collect();
    records.sort_by_key(|r| r.index);

    let mut out = format!("{}\n", options.header);
    for record in records {
        out.push_str(&format!("[{}] {}\n", record.index, record.display_name));
        if !record.quote.trim().is_empty() {
            out.push_str(&format!(
                "    > {}\n",
                truncate_chars(&record.quote, options.quote_max_chars)
            ));
        }
    }
    out.truncate(out.trim_end().len());
    out
}

/// Cut `text` to at most `max` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}
