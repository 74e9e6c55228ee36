use poise::serenity_prelude as serenity;

use crate::knowledge::KnowledgeError;
use crate::rag::run::RunError;
use crate::rag::Answer;

/// Discord message limit minus a little headroom.
pub const MESSAGE_CHUNK_LIMIT: usize = 1990;
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;

const ANSWER_COLOUR: u32 = 0x0099FF;
const ERROR_COLOUR: u32 = 0xFF0000;

/// Answer text followed by its source list.
pub fn compose(answer: &Answer) -> String {
    if answer.sources.is_empty() {
        answer.text.clone()
    } else {
        format!("{}\n\n{}", answer.text, answer.sources)
    }
}

/// Cut to at most `max` characters, marking the cut with `…`.
pub fn truncate_display(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

/// Split `text` into chunks of at most `max` bytes, preferring to break
/// after a newline, then after a space. Never splits a character.
pub fn split_chunks(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max {
            chunks.push(remaining);
            break;
        }
        let mut limit = max;
        while limit > 0 && !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        if limit == 0 {
            // A single character wider than `max`; emit it whole.
            limit = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(limit);
        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    chunks
}

/// The message shown to users when answering fails.
pub fn user_facing_error(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        if let Some(run_err) = cause.downcast_ref::<RunError>() {
            return match run_err {
                RunError::Timeout { .. } => {
                    "⏱️ The knowledge base took too long to answer. Please try again in a moment."
                        .to_string()
                }
                RunError::EmptyReply => {
                    "I couldn't produce an answer for that question. Try rephrasing it.".to_string()
                }
                _ => "Sorry, something went wrong while processing your question. Please try again later."
                    .to_string(),
            };
        }
        if let Some(KnowledgeError::UnknownSource { .. }) = cause.downcast_ref::<KnowledgeError>() {
            return cause.to_string();
        }
    }
    "Sorry, something went wrong while processing your question. Please try again later."
        .to_string()
}

pub fn answer_embed(answer: &Answer) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("📋 Answer")
        .description(truncate_display(&compose(answer), EMBED_DESCRIPTION_LIMIT))
        .colour(ANSWER_COLOUR)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Knowledge source: {}",
            answer.source_name
        )))
        .timestamp(serenity::Timestamp::now())
}

pub fn error_embed(message: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("❌ Error")
        .description(message)
        .colour(ERROR_COLOUR)
        .timestamp(serenity::Timestamp::now())
}
