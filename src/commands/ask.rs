use tracing::{error, info};

use crate::reply::{self, MESSAGE_CHUNK_LIMIT};
use crate::state::Context;

/// Ask a question about the knowledge base
#[poise::command(slash_command, guild_only)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Your question"] question: String,
    #[description = "Knowledge source (defaults to the first configured)"]
    #[autocomplete = "autocomplete_source"]
    source: Option<String>,
) -> Result<(), anyhow::Error> {
    // Acknowledge immediately; a run can take up to a minute.
    let user_mention = format!("<@{}>", ctx.author().id);
    ctx.say(format!(
        "Got it, searching the knowledge base. I'll ping you when the answer is ready, {}",
        user_mention
    ))
    .await?;

    let settings = ctx.data().config.read().await.run_settings();

    info!(
        user = ctx.author().name,
        question,
        source = source.as_deref(),
        "Question received"
    );

    let answer = match ctx
        .data()
        .rag
        .ask(&question, source.as_deref(), &settings)
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            error!(error = format!("{:#}", e), "Question failed");
            ctx.say(format!("{} {}", user_mention, reply::user_facing_error(&e)))
                .await?;
            return Ok(());
        }
    };

    info!(
        source = answer.source_name,
        poll_attempts = answer.poll_attempts,
        citation_count = answer.citation_count,
        "Answer ready"
    );

    let full = format!(
        "{} here's what I found in **{}**:\n\n**Q:** {}\n\n**A:** {}",
        user_mention,
        answer.source_name,
        question,
        reply::compose(&answer)
    );
    for chunk in reply::split_chunks(&full, MESSAGE_CHUNK_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Autocomplete for configured knowledge source names.
async fn autocomplete_source(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let partial = partial.to_lowercase();
    ctx.data()
        .rag
        .knowledge()
        .names()
        .filter(|name| name.to_lowercase().contains(&partial))
        .take(25)
        .map(str::to_string)
        .collect()
}
