use poise::serenity_prelude as serenity;
use tracing::{error, info};

use crate::reply;
use crate::state::AppState;

const EMPTY_QUESTION_REPLY: &str = "What would you like to ask?";
const SEARCHING_REPLY: &str = "🤔 Searching the knowledge base...";

/// Gateway event handler: answers questions asked by mentioning the bot or
/// by direct message.
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, AppState, anyhow::Error>,
    data: &AppState,
) -> Result<(), anyhow::Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        handle_message(ctx, new_message, data).await?;
    }
    Ok(())
}

async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &AppState,
) -> Result<(), anyhow::Error> {
    if msg.author.bot {
        return Ok(());
    }

    let bot_id = ctx.cache.current_user().id;
    let is_dm = msg.guild_id.is_none();
    if !is_dm && !msg.mentions_user_id(bot_id) {
        return Ok(());
    }

    let question = strip_mentions(&msg.content, bot_id.get());
    if question.is_empty() {
        msg.reply(ctx, EMPTY_QUESTION_REPLY).await?;
        return Ok(());
    }

    info!(user = msg.author.name, question, is_dm, "Mention received");

    let mut pending = msg.reply(ctx, SEARCHING_REPLY).await?;
    let settings = data.config.read().await.run_settings();

    let embed = match data.rag.ask(&question, None, &settings).await {
        Ok(answer) => {
            info!(
                source = answer.source_name,
                citation_count = answer.citation_count,
                "Mention answered"
            );
            reply::answer_embed(&answer)
        }
        Err(e) => {
            error!(error = format!("{:#}", e), "Error processing question");
            reply::error_embed(&reply::user_facing_error(&e))
        }
    };

    pending
        .edit(ctx, serenity::EditMessage::new().content("").embed(embed))
        .await?;
    Ok(())
}

/// Remove `<@id>` and `<@!id>` mentions of the bot and trim.
pub fn strip_mentions(content: &str, bot_id: u64) -> String {
    content
        .replace(&format!("<@{}>", bot_id), "")
        .replace(&format!("<@!{}>", bot_id), "")
        .trim()
        .to_string()
}
