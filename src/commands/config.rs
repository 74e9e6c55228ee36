use tracing::info;

use super::is_admin;
use crate::state::Context;

const PARAMS: &str = "`max_poll_attempts`, `poll_interval_ms`, `quote_max_chars`";

/// Configure polling and citation parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "max_poll_attempts | poll_interval_ms | quote_max_chars"] param: Option<String>,
    #[description = "New value"] value: Option<u32>,
) -> Result<(), anyhow::Error> {
    if !is_admin(&ctx) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = ctx.data().config.read().await;
            ctx.say(format!(
                "**Bot Configuration:**\n\
                 `max_poll_attempts`: {}\n\
                 `poll_interval_ms`: {}\n\
                 `poll_backoff`: {}\n\
                 `quote_max_chars`: {}\n\
                 `citation_style`: {:?}\n\
                 `citation_dedup`: {:?}",
                config.max_poll_attempts,
                config.poll_interval_ms,
                if config.exponential_backoff { "exponential" } else { "fixed" },
                config.quote_max_chars,
                config.style,
                config.dedup,
            ))
            .await?;
        }
        (Some(_), Some(0)) => {
            ctx.say("Value must be greater than zero.").await?;
        }
        // Set a parameter
        (Some(key), Some(val)) => {
            let mut config = ctx.data().config.write().await;
            match key {
                "max_poll_attempts" => config.max_poll_attempts = val,
                "poll_interval_ms" => config.poll_interval_ms = u64::from(val),
                "quote_max_chars" => config.quote_max_chars = val as usize,
                _ => {
                    ctx.say(format!("Unknown param `{}`. Valid: {}", key, PARAMS))
                        .await?;
                    return Ok(());
                }
            }
            drop(config);
            info!(user = ctx.author().name, param = key, value = val, "Config updated");
            ctx.say(format!("`{}` set to {}", key, val)).await?;
        }
        (Some(_), None) => {
            ctx.say("Provide both `param` and `value`. Example: `/kb config max_poll_attempts 45`")
                .await?;
        }
    }

    Ok(())
}
