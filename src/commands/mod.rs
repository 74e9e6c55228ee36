mod ask;
mod config;
mod sources;

use crate::state::Context;

/// Knowledge-base assistant
#[poise::command(
    slash_command,
    subcommands("ask::ask", "sources::sources", "config::config")
)]
pub async fn kb(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Whether the invoking user may change runtime settings.
pub fn is_admin(ctx: &Context<'_>) -> bool {
    ctx.data().is_admin(ctx.author().id.get())
}
