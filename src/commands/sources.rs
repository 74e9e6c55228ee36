use crate::state::Context;

/// List the configured knowledge sources
#[poise::command(slash_command, guild_only)]
pub async fn sources(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let knowledge = ctx.data().rag.knowledge();
    let default = knowledge.default_source().name.as_str();

    let mut output = String::from("**Knowledge Sources**\n\n");
    for source in knowledge.iter() {
        output.push_str(&format!(
            "- **{}**{} ({} vector store{})\n",
            source.name,
            if source.name == default { " (default)" } else { "" },
            source.vector_store_ids.len(),
            if source.vector_store_ids.len() == 1 { "" } else { "s" },
        ));
    }
    output.push_str("\nUse `/kb ask question:<...> source:<name>` to pick one.");

    ctx.say(output).await?;
    Ok(())
}
