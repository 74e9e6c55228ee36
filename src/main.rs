mod citations;
mod commands;
mod knowledge;
mod llm;
mod mention;
mod rag;
mod reply;
mod state;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, Level};

use knowledge::KnowledgeSources;
use llm::LlmClient;
use rag::RagEngine;
use state::{AppState, BotConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let token = dotenv::var("DISCORD_TOKEN").context("DISCORD_TOKEN required")?;
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    let llm_client = Arc::new(LlmClient::from_env()?);
    info!(model = llm_client.model(), "LLM client initialized");

    let knowledge = KnowledgeSources::from_env()?;
    for source in knowledge.iter() {
        info!(
            source = source.name,
            vector_stores = source.vector_store_ids.join("+"),
            "Knowledge source configured"
        );
    }

    let instructions = dotenv::var("ASSISTANT_INSTRUCTIONS")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| rag::prompts::DEFAULT_INSTRUCTIONS.to_string());
    let preset_assistant = dotenv::var("ASSISTANT_ID").ok().filter(|s| !s.is_empty());
    if let Some(id) = &preset_assistant {
        info!(assistant_id = %id, "Using pre-provisioned assistant for the default source");
    }

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let config = BotConfig::from_env()?;
    info!(?config, "Bot configuration loaded");

    let rag = Arc::new(RagEngine::new(
        llm_client,
        knowledge,
        instructions,
        preset_assistant,
    ));

    let app_state = AppState {
        rag,
        admin_ids,
        config: Arc::new(RwLock::new(config)),
    };

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::kb()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(mention::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting knowledge-base Discord bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
