use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use tokio::sync::RwLock;

use crate::citations::{CitationOptions, DedupStrategy, MarkerStyle, DEFAULT_QUOTE_MAX_CHARS};
use crate::rag::run::{Backoff, PollPolicy};
use crate::rag::{RagEngine, RunSettings};

/// Upper bound for exponential backoff, as a multiple of the base interval.
const BACKOFF_CAP_FACTOR: u32 = 8;

/// Runtime-tunable parameters (admins can modify these at runtime).
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub max_poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub exponential_backoff: bool,
    pub quote_max_chars: usize,
    pub style: MarkerStyle,
    pub dedup: DedupStrategy,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: 30,
            poll_interval_ms: 1000,
            exponential_backoff: false,
            quote_max_chars: DEFAULT_QUOTE_MAX_CHARS,
            style: MarkerStyle::Bracket,
            dedup: DedupStrategy::ByFileId,
        }
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let exponential_backoff = match dotenv::var("POLL_BACKOFF") {
            Ok(v) => match v.trim().to_lowercase().as_str() {
                "fixed" => false,
                "exponential" => true,
                other => return Err(anyhow!("POLL_BACKOFF must be fixed or exponential, got `{}`", other)),
            },
            Err(_) => defaults.exponential_backoff,
        };
        let style = match dotenv::var("CITATION_STYLE") {
            Ok(v) => MarkerStyle::parse(&v)
                .ok_or_else(|| anyhow!("CITATION_STYLE must be bracket or footnote, got `{}`", v))?,
            Err(_) => defaults.style,
        };
        let dedup = match dotenv::var("CITATION_DEDUP") {
            Ok(v) => DedupStrategy::parse(&v)
                .ok_or_else(|| anyhow!("CITATION_DEDUP must be file or none, got `{}`", v))?,
            Err(_) => defaults.dedup,
        };

        let config = Self {
            max_poll_attempts: env_or("MAX_POLL_ATTEMPTS", defaults.max_poll_attempts)?,
            poll_interval_ms: env_or("POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            exponential_backoff,
            quote_max_chars: env_or("QUOTE_MAX_CHARS", defaults.quote_max_chars)?,
            style,
            dedup,
        };
        config.validate()?;
        Ok(config)
    }

    /// Same rule `/kb config` applies: every tunable must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_poll_attempts == 0 {
            bail!("MAX_POLL_ATTEMPTS must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be at least 1");
        }
        if self.quote_max_chars == 0 {
            bail!("QUOTE_MAX_CHARS must be at least 1");
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        let interval = Duration::from_millis(self.poll_interval_ms);
        let backoff = if self.exponential_backoff {
            Backoff::Exponential {
                initial: interval,
                max: interval.saturating_mul(BACKOFF_CAP_FACTOR),
            }
        } else {
            Backoff::Fixed(interval)
        };
        PollPolicy {
            max_attempts: self.max_poll_attempts,
            backoff,
        }
    }

    pub fn citation_options(&self) -> CitationOptions {
        CitationOptions {
            style: self.style,
            dedup: self.dedup,
            quote_max_chars: self.quote_max_chars,
            ..Default::default()
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            poll: self.poll_policy(),
            citations: self.citation_options(),
        }
    }
}

/// Parse an optional env var, keeping `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: `{}`", key, raw)),
        Err(_) => Ok(default),
    }
}

pub struct AppState {
    pub rag: Arc<RagEngine>,
    pub admin_ids: HashSet<u64>,
    pub config: Arc<RwLock<BotConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
