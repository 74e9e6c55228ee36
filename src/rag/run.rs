use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::debug;

use crate::llm::Run;

/// Lifecycle state of a remote run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// A status this bot does not know; treated as still pending.
    Unknown(String),
}

impl RunStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            "failed" => Self::Failed,
            "completed" => Self::Completed,
            "incomplete" => Self::Incomplete,
            "expired" => Self::Expired,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Failed | Self::Completed | Self::Incomplete | Self::Expired
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run did not finish after {attempts} status checks")]
    Timeout { attempts: u32 },
    #[error("run ended with status {status}: {message}")]
    Failed { status: RunStatus, message: String },
    #[error("run is waiting for tool output, which this bot never provides")]
    ActionRequired,
    #[error("run completed without an assistant reply")]
    EmptyReply,
}

/// Delay between status checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after every check, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `attempt`-th check (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(interval) => interval,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32 << attempt.saturating_sub(1).min(16);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
        }
    }
}

/// Check the run until it completes, fails, or the attempt ceiling is hit.
/// Returns the number of status checks it took to see `completed`.
pub async fn poll_until_done<F, Fut>(policy: &PollPolicy, mut check: F) -> Result<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Run>>,
{
    for attempt in 1..=policy.max_attempts {
        let run = check().await?;
        let status = RunStatus::parse(&run.status);
        debug!(attempt, run_id = %run.id, %status, "Run status");

        match status {
            RunStatus::Completed => return Ok(attempt),
            RunStatus::RequiresAction => return Err(RunError::ActionRequired.into()),
            status if status.is_terminal() => {
                let message = run
                    .last_error
                    .map(|e| if e.message.is_empty() { e.code } else { e.message })
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "no error detail".to_string());
                return Err(RunError::Failed { status, message }.into());
            }
            _ => {}
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.backoff.delay(attempt)).await;
        }
    }

    Err(RunError::Timeout {
        attempts: policy.max_attempts,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::RunFailure;

    fn run(status: &str) -> Run {
        Run {
            id: "run_1".to_string(),
            status: status.to_string(),
            last_error: None,
        }
    }

    fn instant(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            max_attempts,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(RunStatus::parse("in_progress"), RunStatus::InProgress);
        assert_eq!(RunStatus::parse("completed"), RunStatus::Completed);
        assert_eq!(
            RunStatus::parse("paused"),
            RunStatus::Unknown("paused".to_string())
        );
        assert!(RunStatus::parse("expired").is_terminal());
        assert!(!RunStatus::parse("queued").is_terminal());
        assert!(!RunStatus::parse("paused").is_terminal());
        assert_eq!(RunStatus::RequiresAction.to_string(), "requires_action");
    }

    #[test]
    fn test_backoff_schedule() {
        let fixed = Backoff::Fixed(Duration::from_secs(1));
        assert_eq!(fixed.delay(1), Duration::from_secs(1));
        assert_eq!(fixed.delay(29), Duration::from_secs(1));

        let exp = Backoff::Exponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(4),
        };
        assert_eq!(exp.delay(1), Duration::from_millis(500));
        assert_eq!(exp.delay(2), Duration::from_secs(1));
        assert_eq!(exp.delay(3), Duration::from_secs(2));
        assert_eq!(exp.delay(5), Duration::from_secs(4));
        assert_eq!(exp.delay(40), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_poll_completes() {
        let mut statuses = vec!["queued", "in_progress", "completed"].into_iter();
        let attempts = poll_until_done(&instant(30), || {
            let status = statuses.next().unwrap_or("completed");
            async move { Ok(run(status)) }
        })
        .await
        .unwrap();
        assert_eq!(attempts, 3);
        assert!(statuses.next().is_none());
    }

    #[tokio::test]
    async fn test_poll_times_out_at_ceiling() {
        let mut calls = 0u32;
        let err = poll_until_done(&instant(30), || {
            calls += 1;
            async { Ok(run("in_progress")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls, 30);
        assert!(matches!(
            err.downcast_ref::<RunError>(),
            Some(RunError::Timeout { attempts: 30 })
        ));
    }

    #[tokio::test]
    async fn test_poll_reports_failure() {
        let err = poll_until_done(&instant(5), || async {
            Ok(Run {
                last_error: Some(RunFailure {
                    code: "server_error".to_string(),
                    message: "boom".to_string(),
                }),
                ..run("failed")
            })
        })
        .await
        .unwrap_err();
        match err.downcast_ref::<RunError>() {
            Some(RunError::Failed { status, message }) => {
                assert_eq!(*status, RunStatus::Failed);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_requires_action() {
        let err = poll_until_done(&instant(5), || async { Ok(run("requires_action")) })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RunError>(),
            Some(RunError::ActionRequired)
        ));
    }

    #[tokio::test]
    async fn test_poll_propagates_transport_error() {
        let err = poll_until_done(&instant(5), || async { Err(anyhow::anyhow!("network down")) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("network down"));
    }
}
