use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use nimbus_common::{NimbusError, Result};

/// Default interval between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default overall bound on a single wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(6 * 3600);

/// How a wait loop polls: fixed interval, optionally bounded by a number of
/// polls and an overall deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
            timeout: Some(DEFAULT_WAIT_TIMEOUT),
        }
    }
}

impl PollPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Poll `fetch` until `is_terminal` holds, then return that value.
///
/// The first fetch happens immediately. Fetch errors propagate without retry.
/// Exceeding `max_polls` or `timeout` yields `Timeout`; cancelling `cancel`
/// yields `Cancelled` at the next check or while sleeping.
pub async fn wait_until_terminal<T, F, Fut, P>(
    what: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut fetch: F,
    is_terminal: P,
) -> Result<T>
where
    T: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let started = Instant::now();
    let mut polls: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(what));
        }

        let current = fetch().await?;
        polls += 1;

        if is_terminal(&current) {
            tracing::info!(what, polls, state = ?current, "reached terminal state");
            return Ok(current);
        }

        if policy.max_polls.is_some_and(|max| polls >= max) {
            return Err(timeout(what, polls));
        }

        let mut nap = policy.interval;
        if let Some(limit) = policy.timeout {
            let remaining = limit.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(timeout(what, polls));
            }
            nap = nap.min(remaining);
        }

        tracing::info!(what, polls, state = ?current, "waiting");

        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(what)),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}

fn timeout(what: &str, polls: u32) -> NimbusError {
    NimbusError::Timeout {
        what: what.to_string(),
        polls,
    }
}

fn cancelled(what: &str) -> NimbusError {
    NimbusError::Cancelled {
        what: what.to_string(),
    }
}
