use std::{
    future::Future,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use rand::Rng;
use tokio_retry::RetryIf;
use tracing::warn;

use crate::error::TransportError;

/// How long to wait before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `initial`, then multiplied by `factor` for every further retry.
    Exponential { initial: Duration, factor: u32 },
    /// `min(2^retry, cap)` seconds plus a uniform jitter in `[0, jitter)`.
    CappedJitter { cap_secs: u64, jitter: Duration },
}

impl Backoff {
    /// Delay before the `retry`-th retry (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::Exponential { initial, factor } => {
                let multiplier = factor.saturating_pow(retry.saturating_sub(1));
                initial.saturating_mul(multiplier)
            }
            Self::CappedJitter { cap_secs, jitter } => {
                let base = 2_u64.saturating_pow(retry).min(cap_secs);
                let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..jitter_ms)
                };
                Duration::from_secs(base).saturating_add(Duration::from_millis(extra))
            }
        }
    }
}

/// A bounded retry loop around one outbound call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub name: &'static str,
    /// Total number of calls, including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retry_if: fn(&TransportError) -> bool,
}

impl RetryPolicy {
    /// Three attempts, 1s then 2s apart, retrying only on rate limiting.
    pub fn rate_limited() -> Self {
        Self {
            name: "rate-limited",
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(1000),
                factor: 2,
            },
            retry_if: TransportError::is_rate_limited,
        }
    }

    /// Six attempts with capped exponential backoff and jitter, retrying on any failure.
    pub fn resilient() -> Self {
        Self {
            name: "resilient",
            max_attempts: 6,
            backoff: Backoff::CappedJitter {
                cap_secs: 20,
                jitter: Duration::from_millis(1000),
            },
            retry_if: |_| true,
        }
    }

    /// The sleeps between attempts, one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let backoff = self.backoff;
        (1..self.max_attempts.max(1)).map(move |retry| backoff.delay(retry))
    }

    /// Runs `action` until it succeeds, the predicate rejects the error, or attempts run out.
    /// The last error is returned unchanged.
    pub async fn run<T, A, Fut>(&self, mut action: A) -> Result<T, TransportError>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let attempt = AtomicU32::new(0);
        let policy = self.name;
        let max_attempts = self.max_attempts;
        let retry_if = self.retry_if;

        RetryIf::start(
            self.delays(),
            || {
                attempt.fetch_add(1, Ordering::Relaxed);
                action()
            },
            |err: &TransportError| {
                let attempt = attempt.load(Ordering::Relaxed);
                let retry = retry_if(err) && attempt < max_attempts;
                if retry {
                    warn!(policy, attempt, max_attempts, error = %err, "outbound call failed; retrying");
                }
                retry
            },
        )
        .await
    }
}
