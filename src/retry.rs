use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// How many times to try an async call, how long each try may take, and
/// how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    /// Total tries, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Per-try deadline. Zero disables the deadline.
    pub timeout: Duration,
    /// Fixed delay between a failed try and the next one.
    pub backoff: Duration,
}

#[derive(Debug, Error)]
pub enum AttemptError<E> {
    #[error("timed out after {after:?} (attempt {attempts})")]
    TimedOut { attempts: u32, after: Duration },

    #[error("{last} (attempt {attempts})")]
    Failed { attempts: u32, last: E },
}

impl<E> AttemptError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            AttemptError::TimedOut { attempts, .. } | AttemptError::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

impl AttemptPolicy {
    /// Single try, no deadline.
    pub const ONCE: AttemptPolicy = AttemptPolicy {
        max_attempts: 1,
        timeout: Duration::ZERO,
        backoff: Duration::ZERO,
    };

    /// Balance reads: 3 tries of at most 15s, 2s apart.
    pub fn balance() -> Self {
        AttemptPolicy {
            max_attempts: 3,
            timeout: Duration::from_secs(15),
            backoff: Duration::from_secs(2),
        }
    }

    /// Run `op` until it succeeds or the attempts are used up. The last
    /// failure is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AttemptError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.try_once(op()).await {
                Some(Ok(val)) => return Ok(val),
                Some(Err(e)) => AttemptError::Failed {
                    attempts: attempt,
                    last: e,
                },
                None => AttemptError::TimedOut {
                    attempts: attempt,
                    after: self.timeout,
                },
            };
            if attempt >= max {
                return Err(err);
            }
            warn!("{label}: attempt {attempt}/{max} failed: {err}, retrying in {:?}", self.backoff);
            if !self.backoff.is_zero() {
                tokio::time::sleep(self.backoff).await;
            }
        }
    }

    async fn try_once<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> Option<Result<T, E>> {
        if self.timeout.is_zero() {
            return Some(fut.await);
        }
        tokio::time::timeout(self.timeout, fut).await.ok()
    }
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self::balance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success() {
        let calls = &AtomicU32::new(0);
        let out: Result<u32, AttemptError<String>> = AttemptPolicy::balance()
            .run("test", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 { Err(format!("boom {n}")) } else { Ok(n) }
            })
            .await;
        assert_eq!(out.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let out: Result<(), _> = AttemptPolicy::balance()
            .run("test", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("boom {n}"))
            })
            .await;
        let err = out.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert!(err.to_string().contains("boom 3"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out() {
        let policy = AttemptPolicy {
            max_attempts: 2,
            timeout: Duration::from_secs(10),
            backoff: Duration::from_secs(1),
        };
        let started = tokio::time::Instant::now();
        let out: Result<(), AttemptError<String>> = policy
            .run("test", || std::future::pending::<Result<(), String>>())
            .await;
        assert!(matches!(out, Err(AttemptError::TimedOut { attempts: 2, .. })));
        assert!(started.elapsed() >= Duration::from_secs(21));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let policy = AttemptPolicy {
            max_attempts: 0,
            ..AttemptPolicy::ONCE
        };
        let out: Result<u8, AttemptError<String>> = policy.run("test", || async { Ok(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }
}
