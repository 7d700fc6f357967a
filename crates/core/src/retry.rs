use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::trace;

/// Bounded retry schedule shared by element resolution and inbox polling.
///
/// An attempt either produces a value (done) or comes up empty, in which
/// case the policy sleeps `interval` (plus optional jitter) and tries again
/// until the attempt bound or the elapsed bound is hit.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: Option<u32>,
    pub max_elapsed: Option<Duration>,
    pub interval: Duration,
    pub jitter: Option<Duration>,
}

/// How a retry loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Completed { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Completed { value, .. } => Some(value),
            RetryOutcome::Exhausted { .. } => None,
        }
    }
}

impl BackoffPolicy {
    /// Retry a fixed number of times with a fixed pause between attempts.
    pub fn attempts(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            max_elapsed: None,
            interval,
            jitter: None,
        }
    }

    /// Retry until a wall-clock budget is spent.
    pub fn deadline(max_elapsed: Duration, interval: Duration) -> Self {
        Self {
            max_attempts: None,
            max_elapsed: Some(max_elapsed),
            interval,
            jitter: None,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    fn pause(&self) -> Duration {
        match self.jitter {
            Some(j) if !j.is_zero() => {
                let extra = rand::thread_rng().gen_range(Duration::ZERO..j);
                self.interval + extra
            }
            _ => self.interval,
        }
    }

    /// Drive `attempt` until it yields a value or the policy is spent.
    ///
    /// The closure receives the 1-based attempt number. No sleep happens
    /// after the final attempt.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let started = Instant::now();
        let mut n: u32 = 0;

        loop {
            n += 1;
            if let Some(value) = attempt(n).await {
                return RetryOutcome::Completed { value, attempts: n };
            }

            if let Some(max) = self.max_attempts {
                if n >= max {
                    return RetryOutcome::Exhausted { attempts: n };
                }
            }
            if let Some(max) = self.max_elapsed {
                if started.elapsed() >= max {
                    return RetryOutcome::Exhausted { attempts: n };
                }
            }

            trace!(attempt = n, "retry attempt came up empty, backing off");
            tokio::time::sleep(self.pause()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn completes_on_first_success() {
        let policy = BackoffPolicy::attempts(5, Duration::from_millis(1));
        let outcome = policy.run(|n| async move { (n == 3).then_some(n) }).await;
        assert_eq!(
            outcome,
            RetryOutcome::Completed {
                value: 3,
                attempts: 3
            }
        );
    }

    #[tokio::test]
    async fn exhausts_after_exact_attempt_count() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::attempts(3, Duration::from_millis(1));
        let outcome: RetryOutcome<()> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { None }
            })
            .await;
        assert_eq!(outcome, RetryOutcome::Exhausted { attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deadline_bound_stops_retrying() {
        let policy =
            BackoffPolicy::deadline(Duration::from_millis(20), Duration::from_millis(5));
        let outcome: RetryOutcome<()> = policy.run(|_| async { None }).await;
        match outcome {
            RetryOutcome::Exhausted { attempts } => assert!(attempts >= 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
