//! Bounded retry with fixed delays and rate-limit cooldowns
//!
//! Both remote clients wrap their calls in [`retry_with_policy`]. The caller
//! supplies two predicates: one that sorts each error into a [`Disposition`],
//! and one that decides whether an exhausted budget escalates to a fatal
//! condition.
//!
//! A policy may carry a shutdown flag; waits are then taken in short slices and
//! abandoned once the flag is raised.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Longest uninterrupted sleep while a shutdown flag is watched
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// How to react to one failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Wait `delay` and try again; consumes one attempt
    Retry,
    /// Wait `cooldown` and try again
    Cooldown {
        /// When false the attempt is free and the loop may continue forever
        counts_against_budget: bool,
    },
    /// Give up immediately
    Abort,
}

/// Attempt budget and wait times
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub cooldown: Duration,
    shutdown: Option<Arc<AtomicBool>>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, cooldown: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            cooldown,
            shutdown: None,
        }
    }

    /// Policy with no waiting, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.set_shutdown(flag);
        self
    }

    /// Stop retrying once `flag` is raised, even mid-wait
    pub fn set_shutdown(&mut self, flag: Arc<AtomicBool>) {
        self.shutdown = Some(flag);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Sleep for `wait`; returns false if shutdown was requested meanwhile
    async fn pause(&self, wait: Duration) -> bool {
        if self.shutdown.is_none() {
            if !wait.is_zero() {
                sleep(wait).await;
            }
            return true;
        }

        let deadline = Instant::now() + wait;
        loop {
            if self.shutdown_requested() {
                return false;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return true;
            }
            sleep(left.min(SHUTDOWN_POLL)).await;
        }
    }
}

/// Counters describing how a retry loop went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Calls made, including free ones
    pub calls: u32,
    /// Attempts charged against the budget
    pub charged: u32,
    /// Cooldown waits taken
    pub cooldowns: u32,
}

/// Why a retry loop ended without a value
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The disposition predicate said stop
    Aborted { error: E, stats: RetryStats },
    /// The budget ran out
    Exhausted { error: E, stats: RetryStats },
    /// The budget ran out and the escalation predicate fired
    Escalated { error: E, stats: RetryStats },
    /// Shutdown was requested before the next attempt
    Interrupted { error: E, stats: RetryStats },
}

impl<E> RetryError<E> {
    pub fn error(&self) -> &E {
        match self {
            RetryError::Aborted { error, .. }
            | RetryError::Exhausted { error, .. }
            | RetryError::Escalated { error, .. }
            | RetryError::Interrupted { error, .. } => error,
        }
    }

    pub fn stats(&self) -> RetryStats {
        match self {
            RetryError::Aborted { stats, .. }
            | RetryError::Exhausted { stats, .. }
            | RetryError::Escalated { stats, .. }
            | RetryError::Interrupted { stats, .. } => *stats,
        }
    }
}

/// Run `op` until it succeeds or the policy says stop
///
/// `op` receives the 1-based call number. `disposition` classifies each
/// error; `escalate` is only consulted once the budget is exhausted.
pub async fn retry_with_policy<T, E, Op, Fut, D, X>(
    label: &str,
    policy: &RetryPolicy,
    mut op: Op,
    disposition: D,
    escalate: X,
) -> std::result::Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
    D: Fn(&E) -> Disposition,
    X: Fn(&E, &RetryStats) -> bool,
{
    let mut stats = RetryStats::default();

    loop {
        stats.calls += 1;
        let error = match op(stats.calls).await {
            Ok(value) => {
                if stats.calls > 1 {
                    info!("{} succeeded on call {}", label, stats.calls);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let wait = match disposition(&error) {
            Disposition::Abort => {
                warn!("{} failed permanently: {}", label, error);
                return Err(RetryError::Aborted { error, stats });
            }
            Disposition::Retry => {
                stats.charged += 1;
                policy.delay
            }
            Disposition::Cooldown {
                counts_against_budget,
            } => {
                stats.cooldowns += 1;
                if counts_against_budget {
                    stats.charged += 1;
                }
                policy.cooldown
            }
        };

        if stats.charged >= policy.max_attempts {
            warn!(
                "{} failed after {} attempts: {}",
                label, policy.max_attempts, error
            );
            if escalate(&error, &stats) {
                return Err(RetryError::Escalated { error, stats });
            }
            return Err(RetryError::Exhausted { error, stats });
        }

        warn!(
            "{} failed (attempt {}/{}): {}. Retrying in {}...",
            label,
            stats.charged.max(1),
            policy.max_attempts,
            error,
            humantime::format_duration(wait)
        );
        if !policy.pause(wait).await {
            info!("{} abandoned: shutdown requested", label);
            return Err(RetryError::Interrupted { error, stats });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Transient,
        Throttled,
        Denied,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn classify(counts: bool) -> impl Fn(&TestError) -> Disposition {
        move |e| match e {
            TestError::Transient => Disposition::Retry,
            TestError::Throttled => Disposition::Cooldown {
                counts_against_budget: counts,
            },
            TestError::Denied => Disposition::Abort,
        }
    }

    fn never(_: &TestError, _: &RetryStats) -> bool {
        false
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_errors() {
        let calls = Cell::new(0);
        let result = retry_with_policy(
            "test",
            &RetryPolicy::immediate(3),
            |_| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(TestError::Transient)
                    } else {
                        Ok(n)
                    }
                }
            },
            classify(true),
            never,
        )
        .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let result: Result<(), _> = retry_with_policy(
            "test",
            &RetryPolicy::immediate(3),
            |_| async { Err(TestError::Transient) },
            classify(true),
            never,
        )
        .await;

        match result {
            Err(RetryError::Exhausted { stats, .. }) => {
                assert_eq!(stats.calls, 3);
                assert_eq!(stats.charged, 3);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_abort_stops_immediately() {
        let result: Result<(), _> = retry_with_policy(
            "test",
            &RetryPolicy::immediate(5),
            |_| async { Err(TestError::Denied) },
            classify(true),
            never,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Aborted { .. }));
        assert_eq!(err.stats().calls, 1);
    }

    #[tokio::test]
    async fn test_free_cooldowns_do_not_consume_budget() {
        let result = retry_with_policy(
            "test",
            &RetryPolicy::immediate(1),
            |call| async move {
                if call <= 10 {
                    Err(TestError::Throttled)
                } else {
                    Ok(call)
                }
            },
            classify(false),
            never,
        )
        .await;

        assert_eq!(result, Ok(11));
    }

    #[tokio::test]
    async fn test_escalates_after_repeated_cooldowns() {
        let result: Result<(), _> = retry_with_policy(
            "test",
            &RetryPolicy::immediate(3),
            |call| async move {
                if call == 1 {
                    Err(TestError::Transient)
                } else {
                    Err(TestError::Throttled)
                }
            },
            classify(true),
            |e, stats| *e == TestError::Throttled && stats.cooldowns >= 2,
        )
        .await;

        match result {
            Err(RetryError::Escalated { error, stats }) => {
                assert_eq!(error, TestError::Throttled);
                assert_eq!(stats.cooldowns, 2);
            }
            other => panic!("expected escalation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_cooldown_does_not_escalate() {
        let result: Result<(), _> = retry_with_policy(
            "test",
            &RetryPolicy::immediate(2),
            |call| async move {
                if call == 1 {
                    Err(TestError::Throttled)
                } else {
                    Err(TestError::Transient)
                }
            },
            classify(true),
            |_, stats| stats.cooldowns >= 2,
        )
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_cuts_a_cooldown_short() {
        let flag = Arc::new(AtomicBool::new(false));
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::from_secs(3600))
            .with_shutdown(flag.clone());
        let raise = flag.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            raise.store(true, Ordering::Relaxed);
        });

        let result: Result<(), _> = tokio::time::timeout(
            Duration::from_secs(10),
            retry_with_policy(
                "test",
                &policy,
                |_| async { Err(TestError::Throttled) },
                classify(false),
                never,
            ),
        )
        .await
        .expect("the hour-long cooldown must not be waited out");

        match result {
            Err(RetryError::Interrupted { error, stats }) => {
                assert_eq!(error, TestError::Throttled);
                assert_eq!(stats.calls, 1);
            }
            other => panic!("expected interruption, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_raised_flag_stops_before_next_attempt() {
        let flag = Arc::new(AtomicBool::new(true));
        let policy = RetryPolicy::immediate(5).with_shutdown(flag);

        let result: Result<(), _> = retry_with_policy(
            "test",
            &policy,
            |_| async { Err(TestError::Transient) },
            classify(true),
            never,
        )
        .await;

        assert!(matches!(result, Err(RetryError::Interrupted { .. })));
        assert_eq!(result.unwrap_err().stats().calls, 1);
    }

    #[test]
    fn test_policy_never_allows_zero_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(policy.max_attempts, 1);
    }
}
