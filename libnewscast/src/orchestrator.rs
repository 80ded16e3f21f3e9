//! One publishing cycle
//!
//! A cycle walks today's candidates oldest first and stops at the first of:
//! a successful post, the end of the list, a spent quota, a shutdown request,
//! or the fatal classifier condition (the only case returned as `Err`).

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::classifier::openai::OpenAiGenerator;
use crate::classifier::ClassifierClient;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{ClassifierError, ConfigError, NewscastError, Result};
use crate::feeds::http::HttpFeedSource;
use crate::feeds::{FeedAggregator, FeedSource};
use crate::ledger::Ledger;
use crate::notify::{notify_best_effort, NoopNotifier, Notifier, TelegramNotifier};
use crate::platforms::x::XPlatform;
use crate::platforms::Platform;
use crate::publisher::{PublishOutcome, Publisher};
use crate::quota::{QuotaBook, QuotaKind};
use crate::retry::RetryPolicy;

/// Which quota ended a cycle early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaBlock {
    Classifier(QuotaKind),
    Publisher,
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { identifier: String, post_id: String },
    /// Every candidate was seen, rejected, or failed
    Exhausted,
    QuotaBlocked(QuotaBlock),
    /// Shutdown was requested mid-cycle
    Interrupted,
}

/// Summary of one cycle, for logs and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    /// Candidates dated today
    pub fetched: usize,
    /// Candidates skipped because the ledger already had them
    pub already_seen: usize,
    /// Classifier calls that produced a verdict
    pub classified: usize,
    /// Negative verdicts
    pub rejected: usize,
    /// Classifier calls that gave up, and positive verdicts that could not be
    /// published
    pub failed: usize,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            outcome: CycleOutcome::Exhausted,
            fetched: 0,
            already_seen: 0,
            classified: 0,
            rejected: 0,
            failed: 0,
        }
    }
}

/// Owns every component and all cross-cycle state
pub struct Orchestrator {
    ledger: Ledger,
    aggregator: FeedAggregator,
    classifier: ClassifierClient,
    publisher: Publisher,
    quotas: QuotaBook,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    notify_timeout: Duration,
    shutdown: Option<Arc<AtomicBool>>,
}

impl Orchestrator {
    pub fn new(
        ledger: Ledger,
        aggregator: FeedAggregator,
        classifier: ClassifierClient,
        publisher: Publisher,
        quotas: QuotaBook,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            aggregator,
            classifier,
            publisher,
            quotas,
            clock,
            notifier: Arc::new(NoopNotifier),
            interval: Duration::from_secs(3600),
            notify_timeout: Duration::from_secs(10),
            shutdown: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// End cycles early, and cut retry waits short, once `flag` is raised
    pub fn set_shutdown(&mut self, flag: Arc<AtomicBool>) {
        self.classifier.set_shutdown(flag.clone());
        self.publisher.set_shutdown(flag.clone());
        self.shutdown = Some(flag);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Wire the production adapters described by `config`
    ///
    /// Secrets are read from the environment here, so a missing one surfaces
    /// as a configuration error before the first cycle.
    pub fn from_config(config: &Config) -> Result<Self> {
        let secrets = config.secrets()?;

        let feed_client = HttpFeedSource::build_client(
            Duration::from_secs(config.feeds.timeout_secs),
            &config.feeds.user_agent,
        )?;
        let sources: Vec<Box<dyn FeedSource>> = config
            .feeds
            .urls
            .iter()
            .map(|url| {
                Box::new(HttpFeedSource::new(feed_client.clone(), url.clone())) as Box<dyn FeedSource>
            })
            .collect();

        let cc = &config.classifier;
        let generator = OpenAiGenerator::new(
            cc.endpoint.clone(),
            cc.model.clone(),
            secrets.classifier_api_key,
            Duration::from_secs(cc.timeout_secs),
        )?
        .with_temperature(cc.temperature);
        let classifier = ClassifierClient::new(
            Box::new(generator),
            RetryPolicy::new(
                cc.max_attempts,
                Duration::from_secs(cc.retry_delay_secs),
                Duration::from_secs(cc.rate_limit_cooldown_secs),
            ),
            cc.topic.clone(),
        )
        .with_format(config.response_format()?);

        let pc = &config.publisher;
        let platform = XPlatform::new(
            pc.api_base.clone(),
            secrets.publisher_access_token,
            Duration::from_secs(pc.timeout_secs),
        )?;
        if !platform.is_configured() {
            return Err(ConfigError::MissingField(pc.access_token_env.clone()).into());
        }
        let publisher = Publisher::new(
            Box::new(platform),
            RetryPolicy::new(
                pc.max_attempts,
                Duration::from_secs(pc.retry_delay_secs),
                Duration::from_secs(pc.rate_limit_cooldown_secs),
            ),
        );

        let notify_timeout = Duration::from_secs(config.schedule.notify_timeout_secs);
        let notifier: Arc<dyn Notifier> = match secrets.telegram {
            Some((token, chat_id)) => {
                let mut telegram = TelegramNotifier::new(token, chat_id, notify_timeout)?;
                if let Some(base) = config.notifier.as_ref().and_then(|n| n.api_base.clone()) {
                    telegram = telegram.with_api_base(base);
                }
                Arc::new(telegram)
            }
            None => Arc::new(NoopNotifier),
        };

        Ok(Self::new(
            Ledger::with_retention(config.ledger_path(), config.ledger.retention_days),
            FeedAggregator::new(sources),
            classifier,
            publisher,
            QuotaBook::new(
                cc.requests_per_minute,
                cc.requests_per_day,
                pc.posts_per_day,
            ),
            Arc::new(SystemClock),
        )
        .with_notifier(notifier)
        .with_interval(config.interval())
        .with_notify_timeout(notify_timeout))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn quotas(&self) -> &QuotaBook {
        &self.quotas
    }

    /// Best-effort operator message
    pub async fn notify(&self, message: &str) {
        notify_best_effort(self.notifier.as_ref(), message, self.notify_timeout).await;
    }

    /// Run one cycle to completion
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let started_at = self.clock.now();
        let today = started_at.date_naive();
        let mut report = CycleReport::new(started_at);

        let seen = match self.ledger.load(today) {
            Ok(seen) => seen,
            Err(e) => {
                error!("Could not load ledger, treating it as empty: {}", e);
                Default::default()
            }
        };

        let candidates = self.aggregator.fetch_today(started_at).await;
        report.fetched = candidates.len();

        for candidate in &candidates {
            if self.shutdown_requested() {
                report.outcome = CycleOutcome::Interrupted;
                return Ok(self.finish(report));
            }

            if seen.contains(&candidate.identifier) {
                report.already_seen += 1;
                debug!("Already handled: {}", candidate.identifier);
                continue;
            }

            let now = self.clock.now();
            if let Some(kind) = self.classifier.check_quota(&mut self.quotas.classifier, now) {
                match self.quotas.classifier.window(kind).resets_at() {
                    Some(at) => info!(
                        "Classifier {} quota reached, ending cycle (reopens at {})",
                        kind,
                        at.format("%Y-%m-%d %H:%M:%S UTC")
                    ),
                    None => info!("Classifier {} quota reached, ending cycle", kind),
                }
                report.outcome = CycleOutcome::QuotaBlocked(QuotaBlock::Classifier(kind));
                return Ok(self.finish(report));
            }

            let verdict = match self
                .classifier
                .classify(candidate, &mut self.quotas.classifier, self.clock.as_ref())
                .await
            {
                Ok(verdict) => verdict,
                Err(ClassifierError::QuotaBlocked(kind)) => {
                    report.outcome = CycleOutcome::QuotaBlocked(QuotaBlock::Classifier(kind));
                    return Ok(self.finish(report));
                }
                Err(e @ ClassifierError::RateLimitExhausted { .. }) => {
                    error!("Classifier is persistently rate limited: {}", e);
                    return Err(NewscastError::Classifier(e));
                }
                Err(e) => {
                    // Not recorded: a later cycle gets another try.
                    warn!("Classifier failed for {}: {}", candidate.identifier, e);
                    report.failed += 1;
                    continue;
                }
            };
            report.classified += 1;

            if !verdict.should_publish {
                report.rejected += 1;
                self.record(&candidate.identifier);
                continue;
            }

            if !self
                .publisher
                .try_reserve(&mut self.quotas.publisher, self.clock.now())
            {
                report.outcome = CycleOutcome::QuotaBlocked(QuotaBlock::Publisher);
                return Ok(self.finish(report));
            }

            match self.publisher.publish(&verdict.text).await {
                PublishOutcome::Published(post_id) => {
                    self.record(&candidate.identifier);
                    let next_run = self.next_run(started_at);
                    self.notify(&format!(
                        "Posted to {}:\n{}\n\n{}\nNext run: {}",
                        self.publisher.platform_name(),
                        verdict.text,
                        candidate.link,
                        next_run.format("%Y-%m-%d %H:%M UTC")
                    ))
                    .await;
                    report.outcome = CycleOutcome::Published {
                        identifier: candidate.identifier.clone(),
                        post_id,
                    };
                    return Ok(self.finish(report));
                }
                PublishOutcome::Interrupted(reason) => {
                    warn!("Shutdown while publishing {}: {}", candidate.identifier, reason);
                    report.outcome = CycleOutcome::Interrupted;
                    return Ok(self.finish(report));
                }
                PublishOutcome::GaveUp(reason) | PublishOutcome::Rejected(reason) => {
                    warn!("Could not publish {}: {}", candidate.identifier, reason);
                    report.failed += 1;
                }
            }
        }

        Ok(self.finish(report))
    }

    /// When the cycle that started at `started_at` will be followed by the next
    pub fn next_run(&self, started_at: DateTime<Utc>) -> DateTime<Utc> {
        let interval =
            chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::zero());
        started_at + interval
    }

    fn record(&self, identifier: &str) {
        if let Err(e) = self.ledger.record(identifier, self.clock.now().date_naive()) {
            error!("Could not record {} in ledger: {}", identifier, e);
        }
    }

    fn finish(&self, report: CycleReport) -> CycleReport {
        info!(
            "Cycle finished: {:?} (fetched {}, seen {}, classified {}, rejected {}, failed {})",
            report.outcome,
            report.fetched,
            report.already_seen,
            report.classified,
            report.rejected,
            report.failed
        );
        report
    }
}
