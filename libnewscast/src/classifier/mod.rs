//! Relevance classification and post formatting
//!
//! The [`ClassifierClient`] asks a remote text generation service whether a
//! candidate is worth posting and, if so, for the post text. It enforces the
//! local minute/day quotas before calling out and wraps the call in the shared
//! retry policy.
//!
//! An unreadable answer is a negative verdict. Failed calls reach the caller as
//! errors:
//! - [`ClassifierError::QuotaBlocked`]: a local quota is spent, end the cycle
//! - [`ClassifierError::RateLimitExhausted`]: the service kept rate limiting
//!   us until the retry budget ran out, stop the process
//! - any other error: the retry budget ran out on this candidate, skip it
//!   without recording it so a later cycle tries again

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ClassifierError;
use crate::quota::ClassifierQuota;
use crate::retry::{retry_with_policy, Disposition, RetryError, RetryPolicy};
use crate::text::truncate_with_ellipsis;
use crate::types::{CandidateItem, Verdict};

pub mod mock;
pub mod openai;

/// Maximum length of a post, in characters
pub const POST_CHAR_BUDGET: usize = 280;

/// Rate-limit responses needed before an exhausted budget becomes fatal
const FATAL_RATE_LIMIT_RESPONSES: u32 = 2;

/// Longest summary passed into the prompt
const MAX_SUMMARY_CHARS: usize = 1500;

/// The remote text generation service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Send one prompt and return the raw completion text
    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError>;
}

/// How the service is asked to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// A JSON object with a relevance flag and the post text
    #[default]
    Json,
    /// Free text: the whole answer is the post, `SKIP` means reject
    Plain,
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ResponseFormat::Json),
            "plain" => Ok(ResponseFormat::Plain),
            _ => Err(format!(
                "Invalid response format: '{}'. Valid options: json, plain",
                s
            )),
        }
    }
}

/// Shape of the JSON answer; a few key spellings are tolerated
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(alias = "should_post", alias = "shouldPublish", alias = "publish", alias = "relevant")]
    should_publish: bool,
    #[serde(default, alias = "tweet", alias = "post", alias = "formatted_text", alias = "formattedText")]
    text: Option<String>,
}

/// Client for the classify-and-format call
pub struct ClassifierClient {
    generator: Box<dyn TextGenerator>,
    policy: RetryPolicy,
    topic: String,
    format: ResponseFormat,
}

impl ClassifierClient {
    pub fn new(generator: Box<dyn TextGenerator>, policy: RetryPolicy, topic: impl Into<String>) -> Self {
        Self {
            generator,
            policy,
            topic: topic.into(),
            format: ResponseFormat::Json,
        }
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Abandon retry waits once `flag` is raised
    pub fn set_shutdown(&mut self, flag: Arc<AtomicBool>) {
        self.policy.set_shutdown(flag);
    }

    /// Returns the window that blocks a call at `now`, if any
    ///
    /// Expired windows are reset as a side effect; nothing is counted.
    pub fn check_quota(
        &self,
        quota: &mut ClassifierQuota,
        now: DateTime<Utc>,
    ) -> Option<crate::quota::QuotaKind> {
        quota.blocked_by(now)
    }

    /// Judge one candidate and produce its post text
    ///
    /// The quota is checked before the first call and charged when the answer
    /// arrives, both at the time `clock` reports then.
    pub async fn classify(
        &self,
        candidate: &CandidateItem,
        quota: &mut ClassifierQuota,
        clock: &dyn Clock,
    ) -> Result<Verdict, ClassifierError> {
        if let Some(kind) = quota.blocked_by(clock.now()) {
            return Err(ClassifierError::QuotaBlocked(kind));
        }

        let prompt = self.build_prompt(&candidate.title, &candidate.summary);
        let label = format!("Classifying {:?} via {}", candidate.title, self.generator.name());

        let outcome = retry_with_policy(
            &label,
            &self.policy,
            |_| self.generator.complete(&prompt),
            classify_error,
            |error, stats| {
                matches!(error, ClassifierError::RateLimited(_))
                    && stats.cooldowns >= FATAL_RATE_LIMIT_RESPONSES
            },
        )
        .await;

        let raw = match outcome {
            Ok(raw) => raw,
            Err(RetryError::Escalated { stats, .. }) => {
                return Err(ClassifierError::RateLimitExhausted {
                    attempts: stats.calls,
                    rate_limited: stats.cooldowns,
                });
            }
            Err(e) => {
                warn!(
                    "Giving up on {:?} after {} call(s): {}",
                    candidate.title,
                    e.stats().calls,
                    e.error()
                );
                return Err(e.error().clone());
            }
        };

        // Every answered call counts, whatever the verdict. Retries may have
        // waited, so read the clock again.
        quota.record(clock.now());

        let verdict = self.interpret(&raw);
        info!(
            "Verdict for {:?}: {}",
            candidate.title,
            if verdict.should_publish { "publish" } else { "skip" }
        );
        Ok(verdict)
    }

    /// Build the prompt for one item
    pub fn build_prompt(&self, title: &str, summary: &str) -> String {
        let summary = truncate_with_ellipsis(summary, MAX_SUMMARY_CHARS);
        let answer = match self.format {
            ResponseFormat::Json => format!(
                "Answer with a single JSON object and nothing else:\n\
                 {{\"should_publish\": true|false, \"text\": \"<post text, at most {budget} characters, or empty>\"}}",
                budget = POST_CHAR_BUDGET
            ),
            ResponseFormat::Plain => format!(
                "If the item qualifies, answer with only the post text (at most {budget} characters). \
                 Otherwise answer with the single word SKIP.",
                budget = POST_CHAR_BUDGET
            ),
        };

        format!(
            "You curate a social media account about {topic}.\n\
             Decide whether the news item below should be posted. It qualifies only if:\n\
             - it is about {topic}\n\
             - it is not promotional or sponsored content\n\
             - it makes sense on its own without the linked article\n\
             - it reports a concrete event (something happened, was announced, or was decided)\n\
             If it qualifies, write an engaging post of at most {budget} characters with \
             one or two relevant hashtags.\n\n\
             Title: {title}\n\
             Summary: {summary}\n\n\
             {answer}",
            topic = self.topic,
            budget = POST_CHAR_BUDGET,
            title = title,
            summary = summary,
            answer = answer,
        )
    }

    /// Turn raw completion text into a verdict
    pub fn interpret(&self, raw: &str) -> Verdict {
        let verdict = match self.format {
            ResponseFormat::Json => parse_json_verdict(raw),
            ResponseFormat::Plain => parse_plain_verdict(raw),
        };
        finalize(verdict)
    }
}

fn classify_error(error: &ClassifierError) -> Disposition {
    match error {
        ClassifierError::RateLimited(_) => Disposition::Cooldown {
            counts_against_budget: true,
        },
        ClassifierError::Transport(_) | ClassifierError::Response(_) => Disposition::Retry,
        ClassifierError::QuotaBlocked(_) | ClassifierError::RateLimitExhausted { .. } => {
            Disposition::Abort
        }
    }
}

/// Parse a JSON verdict, tolerating code fences and surrounding prose
pub fn parse_json_verdict(raw: &str) -> Verdict {
    let payload = extract_json_object(raw);
    match serde_json::from_str::<RawVerdict>(payload) {
        Ok(parsed) => Verdict {
            should_publish: parsed.should_publish,
            text: parsed.text.unwrap_or_default(),
        },
        Err(e) => {
            warn!("Could not parse classifier response ({}): {}", e, raw);
            Verdict::rejected()
        }
    }
}

fn parse_plain_verdict(raw: &str) -> Verdict {
    let text = strip_fences(raw).trim().trim_matches('"').trim();
    if text.is_empty() || text.eq_ignore_ascii_case("skip") {
        Verdict::rejected()
    } else {
        Verdict::publish(text)
    }
}

/// Downgrade empty positives and enforce the character budget
fn finalize(mut verdict: Verdict) -> Verdict {
    verdict.text = verdict.text.trim().to_string();
    if verdict.should_publish && verdict.text.is_empty() {
        warn!("Classifier approved an item but returned no text; skipping it");
        return Verdict::rejected();
    }
    if verdict.text.chars().count() > POST_CHAR_BUDGET {
        debug!(
            "Truncating post from {} characters",
            verdict.text.chars().count()
        );
        verdict.text = truncate_with_ellipsis(&verdict.text, POST_CHAR_BUDGET);
    }
    verdict
}

/// Remove a surrounding markdown code fence, if any
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Slice from the first `{` to the last `}`
fn extract_json_object(raw: &str) -> &str {
    let body = strip_fences(raw);
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::mock::ScriptedGenerator;
    use crate::clock::MockClock;
    use crate::quota::QuotaKind;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 10, 12, 0, 0).unwrap()
    }

    fn clock() -> MockClock {
        MockClock::new(now())
    }

    fn candidate() -> CandidateItem {
        CandidateItem::new(
            "Exchange lists token",
            "https://wire.example/1",
            "The exchange said on Monday it will list the token.",
            now(),
        )
    }

    fn client(generator: ScriptedGenerator, attempts: u32) -> ClassifierClient {
        ClassifierClient::new(Box::new(generator), RetryPolicy::immediate(attempts), "crypto")
    }

    #[test]
    fn test_parse_plain_json() {
        let verdict = parse_json_verdict(r#"{"should_publish": true, "text": "Hello #Crypto"}"#);
        assert_eq!(verdict, Verdict::publish("Hello #Crypto"));
    }

    #[test]
    fn test_parse_fenced_json_with_aliases() {
        let raw = "```json\n{\"should_post\": true, \"tweet\": \"Listed! #BTC\"}\n```";
        assert_eq!(parse_json_verdict(raw), Verdict::publish("Listed! #BTC"));
    }

    #[test]
    fn test_parse_json_surrounded_by_prose() {
        let raw = "Sure, here it is: {\"should_publish\": false} Hope that helps.";
        assert_eq!(parse_json_verdict(raw), Verdict::rejected());
    }

    #[test]
    fn test_unparsable_payload_is_negative() {
        assert_eq!(parse_json_verdict("I think yes"), Verdict::rejected());
        assert_eq!(parse_json_verdict("{\"text\": \"missing flag\"}"), Verdict::rejected());
    }

    #[test]
    fn test_plain_format() {
        let client = client(ScriptedGenerator::new(vec![]), 1).with_format(ResponseFormat::Plain);
        assert_eq!(client.interpret("SKIP"), Verdict::rejected());
        assert_eq!(client.interpret("  \"Big news #Crypto\" "), Verdict::publish("Big news #Crypto"));
    }

    #[test]
    fn test_long_text_is_truncated() {
        let client = client(ScriptedGenerator::new(vec![]), 1);
        let long = "x".repeat(400);
        let verdict = client.interpret(&format!("{{\"should_publish\": true, \"text\": \"{}\"}}", long));
        assert!(verdict.should_publish);
        assert_eq!(verdict.text.chars().count(), POST_CHAR_BUDGET);
        assert!(verdict.text.ends_with('…'));
    }

    #[test]
    fn test_positive_without_text_is_negative() {
        let client = client(ScriptedGenerator::new(vec![]), 1);
        assert_eq!(
            client.interpret("{\"should_publish\": true, \"text\": \"  \"}"),
            Verdict::rejected()
        );
    }

    #[test]
    fn test_response_format_from_str() {
        assert_eq!("JSON".parse::<ResponseFormat>().unwrap(), ResponseFormat::Json);
        assert_eq!("plain".parse::<ResponseFormat>().unwrap(), ResponseFormat::Plain);
        assert!("xml".parse::<ResponseFormat>().is_err());
    }

    #[test]
    fn test_prompt_mentions_item_and_budget() {
        let client = client(ScriptedGenerator::new(vec![]), 1);
        let prompt = client.build_prompt("Title here", "Summary here");
        assert!(prompt.contains("Title: Title here"));
        assert!(prompt.contains("Summary: Summary here"));
        assert!(prompt.contains("280"));
        assert!(prompt.contains("crypto"));
    }

    #[tokio::test]
    async fn test_success_records_quota_once() {
        let generator = ScriptedGenerator::new(vec![Ok(
            "{\"should_publish\": false, \"text\": \"\"}".to_string(),
        )]);
        let client = client(generator.clone(), 3);
        let mut quota = ClassifierQuota::new(5, 50);

        let verdict = client.classify(&candidate(), &mut quota, &clock()).await.unwrap();
        assert!(!verdict.should_publish);
        assert_eq!(quota.minute.count(), 1);
        assert_eq!(quota.day.count(), 1);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failures_retry_then_succeed() {
        let generator = ScriptedGenerator::new(vec![
            Err(ClassifierError::Transport("reset".into())),
            Ok("{\"should_publish\": true, \"text\": \"Hi\"}".to_string()),
        ]);
        let client = client(generator.clone(), 3);
        let mut quota = ClassifierQuota::new(5, 50);

        let verdict = client.classify(&candidate(), &mut quota, &clock()).await.unwrap();
        assert_eq!(verdict, Verdict::publish("Hi"));
        assert_eq!(generator.call_count(), 2);
        assert_eq!(quota.day.count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_transport_failures_are_returned() {
        let generator = ScriptedGenerator::failing(ClassifierError::Transport("down".into()));
        let client = client(generator.clone(), 3);
        let mut quota = ClassifierQuota::new(5, 50);

        let err = client.classify(&candidate(), &mut quota, &clock()).await.unwrap_err();
        assert_eq!(err, ClassifierError::Transport("down".into()));
        assert_eq!(generator.call_count(), 3);
        assert_eq!(quota.minute.count(), 0, "failed calls do not consume quota");
    }

    #[tokio::test]
    async fn test_repeated_rate_limits_are_fatal() {
        let generator = ScriptedGenerator::failing(ClassifierError::RateLimited("429".into()));
        let client = client(generator.clone(), 3);
        let mut quota = ClassifierQuota::new(5, 50);

        let err = client.classify(&candidate(), &mut quota, &clock()).await.unwrap_err();
        assert_eq!(
            err,
            ClassifierError::RateLimitExhausted {
                attempts: 3,
                rate_limited: 3
            }
        );
    }

    #[tokio::test]
    async fn test_single_rate_limit_then_exhaustion_is_not_fatal() {
        let generator = ScriptedGenerator::new(vec![
            Err(ClassifierError::RateLimited("429".into())),
            Err(ClassifierError::Transport("reset".into())),
        ]);
        let client = client(generator, 2);
        let mut quota = ClassifierQuota::new(5, 50);

        let err = client.classify(&candidate(), &mut quota, &clock()).await.unwrap_err();
        assert_eq!(err, ClassifierError::Transport("reset".into()));
    }

    #[tokio::test]
    async fn test_quota_blocks_without_outbound_call() {
        let generator = ScriptedGenerator::always("{\"should_publish\": false}");
        let client = client(generator.clone(), 1);
        let mut quota = ClassifierQuota::new(2, 50);
        let clock = clock();

        client.classify(&candidate(), &mut quota, &clock).await.unwrap();
        client.classify(&candidate(), &mut quota, &clock).await.unwrap();
        clock.advance(Duration::seconds(30));
        let err = client.classify(&candidate(), &mut quota, &clock).await.unwrap_err();

        assert_eq!(err, ClassifierError::QuotaBlocked(QuotaKind::Minute));
        assert_eq!(generator.call_count(), 2);

        // The next minute window admits calls again.
        clock.advance(Duration::seconds(30));
        assert_eq!(client.check_quota(&mut quota, clock.now()), None);
        client.classify(&candidate(), &mut quota, &clock).await.unwrap();
        assert_eq!(generator.call_count(), 3);
    }

    /// Answers after moving the clock forward, like a call that sat in a cooldown
    struct SlowGenerator {
        clock: MockClock,
        takes: Duration,
    }

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ClassifierError> {
            self.clock.advance(self.takes);
            Ok("{\"should_publish\": false}".to_string())
        }
    }

    #[tokio::test]
    async fn test_quota_is_charged_when_the_answer_arrives() {
        let clock = clock();
        let client = ClassifierClient::new(
            Box::new(SlowGenerator {
                clock: clock.clone(),
                takes: Duration::seconds(90),
            }),
            RetryPolicy::immediate(1),
            "crypto",
        );
        let mut quota = ClassifierQuota::new(1, 50);

        client.classify(&candidate(), &mut quota, &clock).await.unwrap();

        // The window opened at the answer, not at the check 90s earlier.
        assert_eq!(
            quota.minute.resets_at(),
            Some(now() + Duration::seconds(90) + Duration::seconds(60))
        );
        assert_eq!(quota.blocked_by(now() + Duration::seconds(120)), Some(QuotaKind::Minute));
        assert_eq!(quota.blocked_by(now() + Duration::seconds(150)), None);
    }
}
