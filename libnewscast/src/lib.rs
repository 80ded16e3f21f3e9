//! Newscast - a news feed to social post daemon
//!
//! This library holds every piece of the `news-send` daemon: the dedup ledger,
//! feed aggregation, the classifier and publisher clients with their quotas and
//! retry rules, notifications, and the cycle orchestrator and scheduler.

pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod feeds;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod platforms;
pub mod publisher;
pub mod quota;
pub mod retry;
pub mod scheduler;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{NewscastError, Result};
pub use orchestrator::{CycleOutcome, CycleReport, Orchestrator};
pub use scheduler::Scheduler;
pub use types::{CandidateItem, Verdict};
