//! # ember-engine
//!
//! The swipe and matching engine: quota ledger, candidate queue, decision
//! recording, mutual-match detection and abuse checks, behind the
//! [`SwipeEngine`] facade.
//!
//! Storage is `ember-store`.  Eligibility, candidate supply, notifications
//! and analytics are collaborator traits with default implementations.

pub mod abuse;
pub mod analytics;
pub mod candidates;
pub mod clock;
pub mod config;
pub mod decisions;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod matching;
pub mod notify;
pub mod queue;
pub mod quota;
pub mod scoring;

pub use config::EngineConfig;
pub use engine::{
    DecisionResponse, MatchPage, MatchSummary, ProfileUpdate, QueueEntry, QueueRequest,
    QueueResponse, QuotaStatus, SwipeEngine,
};
pub use error::{EngineError, Result, SinkError};
