// store/mod.rs
//! Persistence seams for polls and the vote ledger.
//!
//! Methods return `impl Future + Send` so handlers stay `Send` without an
//! `async-trait` dependency. Two backends implement them: [`PgStore`] for
//! production and [`MemoryStore`] for tests and throwaway deployments.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Poll, VoteRecord};
use crate::poll::NewPoll;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Attempts made to find an unused shareable token before giving up.
pub(crate) const TOKEN_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A vote for the same (poll, ip, fingerprint) triple is already stored.
    #[error("duplicate vote")]
    Duplicate,

    #[error("poll {0} does not exist")]
    PollNotFound(Uuid),

    #[error("poll {poll_id} has no option \"{option}\"")]
    UnknownOption { poll_id: Uuid, option: String },

    #[error("could not allocate a unique shareable token")]
    TokenExhausted,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Durable poll records and their counters.
pub trait PollStore: Send + Sync + 'static {
    /// Persist a new active poll with every option at zero votes.
    fn create(&self, poll: NewPoll) -> impl Future<Output = Result<Poll, StoreError>> + Send;

    /// Look up a poll by shareable token regardless of its active flag.
    fn find_by_token(&self, token: &str)
        -> impl Future<Output = Result<Option<Poll>, StoreError>> + Send;

    /// Add one to `counts[option]` and to `total_votes` without a
    /// read-modify-write round trip.
    fn increment_count(&self, poll_id: Uuid, option: &str)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Idempotently clear the active flag.
    fn deactivate(&self, poll_id: Uuid) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Append-only record of accepted votes.
pub trait VoteLedger: Send + Sync + 'static {
    fn has_voted(&self, poll_id: Uuid, voter_ip: &str, voter_fingerprint: &str)
        -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Votes cast from `voter_ip` at or after `since`, across all polls.
    fn recent_vote_count(&self, voter_ip: &str, since: DateTime<Utc>)
        -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Insert a vote. The (poll, ip, fingerprint) uniqueness is enforced here
    /// and reported as [`StoreError::Duplicate`].
    fn record(&self, vote: &VoteRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove entries created before `cutoff`. Returns how many were removed.
    fn purge_older_than(&self, cutoff: DateTime<Utc>)
        -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// A backend that can record a vote and bump the counters as one unit.
pub trait VoteStore: PollStore + VoteLedger {
    /// Insert `vote` and increment its option's counter atomically. Either
    /// both writes land or neither does. Returns the poll as it stands after
    /// the increment.
    fn commit_vote(&self, vote: &VoteRecord)
        -> impl Future<Output = Result<Poll, StoreError>> + Send;
}
