// services.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::VotePolicy;
use crate::error::AppError;
use crate::models::{CreatePollRequest, Poll, VoteRecord};
use crate::origin::RequestOrigin;
use crate::poll::{resolve_fingerprint, NewPoll};
use crate::store::{StoreError, VoteStore};

/// Poll creation, vote processing and result projection over one store.
pub struct PollService<S> {
    store: Arc<S>,
    policy: VotePolicy,
}

impl<S: VoteStore> PollService<S> {
    pub fn new(store: Arc<S>, policy: VotePolicy) -> Self {
        PollService { store, policy }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn create_poll(&self, request: CreatePollRequest) -> Result<Poll, AppError> {
        let new = NewPoll::parse(&request.question, &request.options, request.expires_at)?;
        let poll = self.store.create(new).await?;

        info!(
            poll_id = %poll.id,
            token = %poll.shareable_token,
            options = poll.options.len(),
            "Poll created"
        );
        Ok(poll)
    }

    /// Full poll view for the voting page.
    pub async fn get_poll(&self, token: &str) -> Result<Poll, AppError> {
        self.open_poll(token, Utc::now()).await
    }

    /// Current tallies. Read-only apart from the lazy expiry flip.
    pub async fn get_results(&self, token: &str) -> Result<Poll, AppError> {
        self.open_poll(token, Utc::now()).await
    }

    /// Runs one vote through the precondition chain and commits it.
    ///
    /// Checks, in order: poll exists and is active, poll not expired, option
    /// belongs to the poll, voter has not voted on this poll, voter IP is
    /// under the rate limit. The ledger insert and counter increment are
    /// committed together.
    pub async fn submit_vote(
        &self,
        token: &str,
        option: &str,
        voter_fingerprint: Option<&str>,
        origin: &RequestOrigin,
    ) -> Result<Poll, AppError> {
        let now = Utc::now();
        let poll = self.open_poll(token, now).await?;

        if !poll.has_option(option) {
            info!(token, option, "Vote for unknown option rejected");
            return Err(AppError::InvalidOption);
        }

        let voter_ip = origin.ip();
        let voter_fingerprint = resolve_fingerprint(voter_fingerprint, voter_ip);

        if self
            .store
            .has_voted(poll.id, voter_ip, &voter_fingerprint)
            .await?
        {
            info!(token, voter_ip, "Duplicate vote rejected");
            return Err(AppError::AlreadyVoted);
        }

        let since = now
            .checked_sub_signed(self.policy.rate_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let recent = self.store.recent_vote_count(voter_ip, since).await?;
        if recent >= self.policy.max_votes_per_window {
            warn!(voter_ip, recent, "Vote rate limit reached");
            return Err(AppError::RateLimited);
        }

        let vote = VoteRecord {
            poll_id: poll.id,
            option: option.to_string(),
            voter_ip: voter_ip.to_string(),
            voter_fingerprint,
            created_at: now,
        };

        match self.store.commit_vote(&vote).await {
            Ok(updated) => {
                info!(poll_id = %updated.id, token, voter_ip, option, "Vote recorded");
                Ok(updated)
            }
            Err(StoreError::Duplicate) => {
                info!(token, voter_ip, "Concurrent duplicate vote rejected");
                Err(AppError::AlreadyVoted)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Loads a poll that is still open for reading and voting.
    ///
    /// Inactive polls are reported as missing. An active poll whose
    /// `expires_at` has passed is deactivated here and reported as expired.
    async fn open_poll(&self, token: &str, now: DateTime<Utc>) -> Result<Poll, AppError> {
        let poll = match self.store.find_by_token(token).await? {
            Some(poll) if poll.is_active => poll,
            _ => return Err(AppError::NotFound),
        };

        if poll.is_expired_at(now) {
            if let Err(e) = self.store.deactivate(poll.id).await {
                warn!(poll_id = %poll.id, error = %e, "Failed to deactivate expired poll");
            } else {
                info!(poll_id = %poll.id, token, "Poll expired, deactivated");
            }
            return Err(AppError::Expired);
        }

        Ok(poll)
    }
}
