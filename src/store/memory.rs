// store/memory.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PollStore, StoreError, VoteLedger, VoteStore, TOKEN_ATTEMPTS};
use crate::models::{Poll, VoteRecord};
use crate::poll::{new_shareable_token, NewPoll};

type VoterKey = (Uuid, String, String);

#[derive(Default)]
struct MemInner {
    polls: HashMap<Uuid, Poll>,
    tokens: HashMap<String, Uuid>, // shareable token → poll id
    votes: Vec<VoteRecord>,
    voters: HashSet<VoterKey>,
    by_ip: HashMap<String, Vec<DateTime<Utc>>>, // voter ip → vote timestamps
}

impl MemInner {
    fn insert_vote(&mut self, vote: &VoteRecord) -> Result<(), StoreError> {
        if !self.polls.contains_key(&vote.poll_id) {
            return Err(StoreError::PollNotFound(vote.poll_id));
        }
        let key = (
            vote.poll_id,
            vote.voter_ip.clone(),
            vote.voter_fingerprint.clone(),
        );
        if !self.voters.insert(key) {
            return Err(StoreError::Duplicate);
        }
        self.by_ip
            .entry(vote.voter_ip.clone())
            .or_default()
            .push(vote.created_at);
        self.votes.push(vote.clone());
        Ok(())
    }

    fn bump(&mut self, poll_id: Uuid, option: &str) -> Result<&Poll, StoreError> {
        let poll = self
            .polls
            .get_mut(&poll_id)
            .ok_or(StoreError::PollNotFound(poll_id))?;
        let count = poll
            .counts
            .get_mut(option)
            .ok_or_else(|| StoreError::UnknownOption {
                poll_id,
                option: option.to_string(),
            })?;
        *count += 1;
        poll.total_votes += 1;
        Ok(&*poll)
    }
}

/// In-memory store behind a single `RwLock`.
///
/// Every mutation happens inside one write guard, so increments cannot be
/// lost and a vote is never visible without its counter bump. Not persisted
/// across restarts.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledger entries currently held.
    pub async fn vote_count(&self) -> usize {
        self.inner.read().await.votes.len()
    }
}

impl PollStore for MemoryStore {
    async fn create(&self, poll: NewPoll) -> Result<Poll, StoreError> {
        let mut g = self.inner.write().await;

        let token = (0..TOKEN_ATTEMPTS)
            .map(|_| new_shareable_token())
            .find(|token| !g.tokens.contains_key(token))
            .ok_or(StoreError::TokenExhausted)?;

        let counts = poll.options.iter().map(|o| (o.clone(), 0)).collect();
        let created = Poll {
            id: Uuid::new_v4(),
            question: poll.question,
            options: poll.options,
            counts,
            total_votes: 0,
            shareable_token: token.clone(),
            created_at: Utc::now(),
            expires_at: poll.expires_at,
            is_active: true,
        };

        g.tokens.insert(token, created.id);
        g.polls.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Poll>, StoreError> {
        let g = self.inner.read().await;
        Ok(g.tokens.get(token).and_then(|id| g.polls.get(id)).cloned())
    }

    async fn increment_count(&self, poll_id: Uuid, option: &str) -> Result<(), StoreError> {
        self.inner.write().await.bump(poll_id, option)?;
        Ok(())
    }

    async fn deactivate(&self, poll_id: Uuid) -> Result<(), StoreError> {
        if let Some(poll) = self.inner.write().await.polls.get_mut(&poll_id) {
            poll.is_active = false;
        }
        Ok(())
    }
}

impl VoteLedger for MemoryStore {
    async fn has_voted(
        &self,
        poll_id: Uuid,
        voter_ip: &str,
        voter_fingerprint: &str,
    ) -> Result<bool, StoreError> {
        let key = (poll_id, voter_ip.to_string(), voter_fingerprint.to_string());
        Ok(self.inner.read().await.voters.contains(&key))
    }

    async fn recent_vote_count(
        &self,
        voter_ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let g = self.inner.read().await;
        let count = g.by_ip.get(voter_ip).map_or(0, |stamps| {
            stamps.iter().filter(|&&at| at >= since).count()
        });
        Ok(count as i64)
    }

    async fn record(&self, vote: &VoteRecord) -> Result<(), StoreError> {
        self.inner.write().await.insert_vote(vote)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut g = self.inner.write().await;
        let before = g.votes.len();

        let (kept, purged): (Vec<_>, Vec<_>) =
            g.votes.drain(..).partition(|v| v.created_at >= cutoff);
        for vote in &purged {
            g.voters.remove(&(
                vote.poll_id,
                vote.voter_ip.clone(),
                vote.voter_fingerprint.clone(),
            ));
        }
        g.votes = kept;

        g.by_ip.retain(|_, stamps| {
            stamps.retain(|&at| at >= cutoff);
            !stamps.is_empty()
        });

        Ok((before - g.votes.len()) as u64)
    }
}

impl VoteStore for MemoryStore {
    async fn commit_vote(&self, vote: &VoteRecord) -> Result<Poll, StoreError> {
        let mut g = self.inner.write().await;

        // Validate the counter target first so a failed bump cannot leave a
        // ledger entry behind.
        let known = g
            .polls
            .get(&vote.poll_id)
            .ok_or(StoreError::PollNotFound(vote.poll_id))?
            .has_option(&vote.option);
        if !known {
            return Err(StoreError::UnknownOption {
                poll_id: vote.poll_id,
                option: vote.option.clone(),
            });
        }

        g.insert_vote(vote)?;
        let poll = g.bump(vote.poll_id, &vote.option)?;
        Ok(poll.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn vote(poll_id: Uuid, option: &str, ip: &str, fingerprint: &str) -> VoteRecord {
        VoteRecord {
            poll_id,
            option: option.to_string(),
            voter_ip: ip.to_string(),
            voter_fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
        }
    }

    async fn poll(store: &MemoryStore) -> Poll {
        let new = NewPoll::parse("Tabs or spaces?", &["tabs".to_string(), "spaces".to_string()], None).unwrap();
        store.create(new).await.unwrap()
    }

    #[tokio::test]
    async fn create_initializes_counts() {
        let store = MemoryStore::new();
        let poll = poll(&store).await;

        assert!(poll.is_active);
        assert_eq!(poll.total_votes, 0);
        assert_eq!(poll.counts.len(), 2);
        assert_eq!(poll.count_for("tabs"), 0);
        assert_eq!(poll.count_for("spaces"), 0);

        let found = store.find_by_token(&poll.shareable_token).await.unwrap().unwrap();
        assert_eq!(found.id, poll.id);
        assert!(store.find_by_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_rejects_duplicate_triple() {
        let store = MemoryStore::new();
        let poll = poll(&store).await;

        store.record(&vote(poll.id, "tabs", "10.0.0.1", "a")).await.unwrap();
        assert!(matches!(
            store.record(&vote(poll.id, "spaces", "10.0.0.1", "a")).await,
            Err(StoreError::Duplicate)
        ));
        store.record(&vote(poll.id, "tabs", "10.0.0.1", "b")).await.unwrap();

        assert!(store.has_voted(poll.id, "10.0.0.1", "a").await.unwrap());
        assert!(!store.has_voted(poll.id, "10.0.0.2", "a").await.unwrap());
        assert_eq!(store.vote_count().await, 2);
    }

    #[tokio::test]
    async fn commit_with_unknown_option_writes_nothing() {
        let store = MemoryStore::new();
        let poll = poll(&store).await;

        let err = store
            .commit_vote(&vote(poll.id, "neither", "10.0.0.1", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownOption { .. }));
        assert_eq!(store.vote_count().await, 0);
        assert!(!store.has_voted(poll.id, "10.0.0.1", "a").await.unwrap());
    }

    #[tokio::test]
    async fn increment_and_deactivate() {
        let store = MemoryStore::new();
        let poll = poll(&store).await;

        store.increment_count(poll.id, "spaces").await.unwrap();
        store.increment_count(poll.id, "spaces").await.unwrap();
        assert!(matches!(
            store.increment_count(poll.id, "neither").await,
            Err(StoreError::UnknownOption { .. })
        ));

        store.deactivate(poll.id).await.unwrap();
        store.deactivate(poll.id).await.unwrap();

        let found = store.find_by_token(&poll.shareable_token).await.unwrap().unwrap();
        assert_eq!(found.count_for("spaces"), 2);
        assert_eq!(found.total_votes, 2);
        assert!(!found.is_active);
    }

    #[tokio::test]
    async fn purge_keeps_counters_and_frees_triples() {
        let store = MemoryStore::new();
        let poll = poll(&store).await;

        let mut old = vote(poll.id, "tabs", "10.0.0.1", "a");
        old.created_at = Utc::now() - Duration::days(31);
        store.commit_vote(&old).await.unwrap();
        store.commit_vote(&vote(poll.id, "tabs", "10.0.0.1", "b")).await.unwrap();

        let cutoff = Utc::now() - Duration::days(30);
        assert_eq!(store.purge_older_than(cutoff).await.unwrap(), 1);
        assert_eq!(store.vote_count().await, 1);
        assert!(!store.has_voted(poll.id, "10.0.0.1", "a").await.unwrap());

        let found = store.find_by_token(&poll.shareable_token).await.unwrap().unwrap();
        assert_eq!(found.count_for("tabs"), 2);
        assert_eq!(found.total_votes, 2);
    }

    #[tokio::test]
    async fn recent_count_respects_window() {
        let store = MemoryStore::new();
        let poll = poll(&store).await;

        let mut stale = vote(poll.id, "tabs", "10.0.0.1", "a");
        stale.created_at = Utc::now() - Duration::minutes(61);
        store.record(&stale).await.unwrap();
        store.record(&vote(poll.id, "tabs", "10.0.0.1", "b")).await.unwrap();
        store.record(&vote(poll.id, "tabs", "10.0.0.2", "c")).await.unwrap();

        let since = Utc::now() - Duration::minutes(60);
        assert_eq!(store.recent_vote_count("10.0.0.1", since).await.unwrap(), 1);
        assert_eq!(store.recent_vote_count("10.0.0.9", since).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recent_count_follows_purge_and_rejected_inserts() {
        let store = MemoryStore::new();
        let poll = poll(&store).await;

        let mut old = vote(poll.id, "tabs", "10.0.0.1", "a");
        old.created_at = Utc::now() - Duration::days(31);
        store.record(&old).await.unwrap();
        store.record(&vote(poll.id, "tabs", "10.0.0.1", "b")).await.unwrap();
        store.record(&vote(poll.id, "tabs", "10.0.0.2", "c")).await.unwrap();

        // Neither a duplicate nor an unknown option may leave a timestamp.
        assert!(store.record(&vote(poll.id, "tabs", "10.0.0.1", "b")).await.is_err());
        assert!(store
            .commit_vote(&vote(poll.id, "neither", "10.0.0.1", "d"))
            .await
            .is_err());

        let everything = Utc::now() - Duration::days(365);
        assert_eq!(store.recent_vote_count("10.0.0.1", everything).await.unwrap(), 2);

        store
            .purge_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(store.recent_vote_count("10.0.0.1", everything).await.unwrap(), 1);
        assert_eq!(store.recent_vote_count("10.0.0.2", everything).await.unwrap(), 1);

        store.purge_older_than(Utc::now() + Duration::minutes(1)).await.unwrap();
        assert_eq!(store.recent_vote_count("10.0.0.1", everything).await.unwrap(), 0);
        assert!(store.inner.read().await.by_ip.is_empty());
    }
}
