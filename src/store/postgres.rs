// store/postgres.rs
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PollStore, StoreError, VoteLedger, VoteStore, TOKEN_ATTEMPTS};
use crate::models::{Poll, VoteRecord};
use crate::poll::{new_shareable_token, NewPoll};

const TOKEN_CONSTRAINT: &str = "polls_shareable_token_key";

// Poll row and its tallies in one statement, so the snapshot that yields
// `total_votes` is the same one that yields every option count.
const POLL_BY_ID: &str = "
    SELECT p.id, p.shareable_token, p.question, p.options, p.total_votes,
           p.created_at, p.expires_at, p.is_active,
           array_agg(o.label ORDER BY o.position) AS labels,
           array_agg(o.votes ORDER BY o.position) AS tallies
    FROM polls p
    JOIN poll_options o ON o.poll_id = p.id
    WHERE p.id = $1
    GROUP BY p.id";

const POLL_BY_TOKEN: &str = "
    SELECT p.id, p.shareable_token, p.question, p.options, p.total_votes,
           p.created_at, p.expires_at, p.is_active,
           array_agg(o.label ORDER BY o.position) AS labels,
           array_agg(o.votes ORDER BY o.position) AS tallies
    FROM polls p
    JOIN poll_options o ON o.poll_id = p.id
    WHERE p.shareable_token = $1
    GROUP BY p.id";

#[derive(sqlx::FromRow)]
struct PollRow {
    id: Uuid,
    shareable_token: String,
    question: String,
    options: Vec<String>,
    total_votes: i64,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    labels: Vec<String>,
    tallies: Vec<i64>,
}

impl From<PollRow> for Poll {
    fn from(row: PollRow) -> Self {
        Poll {
            id: row.id,
            question: row.question,
            options: row.options,
            counts: row.labels.into_iter().zip(row.tallies).collect(),
            total_votes: row.total_votes,
            shareable_token: row.shareable_token,
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
        }
    }
}

/// Postgres-backed store. Counters live in `poll_options` and are only ever
/// changed with `SET votes = votes + 1`, so concurrent voters never overwrite
/// each other.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

fn is_token_conflict(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.constraint() == Some(TOKEN_CONSTRAINT))
}

/// Translate insert failures on `votes` into the ledger's own vocabulary.
fn vote_insert_error(err: sqlx::Error, poll_id: Uuid) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::PollNotFound(poll_id)
        }
        _ => StoreError::Database(err),
    }
}

async fn load_poll(conn: &mut PgConnection, poll_id: Uuid) -> Result<Poll, StoreError> {
    sqlx::query_as::<_, PollRow>(POLL_BY_ID)
        .bind(poll_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Poll::from)
        .ok_or(StoreError::PollNotFound(poll_id))
}

async fn insert_vote(conn: &mut PgConnection, vote: &VoteRecord) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO votes (poll_id, option, voter_ip, voter_fingerprint, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(vote.poll_id)
    .bind(&vote.option)
    .bind(&vote.voter_ip)
    .bind(&vote.voter_fingerprint)
    .bind(vote.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| vote_insert_error(e, vote.poll_id))?;

    Ok(())
}

/// Both counters move in place.
async fn bump_counters(
    conn: &mut PgConnection,
    poll_id: Uuid,
    option: &str,
) -> Result<(), StoreError> {
    let bumped = sqlx::query(
        "UPDATE poll_options SET votes = votes + 1 WHERE poll_id = $1 AND label = $2",
    )
    .bind(poll_id)
    .bind(option)
    .execute(&mut *conn)
    .await?;

    if bumped.rows_affected() == 0 {
        return Err(StoreError::UnknownOption {
            poll_id,
            option: option.to_string(),
        });
    }

    let bumped = sqlx::query("UPDATE polls SET total_votes = total_votes + 1 WHERE id = $1")
        .bind(poll_id)
        .execute(&mut *conn)
        .await?;

    if bumped.rows_affected() == 0 {
        return Err(StoreError::PollNotFound(poll_id));
    }
    Ok(())
}

impl PollStore for PgStore {
    async fn create(&self, poll: NewPoll) -> Result<Poll, StoreError> {
        for attempt in 1..=TOKEN_ATTEMPTS {
            let mut tx = self.pool.begin().await?;
            let id = Uuid::new_v4();

            let inserted = sqlx::query(
                "INSERT INTO polls (id, shareable_token, question, options, expires_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(id)
            .bind(new_shareable_token())
            .bind(&poll.question)
            .bind(&poll.options)
            .bind(poll.expires_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(e) if is_token_conflict(&e) => {
                    warn!(attempt, "Shareable token collision, retrying");
                    tx.rollback().await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            sqlx::query(
                "INSERT INTO poll_options (poll_id, position, label)
                 SELECT $1, ord::INTEGER, label
                 FROM UNNEST($2::TEXT[]) WITH ORDINALITY AS t(label, ord)",
            )
            .bind(id)
            .bind(&poll.options)
            .execute(&mut *tx)
            .await?;

            let created = load_poll(&mut tx, id).await?;
            tx.commit().await?;

            debug!(poll_id = %created.id, token = %created.shareable_token, "Poll created");
            return Ok(created);
        }

        Err(StoreError::TokenExhausted)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Poll>, StoreError> {
        let row = sqlx::query_as::<_, PollRow>(POLL_BY_TOKEN)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Poll::from))
    }

    async fn increment_count(&self, poll_id: Uuid, option: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        bump_counters(&mut tx, poll_id, option).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn deactivate(&self, poll_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE polls SET is_active = FALSE WHERE id = $1")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl VoteLedger for PgStore {
    async fn has_voted(
        &self,
        poll_id: Uuid,
        voter_ip: &str,
        voter_fingerprint: &str,
    ) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM votes
                 WHERE poll_id = $1 AND voter_ip = $2 AND voter_fingerprint = $3
             )",
        )
        .bind(poll_id)
        .bind(voter_ip)
        .bind(voter_fingerprint)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn recent_vote_count(
        &self,
        voter_ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM votes WHERE voter_ip = $1 AND created_at >= $2",
        )
        .bind(voter_ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn record(&self, vote: &VoteRecord) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_vote(&mut conn, vote).await
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM votes WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl VoteStore for PgStore {
    async fn commit_vote(&self, vote: &VoteRecord) -> Result<Poll, StoreError> {
        let mut tx = self.pool.begin().await?;

        insert_vote(&mut tx, vote).await?;
        bump_counters(&mut tx, vote.poll_id, &vote.option).await?;
        let poll = load_poll(&mut tx, vote.poll_id).await?;

        tx.commit().await?;
        Ok(poll)
    }
}
