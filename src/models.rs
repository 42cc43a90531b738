// models.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A poll together with its running per-option tallies.
///
/// `counts` always has exactly one entry per element of `options`, and
/// `total_votes` is the sum of its values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    #[serde(rename = "votes")]
    pub counts: HashMap<String, i64>,
    pub total_votes: i64,
    #[serde(rename = "shareableId")]
    pub shareable_token: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Poll {
    /// True when `expires_at` is set and lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    pub fn count_for(&self, option: &str) -> i64 {
        self.counts.get(option).copied().unwrap_or(0)
    }
}

/// One accepted vote, kept in the ledger for duplicate and rate checks.
#[derive(Debug, Clone)]
pub struct VoteRecord {
    pub poll_id: Uuid,
    pub option: String,
    pub voter_ip: String,
    pub voter_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub shareable_id: String,
    pub option: String,
    #[serde(default)]
    pub voter_fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuery {
    pub shareable_id: Option<String>,
}

/// What the creator gets back: everything but the tallies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPoll {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub shareable_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Poll> for CreatedPoll {
    fn from(poll: Poll) -> Self {
        CreatedPoll {
            id: poll.id,
            question: poll.question,
            options: poll.options,
            shareable_id: poll.shareable_token,
            created_at: poll.created_at,
            expires_at: poll.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub poll: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(poll: T) -> Self {
        ApiResponse { success: true, poll }
    }
}
