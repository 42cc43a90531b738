// poll.rs
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;
pub const MAX_QUESTION_CHARS: usize = 500;
pub const MAX_OPTION_CHARS: usize = 200;
pub const SHAREABLE_TOKEN_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("question must be at most {MAX_QUESTION_CHARS} characters")]
    QuestionTooLong,

    #[error("poll must have between {MIN_OPTIONS} and {MAX_OPTIONS} options, got {0}")]
    OptionCount(usize),

    #[error("option {0} must not be empty")]
    EmptyOption(usize),

    #[error("option {0} must be at most {MAX_OPTION_CHARS} characters")]
    OptionTooLong(usize),

    #[error("option \"{0}\" appears more than once")]
    DuplicateOption(String),
}

/// A validated poll definition, ready to be handed to a `PollStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewPoll {
    /// Trims the question and every option, then checks sizes, option count
    /// and option uniqueness. Option order is preserved.
    pub fn parse(
        question: &str,
        options: &[String],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(ValidationError::QuestionTooLong);
        }

        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
            return Err(ValidationError::OptionCount(options.len()));
        }

        let mut seen = HashSet::with_capacity(options.len());
        let mut cleaned = Vec::with_capacity(options.len());
        for (index, option) in options.iter().enumerate() {
            let option = option.trim();
            if option.is_empty() {
                return Err(ValidationError::EmptyOption(index));
            }
            if option.chars().count() > MAX_OPTION_CHARS {
                return Err(ValidationError::OptionTooLong(index));
            }
            if !seen.insert(option) {
                return Err(ValidationError::DuplicateOption(option.to_string()));
            }
            cleaned.push(option.to_string());
        }

        Ok(NewPoll {
            question: question.to_string(),
            options: cleaned,
            expires_at,
        })
    }
}

/// Short opaque public key for a poll: the first 12 hex digits of a v4 UUID.
pub fn new_shareable_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(SHAREABLE_TOKEN_LEN);
    token
}

/// Fingerprint used when the client sends none, so that every
/// fingerprint-less client behind one address shares a single vote.
pub fn fallback_fingerprint(voter_ip: &str) -> String {
    format!("ip-{voter_ip}")
}

/// Caller-supplied fingerprint if it has any content, else the IP fallback.
pub fn resolve_fingerprint(supplied: Option<&str>, voter_ip: &str) -> String {
    match supplied.map(str::trim) {
        Some(fingerprint) if !fingerprint.is_empty() => fingerprint.to_string(),
        _ => fallback_fingerprint(voter_ip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn opts(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parse_trims_and_keeps_order() {
        let poll = NewPoll::parse("  Lunch? ", &opts(&[" pizza", "tacos ", "soup"]), None).unwrap();
        assert_eq!(poll.question, "Lunch?");
        assert_eq!(poll.options, opts(&["pizza", "tacos", "soup"]));
    }

    #[rstest]
    #[case::one_option("Q", &["a"], ValidationError::OptionCount(1))]
    #[case::eleven_options(
        "Q",
        &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11"],
        ValidationError::OptionCount(11)
    )]
    #[case::empty_question("", &["a", "b"], ValidationError::EmptyQuestion)]
    #[case::blank_question("   ", &["a", "b"], ValidationError::EmptyQuestion)]
    #[case::blank_option("Q", &["a", " "], ValidationError::EmptyOption(1))]
    #[case::duplicate_option("Q", &["a", "b", " a"], ValidationError::DuplicateOption("a".into()))]
    fn parse_rejects(#[case] question: &str, #[case] options: &[&str], #[case] expected: ValidationError) {
        assert_eq!(NewPoll::parse(question, &opts(options), None), Err(expected));
    }

    #[test]
    fn parse_enforces_length_limits() {
        let long_question = "q".repeat(MAX_QUESTION_CHARS + 1);
        assert_eq!(
            NewPoll::parse(&long_question, &opts(&["a", "b"]), None),
            Err(ValidationError::QuestionTooLong)
        );

        let exact = "q".repeat(MAX_QUESTION_CHARS);
        assert!(NewPoll::parse(&exact, &opts(&["a", "b"]), None).is_ok());

        let long_option = "o".repeat(MAX_OPTION_CHARS + 1);
        assert_eq!(
            NewPoll::parse("Q", &[long_option, "b".into()], None),
            Err(ValidationError::OptionTooLong(0))
        );
    }

    #[test]
    fn tokens_are_short_and_distinct() {
        let a = new_shareable_token();
        let b = new_shareable_token();
        assert_eq!(a.len(), SHAREABLE_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_falls_back_to_ip() {
        assert_eq!(resolve_fingerprint(Some("abc"), "1.2.3.4"), "abc");
        assert_eq!(resolve_fingerprint(None, "1.2.3.4"), "ip-1.2.3.4");
        assert_eq!(resolve_fingerprint(Some("  "), "1.2.3.4"), "ip-1.2.3.4");
    }
}
