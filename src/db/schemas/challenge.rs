//! Challenge document schema
//!
//! One document per assigned challenge. Challenges are created in batches
//! by the generator, completed at most once by the verifier, and never
//! deleted - expiry is logical (`expires_at` passed), not physical.
//!
//! The stored fields are loose booleans and timestamps; the lifecycle is
//! exposed as a tagged [`ChallengeState`] computed at read time so that a
//! stale `is_completed = false` can never masquerade as pending after the
//! expiry has passed.

use bson::{doc, oid::ObjectId, DateTime, Document};
use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for user challenges
pub const USER_CHALLENGE_COLLECTION: &str = "user_challenges";

/// Maximum active (non-expired) challenges per user at any time
pub const CHALLENGES_PER_USER: usize = 3;

/// Challenge document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChallengeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Owning user identifier
    pub user_id: String,

    /// Display text of the challenge
    pub challenge_text: String,

    /// Free-text description; may embed a JSON hints object
    pub challenge_description: String,

    /// Category tag (gaming/social/exploration/creative) or an action key
    /// (comment, rate_games, add_favorites, avatar_change, change_name)
    pub challenge_type: String,

    /// Dedup fingerprint of the challenge text
    ///
    /// Unique per user across all historical challenges - identical text
    /// is never reissued to the same user.
    pub challenge_hash: String,

    /// Whether the verifier has marked this challenge completed
    #[serde(default)]
    pub is_completed: bool,

    /// When the challenge was completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,

    /// Shared expiry for the generation run that produced this challenge
    pub expires_at: DateTime,
}

/// Challenge lifecycle, derived from stored fields at read time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeState {
    /// Not completed and expiry still in the future
    Pending {
        /// When this challenge stops being verifiable
        expires_at: ChronoDateTime<Utc>,
    },
    /// Completed exactly once by the verifier
    Completed {
        /// Completion timestamp (falls back to the expiry when the stored
        /// timestamp is absent, which only happens on hand-edited rows)
        at: ChronoDateTime<Utc>,
    },
    /// Never completed and the expiry has passed
    Expired,
}

impl ChallengeDoc {
    /// Create a new pending challenge
    pub fn new(
        user_id: String,
        challenge_text: String,
        challenge_description: String,
        challenge_type: String,
        challenge_hash: String,
        expires_at: ChronoDateTime<Utc>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id,
            challenge_text,
            challenge_description,
            challenge_type,
            challenge_hash,
            is_completed: false,
            completed_at: None,
            expires_at: DateTime::from_chrono(expires_at),
        }
    }

    /// Lifecycle state as of `now`
    ///
    /// Completion wins over expiry: a challenge completed before its expiry
    /// stays `Completed` forever.
    pub fn state(&self, now: ChronoDateTime<Utc>) -> ChallengeState {
        let expires_at = self.expires_at.to_chrono();

        if self.is_completed {
            let at = self
                .completed_at
                .map(|d| d.to_chrono())
                .unwrap_or(expires_at);
            return ChallengeState::Completed { at };
        }

        if expires_at <= now {
            return ChallengeState::Expired;
        }

        ChallengeState::Pending { expires_at }
    }

    /// Structured verification hints embedded in the description, if any
    pub fn hints(&self) -> Option<VerificationHints> {
        VerificationHints::extract(&self.challenge_description)
    }
}

/// Structured verification hints
///
/// The generator may embed these as a JSON object inside the challenge
/// description so the verifier does not have to re-derive targets from
/// free text.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct VerificationHints {
    /// Phrase the submitted comment must contain (comment challenges)
    #[serde(default)]
    pub required_phrase: Option<String>,

    /// Count threshold override (rate_games / add_favorites challenges)
    #[serde(default)]
    pub required_count: Option<u64>,

    /// Target visual description (avatar_change challenges)
    #[serde(default)]
    pub target_description: Option<String>,

    /// Target first name (change_name challenges)
    #[serde(default)]
    pub first_name: Option<String>,

    /// Target last name (change_name challenges)
    #[serde(default)]
    pub last_name: Option<String>,
}

impl VerificationHints {
    /// Extract hints from a description that may embed a JSON object
    ///
    /// Takes the span from the first `{` to the last `}` and tries to parse
    /// it; anything else in the description is ignored. Returns None when
    /// no parseable object is present.
    pub fn extract(description: &str) -> Option<Self> {
        let start = description.find('{')?;
        let end = description.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&description[start..=end]).ok()
    }
}

impl IntoIndexes for ChallengeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Never reissue identical text to the same user
            (
                doc! { "user_id": 1, "challenge_hash": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_hash_unique".to_string())
                        .build(),
                ),
            ),
            // Pending-challenge lookups by the verifier and generator
            (
                doc! { "user_id": 1, "is_completed": 1, "expires_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_active_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ChallengeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn challenge(expires_in: Duration) -> ChallengeDoc {
        ChallengeDoc::new(
            "user-1".into(),
            "Rate three games".into(),
            "desc".into(),
            "rate_games".into(),
            "abcd1234abcd1234".into(),
            Utc::now() + expires_in,
        )
    }

    #[test]
    fn test_state_pending() {
        let doc = challenge(Duration::hours(5));
        assert!(matches!(doc.state(Utc::now()), ChallengeState::Pending { .. }));
    }

    #[test]
    fn test_state_expired() {
        let doc = challenge(Duration::hours(-1));
        assert_eq!(doc.state(Utc::now()), ChallengeState::Expired);
    }

    #[test]
    fn test_state_completed_wins_over_expiry() {
        let mut doc = challenge(Duration::hours(-1));
        doc.is_completed = true;
        doc.completed_at = Some(DateTime::now());
        assert!(matches!(doc.state(Utc::now()), ChallengeState::Completed { .. }));
    }

    #[test]
    fn test_hints_extraction() {
        let desc = r#"Write a comment. {"required_phrase": "hello", "required_count": 3}"#;
        let hints = VerificationHints::extract(desc).unwrap();
        assert_eq!(hints.required_phrase.as_deref(), Some("hello"));
        assert_eq!(hints.required_count, Some(3));
        assert!(hints.target_description.is_none());
    }

    #[test]
    fn test_hints_absent() {
        assert!(VerificationHints::extract("plain description").is_none());
        assert!(VerificationHints::extract("broken { not json").is_none());
    }
}
