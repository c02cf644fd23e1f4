//! Challenge verifier
//!
//! Loads the targeted challenge(s), applies the per-type policy, and on
//! success commits the fixed write sequence: conditional completion
//! update, idempotent completion-record insert, then a synchronous status
//! recompute - in that order, so the recompute always observes its own
//! triggering completion.

use std::sync::Arc;

use bson::{doc, oid::ObjectId};
use chrono::Utc;
use tracing::{debug, info};

use crate::ai::CompletionClient;
use crate::db::schemas::{
    ChallengeDoc, ChallengeState, CompletionDoc, CHALLENGE_COMPLETION_COLLECTION,
    GAME_RATING_COLLECTION, USER_CHALLENGE_COLLECTION, USER_FAVORITE_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::services::policy::{evaluate, ActionData, ActivityCounts, Evaluation};
use crate::services::status::StatusService;
use crate::types::{QuestlineError, Result};

/// Which challenge(s) a verification call targets
#[derive(Debug, Clone)]
pub enum VerifyTarget {
    /// Try every pending challenge of the user
    Auto,
    /// One specific challenge by id
    Challenge(String),
}

impl VerifyTarget {
    /// Parse the wire value: the literal "auto" or a challenge id
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("auto") {
            VerifyTarget::Auto
        } else {
            VerifyTarget::Challenge(raw.to_string())
        }
    }
}

/// Challenge verifier service
pub struct VerifierService {
    mongo: MongoClient,
    ai: Option<Arc<dyn CompletionClient>>,
    status: Arc<StatusService>,
}

impl VerifierService {
    /// Create a new verifier
    pub fn new(
        mongo: MongoClient,
        ai: Option<Arc<dyn CompletionClient>>,
        status: Arc<StatusService>,
    ) -> Self {
        Self { mongo, ai, status }
    }

    /// Verify a user action against one or all pending challenges
    pub async fn verify(
        &self,
        user_id: &str,
        target: VerifyTarget,
        action: &str,
        data: &ActionData,
    ) -> Result<Evaluation> {
        if user_id.trim().is_empty() {
            return Err(QuestlineError::InvalidInput("userId is required".into()));
        }
        if action.trim().is_empty() {
            return Err(QuestlineError::InvalidInput("action is required".into()));
        }

        let counts = self.activity_counts(user_id, action).await?;
        let challenges = self
            .mongo
            .collection::<ChallengeDoc>(USER_CHALLENGE_COLLECTION)
            .await?;

        match target {
            VerifyTarget::Challenge(id) => {
                self.verify_specific(&challenges, user_id, &id, action, data, counts)
                    .await
            }
            VerifyTarget::Auto => {
                self.verify_auto(&challenges, user_id, action, data, counts)
                    .await
            }
        }
    }

    /// Specific-id mode: the challenge must exist and belong to the caller
    async fn verify_specific(
        &self,
        challenges: &MongoCollection<ChallengeDoc>,
        user_id: &str,
        id: &str,
        action: &str,
        data: &ActionData,
        counts: ActivityCounts,
    ) -> Result<Evaluation> {
        let oid = ObjectId::parse_str(id)
            .map_err(|_| QuestlineError::NotFound(format!("Challenge {} not found", id)))?;

        let challenge = challenges
            .find_one(doc! { "_id": oid, "user_id": user_id })
            .await?
            .ok_or_else(|| QuestlineError::NotFound(format!("Challenge {} not found", id)))?;

        if let Some(outcome) = settled_outcome(&challenge.state(Utc::now())) {
            debug!(user_id = %user_id, challenge_id = %id, verified = outcome.verified, "Challenge already settled, no writes");
            return Ok(outcome);
        }

        let evaluation = evaluate(&challenge, action, data, counts, self.vision()).await?;

        if evaluation.verified {
            self.commit_completion(challenges, &challenge, user_id).await?;
            self.status.recompute(user_id).await?;
        }

        Ok(evaluation)
    }

    /// Auto mode: try every pending challenge, commit each success
    async fn verify_auto(
        &self,
        challenges: &MongoCollection<ChallengeDoc>,
        user_id: &str,
        action: &str,
        data: &ActionData,
        counts: ActivityCounts,
    ) -> Result<Evaluation> {
        let pending = challenges
            .find_many(doc! {
                "user_id": user_id,
                "is_completed": false,
                "expires_at": { "$gt": bson::DateTime::now() },
            })
            .await?;

        if pending.is_empty() {
            return Ok(Evaluation {
                verified: false,
                message: "No pending challenges to verify".into(),
            });
        }

        let mut last_success: Option<Evaluation> = None;
        for challenge in &pending {
            let evaluation = evaluate(challenge, action, data, counts, self.vision()).await?;
            if evaluation.verified {
                self.commit_completion(challenges, challenge, user_id).await?;
                last_success = Some(evaluation);
            }
        }

        match last_success {
            Some(evaluation) => {
                // One recompute after all commits; it observes every
                // completion written above
                self.status.recompute(user_id).await?;
                info!(user_id = %user_id, action = %action, "Auto verification succeeded");
                Ok(evaluation)
            }
            None => Ok(Evaluation {
                verified: false,
                message: "No pending challenge was satisfied by this action".into(),
            }),
        }
    }

    /// Fixed-order success side effects
    ///
    /// The completion update is conditional on `is_completed: false` and
    /// the record insert is backed by a unique (user_id, challenge_id)
    /// index, so racing verification calls cannot double-complete.
    async fn commit_completion(
        &self,
        challenges: &MongoCollection<ChallengeDoc>,
        challenge: &ChallengeDoc,
        user_id: &str,
    ) -> Result<()> {
        let id = challenge._id.ok_or_else(|| {
            QuestlineError::Database("Challenge document has no id".into())
        })?;
        let now = Utc::now();

        let swapped = challenges
            .update_if(
                doc! { "_id": id, "user_id": user_id, "is_completed": false },
                doc! { "$set": {
                    "is_completed": true,
                    "completed_at": bson::DateTime::from_chrono(now),
                    "metadata.updated_at": bson::DateTime::now(),
                }},
            )
            .await?;

        if !swapped {
            debug!(user_id = %user_id, challenge_id = %id, "Concurrent call completed this challenge first");
        }

        let completions = self
            .mongo
            .collection::<CompletionDoc>(CHALLENGE_COMPLETION_COLLECTION)
            .await?;
        let inserted = completions
            .insert_one_idempotent(CompletionDoc::new(
                user_id.to_string(),
                id.to_hex(),
                now,
            ))
            .await?;

        if inserted {
            info!(user_id = %user_id, challenge_id = %id, "Challenge completed");
        } else {
            debug!(user_id = %user_id, challenge_id = %id, "Completion record already exists");
        }

        Ok(())
    }

    /// Activity totals for the count-threshold policies
    ///
    /// Only fetched for the actions that use them; other actions carry
    /// zeroed counts that no policy reads.
    async fn activity_counts(&self, user_id: &str, action: &str) -> Result<ActivityCounts> {
        let mut counts = ActivityCounts::default();

        match action {
            "rate_games" => {
                counts.ratings = self
                    .mongo
                    .raw_count(GAME_RATING_COLLECTION, doc! { "user_id": user_id })
                    .await?;
            }
            "add_favorites" => {
                counts.favorites = self
                    .mongo
                    .raw_count(USER_FAVORITE_COLLECTION, doc! { "user_id": user_id })
                    .await?;
            }
            _ => {}
        }

        Ok(counts)
    }

    /// Vision client for avatar checks, if configured
    fn vision(&self) -> Option<&dyn CompletionClient> {
        self.ai.as_deref()
    }
}

/// Outcome for a challenge that is no longer pending, if any
///
/// A completed challenge verifies again immediately without re-running
/// heuristics or writing anything; an expired one fails. Pending returns
/// None and the caller evaluates normally.
fn settled_outcome(state: &ChallengeState) -> Option<Evaluation> {
    match state {
        ChallengeState::Completed { .. } => Some(Evaluation {
            verified: true,
            message: "Challenge already completed".into(),
        }),
        ChallengeState::Expired => Some(Evaluation {
            verified: false,
            message: "Challenge has expired".into(),
        }),
        ChallengeState::Pending { .. } => None,
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
    fn test_target_parse() {
        assert!(matches!(VerifyTarget::parse("auto"), VerifyTarget::Auto));
        assert!(matches!(VerifyTarget::parse("AUTO"), VerifyTarget::Auto));
        assert!(matches!(
            VerifyTarget::parse("65f000000000000000000001"),
            VerifyTarget::Challenge(_)
        ));
    }

    #[test]
    fn test_target_parse_preserves_id() {
        match VerifyTarget::parse("65f000000000000000000001") {
            VerifyTarget::Challenge(id) => assert_eq!(id, "65f000000000000000000001"),
            VerifyTarget::Auto => panic!("id parsed as auto"),
        }
    }

    #[test]
    fn test_completed_challenge_verifies_again_without_rerun() {
        // Verifying an already-completed challenge short-circuits to
        // verified=true; the caller never reaches the evaluate/commit path,
        // so no second completion record can be created
        let mut doc = challenge(Duration::hours(6));
        doc.is_completed = true;
        doc.completed_at = Some(bson::DateTime::now());

        let outcome = settled_outcome(&doc.state(Utc::now())).expect("completed is settled");
        assert!(outcome.verified);
        assert_eq!(outcome.message, "Challenge already completed");
    }

    #[test]
    fn test_expired_challenge_fails() {
        let doc = challenge(Duration::hours(-1));

        let outcome = settled_outcome(&doc.state(Utc::now())).expect("expired is settled");
        assert!(!outcome.verified);
        assert_eq!(outcome.message, "Challenge has expired");
    }

    #[test]
    fn test_pending_challenge_goes_to_evaluation() {
        let doc = challenge(Duration::hours(6));
        assert!(settled_outcome(&doc.state(Utc::now())).is_none());
    }
}
