//! Daily challenge generator
//!
//! Produces candidate challenge texts via the external completion API and
//! assigns up to three unseen challenges per user, all sharing one expiry
//! (the next 03:00 local). Users are processed in fixed-size batches with
//! one completion call per batch; a failed or malformed batch is logged
//! and skipped so the remaining batches still run.

use std::collections::HashSet;
use std::sync::Arc;

use bson::doc;
use chrono::{DateTime, Duration, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::CompletionClient;
use crate::db::schemas::{
    ChallengeDoc, ProfileDoc, CHALLENGES_PER_USER, PROFILE_COLLECTION, USER_CHALLENGE_COLLECTION,
};
use crate::db::MongoClient;
use crate::services::allocator::{allocate, CandidateChallenge, UserNeed};
use crate::types::{QuestlineError, Result};

/// Users per generation batch; bounds the size of one completion request
pub const GENERATION_BATCH_SIZE: usize = 50;

/// Local hour at which all challenges from a run expire
pub const REFRESH_HOUR: u32 = 3;

/// Target of a generation run
#[derive(Debug, Clone)]
pub enum GenerationTarget {
    /// One specific user
    Single(String),
    /// Every user with a profile
    Batch,
}

/// Per-user outcome of a generation run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGenerationResult {
    /// User identifier
    pub user_id: String,
    /// How many new challenges were created for this user
    pub challenges_created: usize,
}

/// Outcome of a whole generation run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    /// Users that received at least one new challenge
    pub processed: usize,
    /// Per-user breakdown
    pub results: Vec<UserGenerationResult>,
}

/// Next occurrence of the refresh hour strictly after `now`
///
/// If `now` is exactly the refresh hour, the result is the following day:
/// expiry must be strictly in the future.
pub fn next_refresh_after(now: NaiveDateTime) -> NaiveDateTime {
    let at_refresh = now
        .date()
        .and_hms_opt(REFRESH_HOUR, 0, 0)
        .unwrap_or(now); // REFRESH_HOUR is a valid wall-clock hour

    if now < at_refresh {
        at_refresh
    } else {
        at_refresh + Duration::days(1)
    }
}

/// Shared expiry for one generation run, as a UTC instant
///
/// The wall-clock 03:00 is resolved in local server time. An ambiguous
/// local mapping (DST fold) takes the earliest instant; a gap falls back
/// to one hour later.
pub fn shared_expiry(now_local: DateTime<Local>) -> DateTime<Utc> {
    let naive = next_refresh_after(now_local.naive_local());

    let local = match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            match Local.from_local_datetime(&(naive + Duration::hours(1))) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
                LocalResult::None => now_local + Duration::days(1),
            }
        }
    };

    local.with_timezone(&Utc)
}

/// Parse the completion response into candidate challenges
///
/// The model is asked for a bare JSON array but routinely wraps it in
/// markdown code fences; strip those before parsing.
pub fn parse_candidates(response: &str) -> Result<Vec<CandidateChallenge>> {
    let trimmed = strip_code_fences(response);

    serde_json::from_str(trimmed)
        .map_err(|e| QuestlineError::Parse(format!("Candidate list is not valid JSON: {}", e)))
}

/// Strip a leading/trailing markdown code fence if present
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Build the batch generation prompt
fn candidate_prompt(count: usize) -> String {
    format!(
        "Generate {count} short daily challenges for users of a game catalog app. \
         Each challenge asks the user to do one in-app action: write a comment \
         containing a specific phrase, rate games, add games to favorites, change \
         their avatar to match a description, or change their display name. \
         Respond with ONLY a JSON array, no prose, where each element is \
         {{\"text\": ..., \"description\": ..., \"type\": ...}}. \"type\" is one of \
         comment, rate_games, add_favorites, avatar_change, change_name, or a \
         category tag (gaming, social, exploration, creative). When a challenge \
         has a verifiable target, embed it in the description as a JSON object \
         with keys like required_phrase, required_count, target_description, \
         first_name, last_name."
    )
}

/// Challenge generator service
pub struct GeneratorService {
    mongo: MongoClient,
    ai: Option<Arc<dyn CompletionClient>>,
}

impl GeneratorService {
    /// Create a new generator
    pub fn new(mongo: MongoClient, ai: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { mongo, ai }
    }

    /// Run a generation pass for the given target
    pub async fn generate(&self, target: GenerationTarget) -> Result<GenerationReport> {
        let ai = self.ai.as_ref().ok_or_else(|| {
            QuestlineError::Config("completion API key is not configured".into())
        })?;

        let user_ids = self.resolve_user_ids(&target).await?;
        if user_ids.is_empty() {
            return Ok(GenerationReport {
                processed: 0,
                results: Vec::new(),
            });
        }

        let expiry = shared_expiry(Local::now());
        info!(
            users = user_ids.len(),
            expiry = %expiry,
            "Starting challenge generation run"
        );

        let mut results = Vec::new();

        // Batches run strictly sequentially: one outstanding completion
        // request at a time
        for batch in user_ids.chunks(GENERATION_BATCH_SIZE) {
            match self.generate_batch(ai.as_ref(), batch, expiry).await {
                Ok(mut batch_results) => results.append(&mut batch_results),
                Err(e) => {
                    warn!(batch_size = batch.len(), error = %e, "Batch skipped, continuing with remaining batches");
                }
            }
        }

        info!(processed = results.len(), "Generation run finished");
        Ok(GenerationReport {
            processed: results.len(),
            results,
        })
    }

    /// Resolve the target into concrete user ids
    async fn resolve_user_ids(&self, target: &GenerationTarget) -> Result<Vec<String>> {
        match target {
            GenerationTarget::Single(user_id) => Ok(vec![user_id.clone()]),
            GenerationTarget::Batch => {
                let profiles = self
                    .mongo
                    .collection::<ProfileDoc>(PROFILE_COLLECTION)
                    .await?;
                let docs = profiles.find_many(doc! {}).await?;
                Ok(docs.into_iter().map(|p| p.user_id).collect())
            }
        }
    }

    /// Generate and assign challenges for one batch of users
    async fn generate_batch(
        &self,
        ai: &dyn CompletionClient,
        batch: &[String],
        expiry: DateTime<Utc>,
    ) -> Result<Vec<UserGenerationResult>> {
        let challenges = self
            .mongo
            .collection::<ChallengeDoc>(USER_CHALLENGE_COLLECTION)
            .await?;
        let now = bson::DateTime::now();

        // Per-user needs and historical dedup sets
        let mut needs = Vec::with_capacity(batch.len());
        for user_id in batch {
            let active = challenges
                .count(doc! { "user_id": user_id, "expires_at": { "$gt": now } })
                .await? as usize;
            let need = CHALLENGES_PER_USER.saturating_sub(active);

            let seen_hashes = self.historical_hashes(&challenges, user_id).await?;
            needs.push(UserNeed {
                user_id: user_id.clone(),
                need,
                seen_hashes,
            });
        }

        let total_need: usize = needs.iter().map(|n| n.need).sum();
        if total_need == 0 {
            debug!(batch_size = batch.len(), "All users in batch already have full challenge sets");
            return Ok(Vec::new());
        }

        // One completion call per batch
        let requested = CHALLENGES_PER_USER * batch.len();
        let response = ai.generate_text(&candidate_prompt(requested)).await?;
        let candidates = parse_candidates(&response)?;

        debug!(
            requested = requested,
            received = candidates.len(),
            "Parsed candidate challenges"
        );

        let allocations = allocate(&candidates, &needs);

        let mut results = Vec::new();
        for allocation in allocations {
            let mut created = 0;
            for assigned in &allocation.assigned {
                let challenge = ChallengeDoc::new(
                    allocation.user_id.clone(),
                    assigned.candidate.text.clone(),
                    assigned.candidate.description.clone(),
                    assigned.candidate.kind_tag.clone(),
                    assigned.hash.clone(),
                    expiry,
                );

                // Unique (user_id, challenge_hash) index backstops the
                // in-memory dedup set; a duplicate is skipped quietly
                match challenges.insert_one_idempotent(challenge).await {
                    Ok(true) => created += 1,
                    Ok(false) => {
                        debug!(user_id = %allocation.user_id, hash = %assigned.hash, "Duplicate challenge hash, skipped");
                    }
                    Err(e) => {
                        warn!(user_id = %allocation.user_id, error = %e, "Challenge insert failed, user skipped");
                        break;
                    }
                }
            }

            if created > 0 {
                results.push(UserGenerationResult {
                    user_id: allocation.user_id,
                    challenges_created: created,
                });
            }
        }

        Ok(results)
    }

    /// All challenge hashes ever assigned to a user
    async fn historical_hashes(
        &self,
        challenges: &crate::db::MongoCollection<ChallengeDoc>,
        user_id: &str,
    ) -> Result<HashSet<String>> {
        let values = challenges
            .inner()
            .distinct("challenge_hash", doc! { "user_id": user_id })
            .await
            .map_err(|e| QuestlineError::Database(format!("Distinct failed: {}", e)))?;

        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_refresh_before_three_is_same_day() {
        let next = next_refresh_after(at(1, 30));
        assert_eq!(next, at(3, 0));
    }

    #[test]
    fn test_refresh_at_three_is_next_day() {
        // Expiry is strictly after now
        let next = next_refresh_after(at(3, 0));
        assert_eq!(next, at(3, 0) + Duration::days(1));
    }

    #[test]
    fn test_refresh_after_three_is_next_day() {
        let next = next_refresh_after(at(15, 45));
        assert_eq!(next, at(3, 0) + Duration::days(1));
    }

    #[test]
    fn test_shared_expiry_is_in_the_future() {
        let now = Local::now();
        let expiry = shared_expiry(now);
        assert!(expiry > now.with_timezone(&Utc));
        // Never more than a day and change away
        assert!(expiry <= now.with_timezone(&Utc) + Duration::days(1) + Duration::hours(1));
    }

    #[test]
    fn test_parse_candidates_plain_array() {
        let response = r#"[{"text": "Rate a game", "description": "d", "type": "rate_games"}]"#;
        let candidates = parse_candidates(response).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "Rate a game");
        assert_eq!(candidates[0].kind_tag, "rate_games");
    }

    #[test]
    fn test_parse_candidates_fenced() {
        let response = "```json\n[{\"text\": \"t\", \"description\": \"\", \"type\": \"gaming\"}]\n```";
        let candidates = parse_candidates(response).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind_tag, "gaming");
    }

    #[test]
    fn test_parse_candidates_missing_optional_fields() {
        let response = r#"[{"text": "only text"}]"#;
        let candidates = parse_candidates(response).unwrap();
        assert_eq!(candidates[0].description, "");
        assert_eq!(candidates[0].kind_tag, "");
    }

    #[test]
    fn test_parse_candidates_rejects_prose() {
        let response = "Sure! Here are your challenges: ...";
        assert!(matches!(
            parse_candidates(response),
            Err(QuestlineError::Parse(_))
        ));
    }
}
