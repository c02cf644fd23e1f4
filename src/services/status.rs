//! Verification status tracker
//!
//! Rolling-window aggregate over completion records: a user holding 30
//! completions inside the trailing 30 days is verified for the next 30
//! days. The count is recomputed fresh on every call - nothing is cached
//! or incrementally maintained, so the result always reflects the store.
//!
//! A reserved username (or an already-set permanent flag) short-circuits
//! to permanent verification and backfills the flag onto the profile.

use bson::{doc, Bson};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::schemas::{
    CompletionDoc, ProfileDoc, CHALLENGE_COMPLETION_COLLECTION, PROFILE_COLLECTION,
};
use crate::db::MongoClient;
use crate::types::Result;

/// Completions required inside the window to become verified
pub const REQUIRED_COMPLETIONS: u64 = 30;

/// Width of the trailing completion window in days
pub const WINDOW_DAYS: i64 = 30;

/// Length of the forward-looking verified lease in days
pub const LEASE_DAYS: i64 = 30;

/// Current verification standing of a user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    /// Whether the user currently holds verified status
    pub verified: bool,
    /// Whether the status is permanent (never decays)
    pub permanent: bool,
    /// Completions inside the trailing window (absent for permanent status)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<u64>,
    /// Threshold for verification (absent for permanent status)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_for_verification: Option<u64>,
    /// When non-permanent verified status lapses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_until: Option<DateTime<Utc>>,
}

/// Decide verified standing from a window count
///
/// The lease is a fixed 30-day grant from the moment of qualification,
/// independent of when individual completions age out of the window.
pub fn window_status(completions: u64, now: DateTime<Utc>) -> (bool, Option<DateTime<Utc>>) {
    if completions >= REQUIRED_COMPLETIONS {
        (true, Some(now + Duration::days(LEASE_DAYS)))
    } else {
        (false, None)
    }
}

/// Whether a profile holds permanent verification
///
/// True when the stored flag is already set or the username is the
/// reserved one. Permanence ignores completion history entirely; an
/// absent profile is never permanent.
pub fn is_permanent(profile: Option<&ProfileDoc>, reserved_username: &str) -> bool {
    profile
        .map(|p| p.is_permanently_verified || p.username == reserved_username)
        .unwrap_or(false)
}

/// Verification status tracker
pub struct StatusService {
    mongo: MongoClient,
    reserved_username: String,
}

impl StatusService {
    /// Create a new tracker
    pub fn new(mongo: MongoClient, reserved_username: String) -> Self {
        Self {
            mongo,
            reserved_username,
        }
    }

    /// Recompute and persist a user's verification status
    ///
    /// Idempotent and safe to call repeatedly; every call re-reads the
    /// completion records and rewrites the denormalized profile fields.
    pub async fn recompute(&self, user_id: &str) -> Result<VerificationStatus> {
        let profiles = self
            .mongo
            .collection::<ProfileDoc>(PROFILE_COLLECTION)
            .await?;

        let profile = profiles.find_one(doc! { "user_id": user_id }).await?;

        if is_permanent(profile.as_ref(), &self.reserved_username) {
            // Backfill the permanent flag if the reserved username got here
            // before an operator set it (self-healing, idempotent)
            profiles
                .upsert_one(
                    doc! { "user_id": user_id },
                    doc! { "$set": {
                        "is_verified": true,
                        "is_permanently_verified": true,
                        "metadata.updated_at": bson::DateTime::now(),
                    }},
                )
                .await?;

            debug!(user_id = %user_id, "Permanent verification short-circuit");
            return Ok(VerificationStatus {
                verified: true,
                permanent: true,
                completions: None,
                required_for_verification: None,
                verified_until: None,
            });
        }

        let now = Utc::now();
        let cutoff = now - Duration::days(WINDOW_DAYS);

        let completions = self
            .mongo
            .collection::<CompletionDoc>(CHALLENGE_COMPLETION_COLLECTION)
            .await?;
        let count = completions
            .count(doc! {
                "user_id": user_id,
                "completed_at": { "$gte": bson::DateTime::from_chrono(cutoff) },
            })
            .await?;

        let (verified, verified_until) = window_status(count, now);

        let until_bson = verified_until
            .map(|dt| Bson::DateTime(bson::DateTime::from_chrono(dt)))
            .unwrap_or(Bson::Null);

        profiles
            .upsert_one(
                doc! { "user_id": user_id },
                doc! { "$set": {
                    "is_verified": verified,
                    "verified_until": until_bson,
                    "metadata.updated_at": bson::DateTime::now(),
                }},
            )
            .await?;

        if verified {
            info!(user_id = %user_id, completions = count, "User holds verified status");
        }

        Ok(VerificationStatus {
            verified,
            permanent: false,
            completions: Some(count),
            required_for_verification: Some(REQUIRED_COMPLETIONS),
            verified_until,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twenty_nine_completions_not_verified() {
        let (verified, until) = window_status(29, Utc::now());
        assert!(!verified);
        assert!(until.is_none());
    }

    #[test]
    fn test_thirty_completions_verified_with_lease() {
        let now = Utc::now();
        let (verified, until) = window_status(30, now);
        assert!(verified);
        assert_eq!(until, Some(now + Duration::days(30)));
    }

    #[test]
    fn test_lease_is_fixed_grant_from_now() {
        // The lease depends only on the qualification instant, not on
        // window contents
        let now = Utc::now();
        let (_, until_30) = window_status(30, now);
        let (_, until_90) = window_status(90, now);
        assert_eq!(until_30, until_90);
    }

    fn profile(username: &str, permanently_verified: bool) -> ProfileDoc {
        ProfileDoc {
            user_id: "user-1".into(),
            username: username.into(),
            is_permanently_verified: permanently_verified,
            ..Default::default()
        }
    }

    #[test]
    fn test_reserved_username_is_always_permanent() {
        // Permanence ignores completion history; the reserved username
        // alone is enough even with the stored flag unset
        let p = profile("mkwapp", false);
        assert!(is_permanent(Some(&p), "mkwapp"));
    }

    #[test]
    fn test_stored_flag_is_permanent_for_any_username() {
        let p = profile("someone-else", true);
        assert!(is_permanent(Some(&p), "mkwapp"));
    }

    #[test]
    fn test_ordinary_profile_is_not_permanent() {
        let p = profile("someone-else", false);
        assert!(!is_permanent(Some(&p), "mkwapp"));
    }

    #[test]
    fn test_absent_profile_is_not_permanent() {
        assert!(!is_permanent(None, "mkwapp"));
    }

    #[test]
    fn test_reserved_username_match_is_exact() {
        let p = profile("MKWAPP", false);
        assert!(!is_permanent(Some(&p), "mkwapp"));
    }
}
