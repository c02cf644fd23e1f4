//! Single-pass candidate allocator
//!
//! The generator asks the completion API for one shared candidate list per
//! batch and walks it with a single cursor: each user in the batch consumes
//! candidates from where the previous user stopped. A consumed candidate is
//! never reconsidered - neither for the same user (assigned or skipped as a
//! duplicate) nor for any later user in the batch - and the cursor never
//! rewinds. Running out of candidates leaves trailing users with a partial
//! (possibly empty) assignment, which is acceptable.
//!
//! This is deliberately serial: volumes are small and the ordering makes
//! the behavior trivial to reason about and test without any store or
//! network dependency.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Length of the dedup fingerprint in hex characters
const FINGERPRINT_HEX_LEN: usize = 16;

/// One candidate returned by the text generator
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CandidateChallenge {
    /// Display text
    pub text: String,
    /// Free-text description (hints may be embedded later)
    #[serde(default)]
    pub description: String,
    /// Category tag or action key
    #[serde(default, rename = "type")]
    pub kind_tag: String,
}

/// Per-user allocation input: how many challenges the user still needs and
/// which text fingerprints they have ever been assigned
#[derive(Debug)]
pub struct UserNeed {
    /// User identifier
    pub user_id: String,
    /// How many new challenges to assign (0..=3)
    pub need: usize,
    /// Historical dedup set for this user
    pub seen_hashes: HashSet<String>,
}

/// One assigned candidate with its computed fingerprint
#[derive(Debug)]
pub struct AssignedCandidate<'a> {
    /// The candidate taken from the shared list
    pub candidate: &'a CandidateChallenge,
    /// Fingerprint of the candidate text
    pub hash: String,
}

/// Per-user allocation result
#[derive(Debug)]
pub struct UserAllocation<'a> {
    /// User identifier
    pub user_id: String,
    /// Assigned candidates, at most `need`
    pub assigned: Vec<AssignedCandidate<'a>>,
}

/// Dedup fingerprint of challenge text
///
/// Deterministic function of the trimmed text only; 16 hex characters of
/// SHA-256. Collisions across different text are treated as duplicates,
/// which is acceptable for dedup purposes.
pub fn challenge_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_HEX_LEN].to_string()
}

/// Allocate candidates to users with a single shared cursor
///
/// Users are processed in order. For each user the cursor advances until
/// the user's need is met or the candidate list is exhausted; candidates
/// whose fingerprint is already in the user's dedup set (or was assigned
/// to them earlier in this same run) are consumed and skipped.
pub fn allocate<'a>(
    candidates: &'a [CandidateChallenge],
    users: &[UserNeed],
) -> Vec<UserAllocation<'a>> {
    let mut cursor = 0;
    let mut allocations = Vec::with_capacity(users.len());

    for user in users {
        let mut taken: HashSet<String> = HashSet::new();
        let mut assigned = Vec::with_capacity(user.need);

        while assigned.len() < user.need && cursor < candidates.len() {
            let candidate = &candidates[cursor];
            cursor += 1;

            let hash = challenge_fingerprint(&candidate.text);
            if user.seen_hashes.contains(&hash) || taken.contains(&hash) {
                continue;
            }

            // Track within-run assignments so duplicated candidate text is
            // rejected for the same user too
            taken.insert(hash.clone());
            assigned.push(AssignedCandidate { candidate, hash });
        }

        allocations.push(UserAllocation {
            user_id: user.user_id.clone(),
            assigned,
        });
    }

    allocations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(texts: &[&str]) -> Vec<CandidateChallenge> {
        texts
            .iter()
            .map(|t| CandidateChallenge {
                text: t.to_string(),
                description: format!("do: {}", t),
                kind_tag: "gaming".to_string(),
            })
            .collect()
    }

    fn user(id: &str, need: usize, seen: &[&str]) -> UserNeed {
        UserNeed {
            user_id: id.to_string(),
            need,
            seen_hashes: seen.iter().map(|t| challenge_fingerprint(t)).collect(),
        }
    }

    #[test]
    fn test_fingerprint_deterministic_and_text_only() {
        assert_eq!(challenge_fingerprint("abc"), challenge_fingerprint("abc"));
        assert_eq!(challenge_fingerprint(" abc "), challenge_fingerprint("abc"));
        assert_ne!(challenge_fingerprint("abc"), challenge_fingerprint("abd"));
        assert_eq!(challenge_fingerprint("abc").len(), 16);
    }

    #[test]
    fn test_two_users_six_candidates_no_reuse() {
        let cands = candidates(&["c1", "c2", "c3", "c4", "c5", "c6"]);
        let users = vec![user("u1", 3, &[]), user("u2", 3, &[])];

        let allocs = allocate(&cands, &users);
        assert_eq!(allocs[0].assigned.len(), 3);
        assert_eq!(allocs[1].assigned.len(), 3);

        let u1: Vec<&str> = allocs[0].assigned.iter().map(|a| a.candidate.text.as_str()).collect();
        let u2: Vec<&str> = allocs[1].assigned.iter().map(|a| a.candidate.text.as_str()).collect();
        assert_eq!(u1, vec!["c1", "c2", "c3"]);
        assert_eq!(u2, vec!["c4", "c5", "c6"]);
    }

    #[test]
    fn test_seen_candidates_are_consumed_not_reused() {
        // u1 has already seen c1 and c2; they are consumed while skipping,
        // so u2 starts at c4 even though c1/c2 were never assigned
        let cands = candidates(&["c1", "c2", "c3", "c4", "c5"]);
        let users = vec![user("u1", 1, &["c1", "c2"]), user("u2", 2, &[])];

        let allocs = allocate(&cands, &users);
        let u1: Vec<&str> = allocs[0].assigned.iter().map(|a| a.candidate.text.as_str()).collect();
        let u2: Vec<&str> = allocs[1].assigned.iter().map(|a| a.candidate.text.as_str()).collect();
        assert_eq!(u1, vec!["c3"]);
        assert_eq!(u2, vec!["c4", "c5"]);
    }

    #[test]
    fn test_exhaustion_yields_partial_assignment() {
        let cands = candidates(&["c1", "c2"]);
        let users = vec![user("u1", 3, &[]), user("u2", 3, &[])];

        let allocs = allocate(&cands, &users);
        assert_eq!(allocs[0].assigned.len(), 2);
        assert_eq!(allocs[1].assigned.len(), 0);
    }

    #[test]
    fn test_duplicate_candidate_text_not_assigned_twice() {
        // Same text twice in one batch: second occurrence is skipped for
        // the same user
        let cands = candidates(&["c1", "c1", "c2"]);
        let users = vec![user("u1", 3, &[])];

        let allocs = allocate(&cands, &users);
        let texts: Vec<&str> = allocs[0].assigned.iter().map(|a| a.candidate.text.as_str()).collect();
        assert_eq!(texts, vec!["c1", "c2"]);
    }

    #[test]
    fn test_zero_need_consumes_nothing() {
        let cands = candidates(&["c1", "c2", "c3"]);
        let users = vec![user("u1", 0, &[]), user("u2", 3, &[])];

        let allocs = allocate(&cands, &users);
        assert!(allocs[0].assigned.is_empty());
        assert_eq!(allocs[1].assigned.len(), 3);
    }
}
