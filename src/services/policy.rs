//! Per-type verification policies
//!
//! A challenge is classified into one of five verifiable kinds and then
//! judged against the submitted action. Everything here is pure over the
//! challenge document, the action payload, and pre-fetched activity
//! counts; the only external dependency is the injected vision client for
//! avatar checks, so the whole module is testable with stubs.
//!
//! Classification precedence: an explicit action-key tag always wins.
//! The free-text keyword fallback is checked in a fixed, documented order
//! (comment, rate_games, add_favorites, avatar_change, change_name) and
//! the first match is taken.

use serde::Deserialize;
use tracing::warn;

use crate::ai::CompletionClient;
use crate::db::schemas::ChallengeDoc;
use crate::services::similarity::calculate_similarity;
use crate::types::{QuestlineError, Result};

/// Comment passes when bag-of-words similarity exceeds this
const COMMENT_SIMILARITY_THRESHOLD: f64 = 0.4;

/// Each name part passes when its similarity exceeds this
const NAME_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Tokens counting as an affirmative vision answer
const AFFIRMATIVE_TOKENS: [&str; 2] = ["yes", "نعم"];

/// The five verifiable challenge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// Write a comment containing a required phrase
    Comment,
    /// Reach a total rating-submission count
    RateGames,
    /// Reach a total favorites count
    AddFavorites,
    /// Change the avatar to match a visual description
    AvatarChange,
    /// Change first and last display name
    ChangeName,
}

impl ChallengeKind {
    /// The action key a client submits for this kind
    pub const fn action_key(self) -> &'static str {
        match self {
            ChallengeKind::Comment => "comment",
            ChallengeKind::RateGames => "rate_games",
            ChallengeKind::AddFavorites => "add_favorites",
            ChallengeKind::AvatarChange => "avatar_change",
            ChallengeKind::ChangeName => "change_name",
        }
    }

    /// Classify from an explicit action-key tag
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "comment" => Some(ChallengeKind::Comment),
            "rate_games" => Some(ChallengeKind::RateGames),
            "add_favorites" => Some(ChallengeKind::AddFavorites),
            "avatar_change" => Some(ChallengeKind::AvatarChange),
            "change_name" => Some(ChallengeKind::ChangeName),
            // Category tags (gaming/social/exploration/creative) carry no
            // action key; fall through to the keyword scan
            _ => None,
        }
    }

    /// Keyword fallback over the display text, fixed precedence order
    fn from_text(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();

        const KEYWORD_SETS: [(ChallengeKind, &[&str]); 5] = [
            (ChallengeKind::Comment, &["comment", "تعليق", "علق"]),
            (ChallengeKind::RateGames, &["rate", "rating", "قيم", "تقييم"]),
            (
                ChallengeKind::AddFavorites,
                &["favorite", "favourite", "مفضلة", "المفضلة"],
            ),
            (
                ChallengeKind::AvatarChange,
                &["avatar", "profile picture", "صورة", "الصورة"],
            ),
            (
                ChallengeKind::ChangeName,
                &["display name", "your name", "اسمك", "الاسم"],
            ),
        ];

        for (kind, keywords) in KEYWORD_SETS {
            if keywords.iter().any(|k| lowered.contains(k)) {
                return Some(kind);
            }
        }
        None
    }

    /// Classify a challenge: explicit tag first, keyword fallback second
    pub fn classify(challenge: &ChallengeDoc) -> Option<Self> {
        Self::from_tag(&challenge.challenge_type)
            .or_else(|| Self::from_text(&challenge.challenge_text))
    }
}

/// Supporting data submitted with a verification action
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
    /// Submitted comment text
    #[serde(default)]
    pub text: Option<String>,

    /// Reference to the submitted avatar image
    #[serde(default)]
    pub image_url: Option<String>,

    /// Submitted first name
    #[serde(default)]
    pub first_name: Option<String>,

    /// Submitted last name
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Read-only activity totals used by the count-threshold policies
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityCounts {
    /// Total rating submissions by the user
    pub ratings: u64,
    /// Total favorites held by the user
    pub favorites: u64,
}

/// Outcome of evaluating one challenge against one action
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Whether the challenge is satisfied
    pub verified: bool,
    /// Client-visible explanation
    pub message: String,
}

impl Evaluation {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            verified: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            verified: false,
            message: message.into(),
        }
    }
}

/// Evaluate a pending challenge against a submitted action
///
/// Never writes anything; the caller commits side effects on success.
/// External vision failures come back as a normal "not verified yet"
/// evaluation, not an error - the only `Err` paths are configuration
/// problems (no vision client for an avatar challenge).
pub async fn evaluate(
    challenge: &ChallengeDoc,
    action: &str,
    data: &ActionData,
    counts: ActivityCounts,
    vision: Option<&dyn CompletionClient>,
) -> Result<Evaluation> {
    let Some(kind) = ChallengeKind::classify(challenge) else {
        return Ok(Evaluation::fail(
            "This challenge cannot be verified automatically",
        ));
    };

    if kind.action_key() != action {
        return Ok(Evaluation::fail(format!(
            "This challenge is not satisfied by the '{}' action",
            action
        )));
    }

    match kind {
        ChallengeKind::Comment => Ok(evaluate_comment(challenge, data)),
        ChallengeKind::RateGames => Ok(evaluate_count(
            challenge,
            counts.ratings,
            "rated",
            "games",
        )),
        ChallengeKind::AddFavorites => Ok(evaluate_count(
            challenge,
            counts.favorites,
            "favorited",
            "games",
        )),
        ChallengeKind::AvatarChange => evaluate_avatar(challenge, data, vision).await,
        ChallengeKind::ChangeName => Ok(evaluate_name(challenge, data)),
    }
}

/// Comment policy: phrase containment or token-set similarity above 0.4
fn evaluate_comment(challenge: &ChallengeDoc, data: &ActionData) -> Evaluation {
    let Some(submitted) = data.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return Evaluation::fail("A comment text is required");
    };

    let Some(phrase) = required_phrase(challenge) else {
        // No extractable target phrase: any non-empty comment satisfies it
        return Evaluation::pass("Comment accepted");
    };

    if submitted.to_lowercase().contains(&phrase.to_lowercase()) {
        return Evaluation::pass(format!("Comment contains the required phrase '{}'", phrase));
    }

    let similarity = calculate_similarity(&phrase, submitted);
    if similarity > COMMENT_SIMILARITY_THRESHOLD {
        return Evaluation::pass(format!(
            "Comment is close enough to the required phrase '{}'",
            phrase
        ));
    }

    Evaluation::fail(format!(
        "Comment does not contain the required phrase '{}'",
        phrase
    ))
}

/// Count-threshold policy shared by rate_games and add_favorites
fn evaluate_count(challenge: &ChallengeDoc, actual: u64, verb: &str, noun: &str) -> Evaluation {
    let required = challenge
        .hints()
        .and_then(|h| h.required_count)
        .unwrap_or(1);

    if actual >= required {
        Evaluation::pass(format!(
            "You have {} {} {} ({} required)",
            verb, actual, noun, required
        ))
    } else {
        Evaluation::fail(format!(
            "You have {} {} of {} required {}",
            verb, actual, required, noun
        ))
    }
}

/// Avatar policy: strict yes/no vision prompt against the target description
async fn evaluate_avatar(
    challenge: &ChallengeDoc,
    data: &ActionData,
    vision: Option<&dyn CompletionClient>,
) -> Result<Evaluation> {
    let Some(image_url) = data.image_url.as_deref().filter(|u| !u.is_empty()) else {
        return Ok(Evaluation::fail("An avatar image is required"));
    };

    let vision = vision.ok_or_else(|| {
        QuestlineError::Config("completion API key is not configured".into())
    })?;

    let target = challenge
        .hints()
        .and_then(|h| h.target_description)
        .or_else(|| after_colon(&challenge.challenge_text))
        .unwrap_or_else(|| challenge.challenge_text.clone());

    let prompt = format!(
        "Does this image match the following description: \"{}\"? Answer strictly yes or no.",
        target
    );

    match vision.classify_image(&prompt, image_url).await {
        Ok(answer) => {
            let normalized = answer.to_lowercase();
            if AFFIRMATIVE_TOKENS.iter().any(|t| normalized.contains(t)) {
                Ok(Evaluation::pass("Avatar matches the challenge description"))
            } else {
                Ok(Evaluation::fail("Avatar does not match the challenge description"))
            }
        }
        Err(e) => {
            // External failure means "not verified yet", never a hard error
            warn!(challenge_id = ?challenge._id, error = %e, "Vision call failed during avatar verification");
            Ok(Evaluation::fail(
                "Avatar could not be verified right now, try again later",
            ))
        }
    }
}

/// Name policy: both parts must match; a one-sided match reports which
/// part is correct (deliberate UX contract)
fn evaluate_name(challenge: &ChallengeDoc, data: &ActionData) -> Evaluation {
    let (Some(first), Some(last)) = (
        data.first_name.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        data.last_name.as_deref().map(str::trim).filter(|s| !s.is_empty()),
    ) else {
        return Evaluation::fail("First and last name are required");
    };

    let Some((target_first, target_last)) = target_name(challenge) else {
        return Evaluation::fail("This challenge carries no target name to verify against");
    };

    let first_ok = name_matches(&target_first, first);
    let last_ok = name_matches(&target_last, last);

    match (first_ok, last_ok) {
        (true, true) => Evaluation::pass("Name matches the challenge"),
        (true, false) => Evaluation::fail(
            "The first name is correct, but the last name does not match",
        ),
        (false, true) => Evaluation::fail(
            "The last name is correct, but the first name does not match",
        ),
        (false, false) => Evaluation::fail("The name does not match the challenge"),
    }
}

/// Whether a single name part matches its target
fn name_matches(target: &str, submitted: &str) -> bool {
    let target_l = target.to_lowercase();
    let submitted_l = submitted.to_lowercase();

    contains_part(&submitted_l, &target_l)
        || contains_part(&target_l, &submitted_l)
        || calculate_similarity(target, submitted) > NAME_SIMILARITY_THRESHOLD
}

/// Containment counts only for parts of two or more characters; a single
/// character would match almost any name
fn contains_part(haystack: &str, needle: &str) -> bool {
    needle.chars().count() >= 2 && haystack.contains(needle)
}

/// Target first/last name from hints or pattern-matched text
fn target_name(challenge: &ChallengeDoc) -> Option<(String, String)> {
    if let Some(hints) = challenge.hints() {
        if let (Some(first), Some(last)) = (hints.first_name, hints.last_name) {
            return Some((first, last));
        }
    }

    // Fallback: "... : First Last" - first token is the first name, the
    // rest is the last name
    let tail = after_colon(&challenge.challenge_text)?;
    let mut parts = tail.split_whitespace();
    let first = parts.next()?.to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    if last.is_empty() {
        return None;
    }
    Some((first, last))
}

/// Required phrase for a comment challenge: hints, then a quoted span,
/// then the text after the last colon
pub fn required_phrase(challenge: &ChallengeDoc) -> Option<String> {
    if let Some(phrase) = challenge.hints().and_then(|h| h.required_phrase) {
        return Some(phrase);
    }

    quoted_span(&challenge.challenge_text).or_else(|| after_colon(&challenge.challenge_text))
}

/// First span enclosed in straight, guillemet, or single quotes
fn quoted_span(text: &str) -> Option<String> {
    for (open, close) in [('"', '"'), ('«', '»'), ('\'', '\'')] {
        let Some(start) = text.find(open) else {
            continue;
        };
        let body_start = start + open.len_utf8();
        if let Some(len) = text[body_start..].find(close) {
            let trimmed = text[body_start..body_start + len].trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Trimmed text after the last colon (ASCII or Arabic)
fn after_colon(text: &str) -> Option<String> {
    let idx = text.rfind([':', '：'])?;
    let tail = text[idx..].chars().skip(1).collect::<String>();
    let trimmed = tail.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    fn challenge(text: &str, description: &str, kind_tag: &str) -> ChallengeDoc {
        ChallengeDoc::new(
            "user-1".into(),
            text.into(),
            description.into(),
            kind_tag.into(),
            "feedfacefeedface".into(),
            Utc::now() + Duration::hours(6),
        )
    }

    /// Vision stub with a canned answer (or a canned failure)
    struct StubVision {
        answer: std::result::Result<String, ()>,
    }

    #[async_trait]
    impl CompletionClient for StubVision {
        async fn generate_text(&self, _prompt: &str) -> Result<String> {
            unreachable!("policies never generate text")
        }

        async fn classify_image(&self, _prompt: &str, _image_url: &str) -> Result<String> {
            self.answer
                .clone()
                .map_err(|_| QuestlineError::Completion("stub failure".into()))
        }
    }

    #[test]
    fn test_classify_explicit_tag_wins() {
        let doc = challenge("write a comment about rating games", "", "rate_games");
        assert_eq!(ChallengeKind::classify(&doc), Some(ChallengeKind::RateGames));
    }

    #[test]
    fn test_classify_keyword_fallback_precedence() {
        // Category tag carries no action key; text mentions both comment
        // and rating keywords - comment wins by precedence
        let doc = challenge("Write a comment and rate a game", "", "social");
        assert_eq!(ChallengeKind::classify(&doc), Some(ChallengeKind::Comment));
    }

    #[test]
    fn test_classify_arabic_keywords() {
        let doc = challenge("اكتب تعليق يحتوي على: مرحبا", "", "creative");
        assert_eq!(ChallengeKind::classify(&doc), Some(ChallengeKind::Comment));
    }

    #[test]
    fn test_classify_unmatched_is_none() {
        let doc = challenge("do something mysterious", "", "exploration");
        assert_eq!(ChallengeKind::classify(&doc), None);
    }

    #[tokio::test]
    async fn test_action_mismatch_fails() {
        let doc = challenge("", "", "comment");
        let result = evaluate(&doc, "rate_games", &ActionData::default(), ActivityCounts::default(), None)
            .await
            .unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_comment_phrase_containment() {
        let doc = challenge("اكتب تعليق يحتوي على: مرحبا", "", "comment");
        let data = ActionData {
            text: Some("مرحبا بالجميع".into()),
            ..Default::default()
        };
        let result = evaluate(&doc, "comment", &data, ActivityCounts::default(), None)
            .await
            .unwrap();
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_comment_unrelated_text_fails() {
        let doc = challenge("اكتب تعليق يحتوي على: مرحبا", "", "comment");
        let data = ActionData {
            text: Some("يوم جميل".into()),
            ..Default::default()
        };
        let result = evaluate(&doc, "comment", &data, ActivityCounts::default(), None)
            .await
            .unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_comment_requires_text() {
        let doc = challenge("write a comment", "", "comment");
        let result = evaluate(&doc, "comment", &ActionData::default(), ActivityCounts::default(), None)
            .await
            .unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_comment_phrase_from_hints() {
        let doc = challenge(
            "write a nice comment",
            r#"{"required_phrase": "great game"}"#,
            "comment",
        );
        let data = ActionData {
            text: Some("What a GREAT game this is".into()),
            ..Default::default()
        };
        let result = evaluate(&doc, "comment", &data, ActivityCounts::default(), None)
            .await
            .unwrap();
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_rate_games_below_threshold() {
        let doc = challenge("rate games", r#"{"required_count": 3}"#, "rate_games");
        let counts = ActivityCounts { ratings: 2, favorites: 0 };
        let result = evaluate(&doc, "rate_games", &ActionData::default(), counts, None)
            .await
            .unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_rate_games_at_threshold_reports_count() {
        let doc = challenge("rate games", r#"{"required_count": 3}"#, "rate_games");
        let counts = ActivityCounts { ratings: 3, favorites: 0 };
        let result = evaluate(&doc, "rate_games", &ActionData::default(), counts, None)
            .await
            .unwrap();
        assert!(result.verified);
        assert!(result.message.contains('3'));
    }

    #[tokio::test]
    async fn test_favorites_default_threshold_is_one() {
        let doc = challenge("add a favorite", "", "add_favorites");
        let counts = ActivityCounts { ratings: 0, favorites: 1 };
        let result = evaluate(&doc, "add_favorites", &ActionData::default(), counts, None)
            .await
            .unwrap();
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_avatar_affirmative_answer_passes() {
        let doc = challenge(
            "change your avatar",
            r#"{"target_description": "a red car"}"#,
            "avatar_change",
        );
        let data = ActionData {
            image_url: Some("https://img.example/a.png".into()),
            ..Default::default()
        };
        let stub = StubVision { answer: Ok("Yes, it does.".into()) };
        let result = evaluate(&doc, "avatar_change", &data, ActivityCounts::default(), Some(&stub))
            .await
            .unwrap();
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_avatar_negative_answer_fails() {
        let doc = challenge("change your avatar", "", "avatar_change");
        let data = ActionData {
            image_url: Some("https://img.example/a.png".into()),
            ..Default::default()
        };
        let stub = StubVision { answer: Ok("no".into()) };
        let result = evaluate(&doc, "avatar_change", &data, ActivityCounts::default(), Some(&stub))
            .await
            .unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_avatar_vision_failure_is_not_an_error() {
        let doc = challenge("change your avatar", "", "avatar_change");
        let data = ActionData {
            image_url: Some("https://img.example/a.png".into()),
            ..Default::default()
        };
        let stub = StubVision { answer: Err(()) };
        let result = evaluate(&doc, "avatar_change", &data, ActivityCounts::default(), Some(&stub))
            .await
            .unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_avatar_without_client_is_config_error() {
        let doc = challenge("change your avatar", "", "avatar_change");
        let data = ActionData {
            image_url: Some("https://img.example/a.png".into()),
            ..Default::default()
        };
        let result = evaluate(&doc, "avatar_change", &data, ActivityCounts::default(), None).await;
        assert!(matches!(result, Err(QuestlineError::Config(_))));
    }

    #[tokio::test]
    async fn test_change_name_partial_match_names_correct_part() {
        let doc = challenge(
            "غير اسمك إلى: أحمد الكتبي",
            r#"{"first_name": "أحمد", "last_name": "الكتبي"}"#,
            "change_name",
        );
        let data = ActionData {
            first_name: Some("أحمد".into()),
            last_name: Some("سمير".into()),
            ..Default::default()
        };
        let result = evaluate(&doc, "change_name", &data, ActivityCounts::default(), None)
            .await
            .unwrap();
        assert!(!result.verified);
        assert!(result.message.contains("first name is correct"));
    }

    #[tokio::test]
    async fn test_change_name_full_match_passes() {
        let doc = challenge(
            "غير اسمك إلى: أحمد الكتبي",
            "",
            "change_name",
        );
        let data = ActionData {
            first_name: Some("أحمد".into()),
            last_name: Some("الكتبي".into()),
            ..Default::default()
        };
        let result = evaluate(&doc, "change_name", &data, ActivityCounts::default(), None)
            .await
            .unwrap();
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_change_name_single_character_does_not_match_by_containment() {
        // "ا" appears inside "الكتبي"; containment must not count for a
        // one-character part
        let doc = challenge(
            "غير اسمك إلى: أحمد الكتبي",
            r#"{"first_name": "أحمد", "last_name": "الكتبي"}"#,
            "change_name",
        );
        let data = ActionData {
            first_name: Some("أحمد".into()),
            last_name: Some("ا".into()),
            ..Default::default()
        };
        let result = evaluate(&doc, "change_name", &data, ActivityCounts::default(), None)
            .await
            .unwrap();
        assert!(!result.verified);
    }

    #[test]
    fn test_required_phrase_sources() {
        // Quoted span
        let doc = challenge(r#"Write a comment containing "hello there""#, "", "comment");
        assert_eq!(required_phrase(&doc).as_deref(), Some("hello there"));

        // After colon
        let doc = challenge("اكتب تعليق يحتوي على: مرحبا", "", "comment");
        assert_eq!(required_phrase(&doc).as_deref(), Some("مرحبا"));

        // Hints beat text patterns
        let doc = challenge(
            "Write a comment: anything",
            r#"{"required_phrase": "from hints"}"#,
            "comment",
        );
        assert_eq!(required_phrase(&doc).as_deref(), Some("from hints"));
    }
}
