//! Document schemas for the challenge engine collections

pub mod challenge;
pub mod completion;
pub mod metadata;
pub mod profile;

pub use challenge::{
    ChallengeDoc, ChallengeState, VerificationHints, CHALLENGES_PER_USER, USER_CHALLENGE_COLLECTION,
};
pub use completion::{CompletionDoc, CHALLENGE_COMPLETION_COLLECTION};
pub use metadata::Metadata;
pub use profile::{ProfileDoc, PROFILE_COLLECTION};

/// Read-only collection of rating submissions (one document per rating)
pub const GAME_RATING_COLLECTION: &str = "game_ratings";

/// Read-only collection of favorite entries (one document per favorite)
pub const USER_FAVORITE_COLLECTION: &str = "user_favorites";
