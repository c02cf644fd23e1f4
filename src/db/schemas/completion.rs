//! Completion record schema
//!
//! Append-only audit trail: one document per successful verification.
//! Records are never mutated or deleted - they are the sole basis for the
//! rolling 30-day verification window.

use bson::{doc, oid::ObjectId, DateTime, Document};
use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for challenge completions
pub const CHALLENGE_COMPLETION_COLLECTION: &str = "challenge_completions";

/// Completion record stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CompletionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User who completed the challenge
    pub user_id: String,

    /// The completed challenge (hex ObjectId of the challenge document)
    pub challenge_id: String,

    /// When the verification succeeded
    pub completed_at: DateTime,
}

impl CompletionDoc {
    /// Create a completion record
    pub fn new(user_id: String, challenge_id: String, completed_at: ChronoDateTime<Utc>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id,
            challenge_id,
            completed_at: DateTime::from_chrono(completed_at),
        }
    }
}

impl IntoIndexes for CompletionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One completion per (user, challenge); makes the insert
            // idempotent under racing verification calls
            (
                doc! { "user_id": 1, "challenge_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_challenge_unique".to_string())
                        .build(),
                ),
            ),
            // Rolling-window count: completions for a user newer than a cutoff
            (
                doc! { "user_id": 1, "completed_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_window_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CompletionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
