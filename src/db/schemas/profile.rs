//! User profile schema (verification flags subset)
//!
//! The full profile belongs to the surrounding application; this service
//! reads the username and owns the denormalized verification fields.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for profiles
pub const PROFILE_COLLECTION: &str = "profiles";

/// Profile document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProfileDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User identifier
    pub user_id: String,

    /// Display username; one reserved value grants permanent verification
    #[serde(default)]
    pub username: String,

    /// Whether the user currently holds verified status
    #[serde(default)]
    pub is_verified: bool,

    /// Permanent verification flag; once set, never cleared by the tracker
    #[serde(default)]
    pub is_permanently_verified: bool,

    /// Forward-looking lease for non-permanent verified status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_until: Option<DateTime>,
}

impl IntoIndexes for ProfileDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("profile_user_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ProfileDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
