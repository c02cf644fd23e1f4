//! MongoDB client and collection wrapper
//!
//! Typed collections apply their schema-declared indexes on first use.
//! All writes go through this wrapper so metadata timestamps and the
//! soft-delete filter stay consistent across collections.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications, UpdateOptions},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::QuestlineError;

/// MongoDB duplicate-key error code, raised on unique index violations
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, QuestlineError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| QuestlineError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        // Verify connection with timeout
        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| QuestlineError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, QuestlineError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Count documents in an untyped collection
    ///
    /// Used for the read-only activity counts (`game_ratings`,
    /// `user_favorites`) where no document schema is needed.
    pub async fn raw_count(&self, collection: &str, filter: Document) -> Result<u64, QuestlineError> {
        self.client
            .database(&self.db_name)
            .collection::<Document>(collection)
            .count_documents(filter)
            .await
            .map_err(|e| QuestlineError::Database(format!("Count failed: {}", e)))
    }

    /// Ping the database (used by the readiness probe)
    pub async fn ping(&self) -> Result<(), QuestlineError> {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| QuestlineError::Database(format!("MongoDB ping failed: {}", e)))
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, QuestlineError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        // Apply indexes
        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), QuestlineError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| QuestlineError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, QuestlineError> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| QuestlineError::Database(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| QuestlineError::Database("Failed to get inserted ID".into()))
    }

    /// Insert a document, treating a unique-index violation as a no-op
    ///
    /// Returns `true` if the document was inserted, `false` if an existing
    /// document already holds the unique key. This is what makes the
    /// completion-record insert idempotent under racing verification calls.
    pub async fn insert_one_idempotent(&self, mut item: T) -> Result<bool, QuestlineError> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        match self.inner.insert_one(item).await {
            Ok(_) => Ok(true),
            Err(e) => {
                if is_duplicate_key(&e) {
                    Ok(false)
                } else {
                    Err(QuestlineError::Database(format!("Insert failed: {}", e)))
                }
            }
        }
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, QuestlineError> {
        // Add is_deleted check
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        self.inner
            .find_one(full_filter)
            .await
            .map_err(|e| QuestlineError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, QuestlineError> {
        use futures_util::StreamExt;

        // Add is_deleted check
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let cursor = self
            .inner
            .find(full_filter)
            .await
            .map_err(|e| QuestlineError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Count documents matching a filter
    pub async fn count(&self, filter: Document) -> Result<u64, QuestlineError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        self.inner
            .count_documents(full_filter)
            .await
            .map_err(|e| QuestlineError::Database(format!("Count failed: {}", e)))
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, QuestlineError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| QuestlineError::Database(format!("Update failed: {}", e)))
    }

    /// Update one document, inserting it if absent
    pub async fn upsert_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, QuestlineError> {
        self.inner
            .update_one(filter, update.into())
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await
            .map_err(|e| QuestlineError::Database(format!("Upsert failed: {}", e)))
    }

    /// Conditionally update one document, returning whether a document matched
    ///
    /// The compare-and-swap building block: the filter carries the expected
    /// current state (e.g. `is_completed: false`) and the update only lands
    /// if a document still matches. `modified_count == 0` means another
    /// writer got there first.
    pub async fn update_if(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<bool, QuestlineError> {
        let result = self.update_one(filter, update).await?;
        Ok(result.modified_count > 0)
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

/// Whether a MongoDB error is a unique-index (duplicate key) violation
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(we)) = err.kind.as_ref() {
        return we.code == DUPLICATE_KEY_CODE;
    }
    // Server message fallback for wrapped write errors
    err.to_string().contains("E11000")
}

#[cfg(test)]
mod tests {
    // Store operations require a running MongoDB instance and are covered
    // by deployment smoke tests. The pure logic layered on top of this
    // wrapper (allocator, policies, status window) is unit tested in
    // the services modules.
}
