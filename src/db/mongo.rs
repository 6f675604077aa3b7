//! MongoDB client and typed collections
//!
//! Every read and write through [`MongoCollection`] skips soft-deleted
//! documents; deletion only flips `metadata.is_deleted`.

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::db::schemas::Metadata;
use crate::types::UsergateError;

/// MongoDB duplicate key error code
const DUPLICATE_KEY: i32 = 11000;

/// Schemas that declare their own indexes
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Schemas carrying [`Metadata`]
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Bound shared by every stored schema
pub trait Stored:
    Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata
{
}

impl<T> Stored for T where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata
{
}

/// Connected MongoDB database handle
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping, failing within 3s if the server is unreachable
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, UsergateError> {
        info!("Connecting to MongoDB at {}", uri);

        let separator = if uri.contains('?') { '&' } else { '?' };
        let uri = format!(
            "{}{}serverSelectionTimeoutMS=3000&connectTimeoutMS=3000",
            uri, separator
        );

        let client = Client::with_uri_str(&uri)
            .await
            .map_err(|e| UsergateError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| UsergateError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);
        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Typed collection with its schema's indexes applied
    pub async fn collection<T: Stored>(&self, name: &str) -> Result<MongoCollection<T>, UsergateError> {
        let collection = MongoCollection {
            inner: self.client.database(&self.db_name).collection::<T>(name),
        };
        collection.apply_indexes().await?;
        Ok(collection)
    }
}

/// Collection of live documents of one schema
#[derive(Debug, Clone)]
pub struct MongoCollection<T: Send + Sync> {
    inner: Collection<T>,
}

/// Restrict a filter to documents that are not soft-deleted
fn live(mut filter: Document) -> Document {
    filter.insert("metadata.is_deleted", doc! { "$ne": true });
    filter
}

impl<T: Stored> MongoCollection<T> {
    async fn apply_indexes(&self) -> Result<(), UsergateError> {
        let indexes: Vec<IndexModel> = T::into_indices()
            .into_iter()
            .map(|(keys, options)| IndexModel::builder().keys(keys).options(options).build())
            .collect();

        if indexes.is_empty() {
            return Ok(());
        }

        debug!("Applying {} index(es) to {}", indexes.len(), self.inner.name());
        self.inner
            .create_indexes(indexes)
            .await
            .map_err(|e| UsergateError::Database(format!("Failed to create indexes: {}", e)))?;
        Ok(())
    }

    /// Insert with fresh metadata and return the generated id
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, UsergateError> {
        *item.mut_metadata() = Metadata::new();

        let result = self.inner.insert_one(item).await.map_err(map_write_error)?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| UsergateError::Database("Inserted document has no ObjectId".into()))
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, UsergateError> {
        self.inner
            .find_one(live(filter))
            .await
            .map_err(|e| UsergateError::Database(format!("Find failed: {}", e)))
    }

    /// All matching documents, in natural (insertion) order
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, UsergateError> {
        let cursor = self
            .inner
            .find(live(filter))
            .await
            .map_err(|e| UsergateError::Database(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| UsergateError::Database(format!("Reading cursor failed: {}", e)))
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, UsergateError> {
        self.inner
            .update_one(live(filter), update)
            .await
            .map_err(map_write_error)
    }

    /// Hide the matching document from every later read
    pub async fn soft_delete(&self, filter: Document) -> Result<UpdateResult, UsergateError> {
        let now = DateTime::now();
        self.update_one(
            filter,
            doc! {
                "$set": {
                    "metadata.is_deleted": true,
                    "metadata.deleted_at": now,
                    "metadata.updated_at": now,
                }
            },
        )
        .await
    }
}

/// Unique index violations become `Conflict`, everything else `Database`
fn map_write_error(err: mongodb::error::Error) -> UsergateError {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_error))
            if write_error.code == DUPLICATE_KEY =>
        {
            UsergateError::Conflict("Email already registered".into())
        }
        _ => UsergateError::Database(format!("Write failed: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_filter_excludes_deleted() {
        let filter = live(doc! { "email": "ada@example.com" });
        assert_eq!(filter.get_str("email").unwrap(), "ada@example.com");
        assert_eq!(
            filter.get_document("metadata.is_deleted").unwrap(),
            &doc! { "$ne": true }
        );
    }
}
