//! User document schema
//!
//! Stores profile fields and the Argon2 password hash.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Display name
    pub name: String,

    /// Login identifier, unique across live users
    pub email: String,

    /// Argon2 password hash (PHC string)
    pub password_hash: String,
}

impl UserDoc {
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name,
            email,
            password_hash,
        }
    }

    /// Hex form of the document ID; empty for unsaved documents
    pub fn id_hex(&self) -> String {
        self._id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "email": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("email_unique".to_string())
                    // Deleted users release their email
                    .partial_filter_expression(doc! { "metadata.is_deleted": false })
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
