//! MongoDB-backed user store

use async_trait::async_trait;
use bson::{doc, DateTime, Document};

use super::{parse_id, UserChanges, UserStore};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::Result;

#[derive(Clone)]
pub struct MongoUserStore {
    users: MongoCollection<UserDoc>,
}

impl MongoUserStore {
    /// Open the users collection, creating its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let users = client.collection::<UserDoc>(USER_COLLECTION).await?;
        Ok(Self { users })
    }
}

fn set_document(changes: &UserChanges) -> Document {
    let mut set = doc! { "metadata.updated_at": DateTime::now() };
    if let Some(name) = &changes.name {
        set.insert("name", name.clone());
    }
    if let Some(email) = &changes.email {
        set.insert("email", email.clone());
    }
    if let Some(password_hash) = &changes.password_hash {
        set.insert("password_hash", password_hash.clone());
    }
    set
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn create(&self, mut user: UserDoc) -> Result<UserDoc> {
        let id = self.users.insert_one(user.clone()).await?;
        user._id = Some(id);
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<UserDoc>> {
        self.users.find_many(doc! {}).await
    }

    async fn get(&self, id: &str) -> Result<Option<UserDoc>> {
        let id = parse_id(id)?;
        self.users.find_one(doc! { "_id": id }).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "email": email }).await
    }

    async fn update(&self, id: &str, changes: UserChanges) -> Result<Option<UserDoc>> {
        let oid = parse_id(id)?;
        let result = self
            .users
            .update_one(doc! { "_id": oid }, doc! { "$set": set_document(&changes) })
            .await?;

        if result.matched_count == 0 {
            return Ok(None);
        }
        self.users.find_one(doc! { "_id": oid }).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let oid = parse_id(id)?;
        let result = self.users.soft_delete(doc! { "_id": oid }).await?;
        Ok(result.modified_count > 0)
    }
}
