//! In-process user store for dev mode and tests

use async_trait::async_trait;
use bson::oid::ObjectId;
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

use super::{parse_id, UserChanges, UserStore};
use crate::db::schemas::{Metadata, UserDoc};
use crate::types::{Result, UsergateError};

/// Users keyed by id, plus an email reservation map enforcing uniqueness.
///
/// When both maps are locked, `users` is always locked first.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<ObjectId, UserDoc>,
    emails: DashMap<String, ObjectId>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve_email(&self, email: &str, id: ObjectId) -> Result<()> {
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(existing) if *existing.get() != id => {
                Err(UsergateError::Conflict("Email already registered".into()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    fn release_email(&self, email: &str, id: ObjectId) {
        self.emails.remove_if(email, |_, owner| *owner == id);
    }

    fn live(&self, id: &ObjectId) -> Option<UserDoc> {
        self.users
            .get(id)
            .filter(|user| !user.metadata.is_deleted)
            .map(|user| user.value().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, mut user: UserDoc) -> Result<UserDoc> {
        let id = ObjectId::new();
        self.reserve_email(&user.email, id)?;

        user._id = Some(id);
        user.metadata = Metadata::new();
        self.users.insert(id, user.clone());

        debug!(id = %id, "Created user");
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<UserDoc>> {
        let mut users: Vec<UserDoc> = self
            .users
            .iter()
            .filter(|entry| !entry.metadata.is_deleted)
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by_key(|user| user._id);
        Ok(users)
    }

    async fn get(&self, id: &str) -> Result<Option<UserDoc>> {
        let id = parse_id(id)?;
        Ok(self.live(&id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserDoc>> {
        let Some(id) = self.emails.get(email).map(|owner| *owner) else {
            return Ok(None);
        };
        Ok(self.live(&id))
    }

    async fn update(&self, id: &str, changes: UserChanges) -> Result<Option<UserDoc>> {
        let id = parse_id(id)?;

        // Held across the email swap so concurrent updates of one user apply
        // their reservation and their change together
        let mut user = match self.users.get_mut(&id) {
            Some(user) if !user.metadata.is_deleted => user,
            _ => return Ok(None),
        };

        if let Some(email) = changes.email.as_ref().filter(|e| **e != user.email) {
            self.reserve_email(email, id)?;
            self.release_email(&user.email, id);
        }

        changes.apply(&mut user);
        user.metadata.touch();
        Ok(Some(user.value().clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = parse_id(id)?;

        let email = match self.users.get_mut(&id) {
            Some(mut user) if !user.metadata.is_deleted => {
                user.metadata.mark_deleted();
                user.email.clone()
            }
            _ => return Ok(false),
        };

        self.release_email(&email, id);
        debug!(id = %id, "Soft-deleted user");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(name: &str, email: &str) -> UserDoc {
        UserDoc::new(name.into(), email.into(), "hash".into())
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let store = MemoryUserStore::new();
        let ada = store.create(user("Ada", "ada@example.com")).await.unwrap();

        assert!(ada._id.is_some());
        let fetched = store.get(&ada.id_hex()).await.unwrap().unwrap();
        assert_eq!(fetched.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryUserStore::new();
        store.create(user("Ada", "ada@example.com")).await.unwrap();

        let err = store
            .create(user("Imposter", "ada@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, UsergateError::Conflict(_)));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let store = MemoryUserStore::new();
        for i in 0..5 {
            store
                .create(user(&format!("user{i}"), &format!("u{i}@example.com")))
                .await
                .unwrap();
        }

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["user0", "user1", "user2", "user3", "user4"]);
    }

    #[tokio::test]
    async fn test_update_fields_and_email() {
        let store = MemoryUserStore::new();
        let ada = store.create(user("Ada", "ada@example.com")).await.unwrap();

        let updated = store
            .update(
                &ada.id_hex(),
                UserChanges {
                    name: Some("Ada Lovelace".into()),
                    email: Some("lovelace@example.com".into()),
                    password_hash: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "Ada Lovelace");
        assert_eq!(updated.password_hash, "hash");
        assert!(store.find_by_email("ada@example.com").await.unwrap().is_none());
        assert!(store
            .find_by_email("lovelace@example.com")
            .await
            .unwrap()
            .is_some());

        // Old email is free again
        store.create(user("Other", "ada@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_to_taken_email_conflicts() {
        let store = MemoryUserStore::new();
        let ada = store.create(user("Ada", "ada@example.com")).await.unwrap();
        store.create(user("Bob", "bob@example.com")).await.unwrap();

        let err = store
            .update(
                &ada.id_hex(),
                UserChanges {
                    email: Some("bob@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UsergateError::Conflict(_)));

        let unchanged = store.get(&ada.id_hex()).await.unwrap().unwrap();
        assert_eq!(unchanged.email, "ada@example.com");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_email_changes_keep_one_reservation() {
        let store = Arc::new(MemoryUserStore::new());
        let ada = store.create(user("Ada", "ada@example.com")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let id = ada.id_hex();
            handles.push(tokio::spawn(async move {
                store
                    .update(
                        &id,
                        UserChanges {
                            email: Some(format!("ada{i}@example.com")),
                            ..Default::default()
                        },
                    )
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        let final_email = store.get(&ada.id_hex()).await.unwrap().unwrap().email;
        assert_eq!(store.emails.len(), 1);
        assert_eq!(*store.emails.get(&final_email).unwrap(), ada._id.unwrap());

        // Every address the user no longer holds is free again
        for i in 0..16 {
            let email = format!("ada{i}@example.com");
            if email != final_email {
                store.create(user("Other", &email)).await.unwrap();
            }
        }
        store.create(user("Other", "ada@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = MemoryUserStore::new();
        let result = store
            .update(&ObjectId::new().to_hex(), UserChanges::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let store = MemoryUserStore::new();
        let ada = store.create(user("Ada", "ada@example.com")).await.unwrap();
        let id = ada.id_hex();

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.update(&id, UserChanges::default()).await.unwrap().is_none());

        // Record is retained, only hidden
        assert!(store.users.get(&ada._id.unwrap()).unwrap().metadata.is_deleted);

        // Email can be registered again
        store.create(user("Ada", "ada@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_id_is_bad_request() {
        let store = MemoryUserStore::new();
        let err = store.get("zzz").await.unwrap_err();
        assert!(matches!(err, UsergateError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_concurrent_creates_same_email() {
        let store = Arc::new(MemoryUserStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .create(user(&format!("racer{i}"), "race@example.com"))
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
