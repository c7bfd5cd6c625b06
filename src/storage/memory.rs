use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::model::{GiftCode, GroupRecord, Plan, SubscriptionRecord, UserRecord};
use super::{StorageError, Store};

/// In-memory store with the same semantics as [`super::MongoStore`].
/// Process-local, so only suitable for tests and single-instance dry runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<i64, UserRecord>>,
    groups: Arc<DashMap<i64, GroupRecord>>,
    subscriptions: Arc<DashMap<i64, SubscriptionRecord>>,
    gift_codes: Arc<DashMap<String, GiftCode>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        self.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        Ok(self.users.iter().map(|e| e.value().clone()).collect())
    }

    async fn upsert_group(&self, group: &GroupRecord) -> Result<(), StorageError> {
        self.groups.insert(group.group_id, group.clone());
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, StorageError> {
        Ok(self.groups.iter().map(|e| e.value().clone()).collect())
    }

    async fn find_subscription(&self, user_id: i64) -> Result<Option<SubscriptionRecord>, StorageError> {
        Ok(self.subscriptions.get(&user_id).map(|e| e.value().clone()))
    }

    async fn upsert_subscription(&self, user_id: i64, plan: Plan) -> Result<(), StorageError> {
        self.subscriptions.insert(user_id, SubscriptionRecord { user_id, plan });
        Ok(())
    }

    async fn insert_gift_code(&self, gift_code: &GiftCode) -> Result<bool, StorageError> {
        match self.gift_codes.entry(gift_code.code.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(gift_code.clone());
                Ok(true)
            }
        }
    }

    async fn take_gift_code(&self, code: &str) -> Result<Option<GiftCode>, StorageError> {
        Ok(self.gift_codes.remove(code).map(|(_, v)| v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gift_code_insert_rejects_duplicates() {
        let store = MemoryStore::new();
        let code = GiftCode {
            code: "AAAA1111".to_string(),
            plan: Plan::Professional,
        };

        assert!(store.insert_gift_code(&code).await.unwrap());
        assert!(!store.insert_gift_code(&code).await.unwrap());
    }

    #[tokio::test]
    async fn take_gift_code_returns_each_code_once() {
        let store = MemoryStore::new();
        let code = GiftCode {
            code: "ZZZZ9999".to_string(),
            plan: Plan::Professional,
        };
        store.insert_gift_code(&code).await.unwrap();

        assert_eq!(store.take_gift_code("ZZZZ9999").await.unwrap(), Some(code));
        assert_eq!(store.take_gift_code("ZZZZ9999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_user_overwrites_identity_snapshot() {
        let store = MemoryStore::new();
        let mut user = UserRecord {
            user_id: 7,
            username: Some("old".to_string()),
            full_name: "Old Name".to_string(),
        };
        store.upsert_user(&user).await.unwrap();

        user.username = Some("new".to_string());
        user.full_name = "New Name".to_string();
        store.upsert_user(&user).await.unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users, vec![user]);
    }
}
