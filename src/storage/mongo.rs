use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};

use super::model::{GiftCode, GroupRecord, Plan, SubscriptionRecord, UserRecord};
use super::{StorageError, Store};

const DUPLICATE_KEY: i32 = 11000;

/// Authoritative store shared by every bot instance.
#[derive(Clone)]
pub struct MongoStore {
    users: Collection<UserRecord>,
    groups: Collection<GroupRecord>,
    subscriptions: Collection<SubscriptionRecord>,
    gift_codes: Collection<GiftCode>,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StorageError> {
        info!("Connecting to MongoDB...");
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);

        let store = Self {
            users: db.collection("users"),
            groups: db.collection("groups"),
            subscriptions: db.collection("subscriptions"),
            gift_codes: db.collection("gift_codes"),
        };

        // The unique index is what turns a double insert of the same code
        // into a duplicate-key write error instead of a silent overwrite.
        store
            .gift_codes
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "code": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        info!("Connected to MongoDB");

        Ok(store)
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        self.users
            .update_one(
                doc! { "user_id": user.user_id },
                doc! { "$set": { "username": user.username.clone(), "full_name": user.full_name.clone() } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        let cursor = self.users.find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn upsert_group(&self, group: &GroupRecord) -> Result<(), StorageError> {
        self.groups
            .update_one(
                doc! { "group_id": group.group_id },
                doc! { "$set": { "title": group.title.clone() } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, StorageError> {
        let cursor = self.groups.find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_subscription(&self, user_id: i64) -> Result<Option<SubscriptionRecord>, StorageError> {
        Ok(self.subscriptions.find_one(doc! { "user_id": user_id }).await?)
    }

    async fn upsert_subscription(&self, user_id: i64, plan: Plan) -> Result<(), StorageError> {
        self.subscriptions
            .update_one(
                doc! { "user_id": user_id },
                doc! { "$set": { "plan": to_bson(&plan)? } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn insert_gift_code(&self, gift_code: &GiftCode) -> Result<bool, StorageError> {
        match self.gift_codes.insert_one(gift_code).await {
            Ok(_) => Ok(true),
            Err(e) => match *e.kind {
                ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY => Ok(false),
                _ => Err(e.into()),
            },
        }
    }

    async fn take_gift_code(&self, code: &str) -> Result<Option<GiftCode>, StorageError> {
        // find_one_and_delete is the single source of truth for "used":
        // under concurrent redemptions exactly one caller receives the code.
        Ok(self.gift_codes.find_one_and_delete(doc! { "code": code }).await?)
    }
}
