mod error;
mod memory;
mod model;
mod mongo;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use model::{GiftCode, GroupRecord, Plan, SubscriptionRecord, UserRecord};
pub use mongo::MongoStore;

use async_trait::async_trait;

/// Document store behind the bot: four collections, each keyed by a single
/// field, supporting upsert, find and delete-and-return.
///
/// `take_gift_code` must be atomic at the store level so that two concurrent
/// redemptions of the same code cannot both succeed, even across multiple
/// bot instances sharing one database.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StorageError>;
    async fn list_users(&self) -> Result<Vec<UserRecord>, StorageError>;

    async fn upsert_group(&self, group: &GroupRecord) -> Result<(), StorageError>;
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, StorageError>;

    async fn find_subscription(&self, user_id: i64) -> Result<Option<SubscriptionRecord>, StorageError>;
    async fn upsert_subscription(&self, user_id: i64, plan: Plan) -> Result<(), StorageError>;

    /// Returns `false` when a code with the same value already exists.
    async fn insert_gift_code(&self, gift_code: &GiftCode) -> Result<bool, StorageError>;

    /// Deletes the code and returns it, or `None` if it was never issued or
    /// already redeemed.
    async fn take_gift_code(&self, code: &str) -> Result<Option<GiftCode>, StorageError>;
}
