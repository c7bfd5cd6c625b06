use serde::{Deserialize, Serialize};

/// Last-known identity snapshot, refreshed on every /start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_id: i64,
    pub title: String,
}

/// Paid tiers. A user without a subscription record is on the free tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Professional,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: i64,
    pub plan: Plan,
}

/// Single-use credential. Deleted from the store upon redemption; deletion
/// is what makes a code "used".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GiftCode {
    pub code: String,
    pub plan: Plan,
}
