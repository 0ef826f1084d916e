use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

pub type MerchantId = Uuid;

/// Where money was spent or received from. Optional on a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: MerchantId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Merchant {
    pub fn new(user_id: UserId, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            created_at: Utc::now(),
        }
    }
}
