//! Read-only per-user aggregate over owned products.

use crate::model::user::UserId;

pub const ORDER_BY_USER_ID: &str = "user_id";
pub const ORDER_BY_USER_NAME: &str = "user_name";

#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub user_id: UserId,
    pub user_name: String,
    /// Number of products owned by the user.
    pub total_count: u64,
    /// Sum of `cost` over the user's products.
    pub total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSummaryFilter {
    pub user_id: Option<UserId>,
    /// Substring match on `user_name`.
    pub user_name: Option<String>,
}

impl UserSummaryFilter {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.user_name {
            if name.chars().count() < 3 {
                return Err("user_name filter must have at least 3 characters".to_string());
            }
        }
        Ok(())
    }
}
