//! Product domain model.
//!
//! # Invariants
//! - Every product is owned by exactly one user (`user_id`).
//! - `cost` is non-negative and `quantity` is at least one.

use crate::model::user::UserId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type ProductId = Uuid;

pub const ORDER_BY_PRODUCT_ID: &str = "product_id";
pub const ORDER_BY_NAME: &str = "name";
pub const ORDER_BY_COST: &str = "cost";
pub const ORDER_BY_QUANTITY: &str = "quantity";
pub const ORDER_BY_USER_ID: &str = "user_id";

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub name: String,
    pub cost: f64,
    pub quantity: u32,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub user_id: UserId,
    pub name: String,
    pub cost: f64,
    pub quantity: u32,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)?;
        validate_cost(self.cost)?;
        validate_quantity(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub cost: Option<f64>,
    pub quantity: Option<u32>,
}

impl UpdateProduct {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(cost) = self.cost {
            validate_cost(cost)?;
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub product_id: Option<ProductId>,
    /// Substring match on `name`.
    pub name: Option<String>,
    pub cost: Option<f64>,
    pub quantity: Option<u32>,
}

impl ProductFilter {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            if name.chars().count() < 3 {
                return Err("name filter must have at least 3 characters".to_string());
            }
        }
        if let Some(cost) = self.cost {
            validate_cost(cost)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("product name must not be empty".to_string());
    }
    Ok(())
}

fn validate_cost(cost: f64) -> Result<(), String> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(format!("invalid product cost {cost}"));
    }
    Ok(())
}

fn validate_quantity(quantity: u32) -> Result<(), String> {
    if quantity == 0 {
        return Err("product quantity must be at least 1".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{NewProduct, UpdateProduct};
    use uuid::Uuid;

    #[test]
    fn new_product_rejects_bad_cost_and_quantity() {
        let mut product = NewProduct {
            user_id: Uuid::new_v4(),
            name: "Comic Books".to_string(),
            cost: 50.0,
            quantity: 2,
        };
        assert!(product.validate().is_ok());

        product.cost = -1.0;
        assert!(product.validate().is_err());

        product.cost = f64::NAN;
        assert!(product.validate().is_err());

        product.cost = 1.0;
        product.quantity = 0;
        assert!(product.validate().is_err());
    }

    #[test]
    fn empty_update_is_valid() {
        assert!(UpdateProduct::default().validate().is_ok());
    }
}
