//! Product core.
//!
//! # Invariants
//! - Products are created only for existing, enabled users.
//! - `date_updated` strictly increases on every successful `update`.

use super::user_service::UserLookup;
use super::{next_update_stamp, CoreError, CoreResult};
use crate::clock::{truncate_to_millis, Clock};
use crate::context::RequestContext;
use crate::db::tx::TransactionHandle;
use crate::model::order::OrderBy;
use crate::model::page::Page;
use crate::model::product::{NewProduct, Product, ProductFilter, ProductId, UpdateProduct};
use crate::model::user::UserId;
use crate::repo::product_repo::ProductStorer;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Product façade over any `ProductStorer`, with owner checks through a
/// `UserLookup`.
pub struct ProductCore<'a, S> {
    storer: S,
    users: &'a dyn UserLookup,
    clock: Arc<dyn Clock>,
}

impl<'a, S: ProductStorer> ProductCore<'a, S> {
    pub fn new(storer: S, users: &'a dyn UserLookup, clock: Arc<dyn Clock>) -> Self {
        Self {
            storer,
            users,
            clock,
        }
    }

    pub fn create(&self, ctx: &RequestContext, new_product: NewProduct) -> CoreResult<Product> {
        new_product.validate().map_err(CoreError::Validation)?;

        let owner = self.users.lookup_user(ctx, new_product.user_id)?;
        if !owner.enabled {
            warn!(
                "event=product_create module=product_core status=error user_id={} reason=disabled",
                owner.user_id
            );
            return Err(CoreError::UserDisabled);
        }

        let now = truncate_to_millis(self.clock.now());
        let product = Product {
            product_id: Uuid::new_v4(),
            user_id: owner.user_id,
            name: new_product.name,
            cost: new_product.cost,
            quantity: new_product.quantity,
            date_created: now,
            date_updated: now,
        };

        self.storer
            .create(ctx, &product)
            .map_err(|err| CoreError::from_repo("products.create", err))?;

        info!(
            "event=product_create module=product_core status=ok product_id={} user_id={}",
            product.product_id, product.user_id
        );
        Ok(product)
    }

    pub fn update(
        &self,
        ctx: &RequestContext,
        current: &Product,
        update: UpdateProduct,
    ) -> CoreResult<Product> {
        update.validate().map_err(CoreError::Validation)?;

        let mut product = current.clone();
        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(cost) = update.cost {
            product.cost = cost;
        }
        if let Some(quantity) = update.quantity {
            product.quantity = quantity;
        }
        product.date_updated = next_update_stamp(self.clock.as_ref(), current.date_updated);

        self.storer
            .update(ctx, &product)
            .map_err(|err| CoreError::from_repo("products.update", err))?;

        info!(
            "event=product_update module=product_core status=ok product_id={}",
            product.product_id
        );
        Ok(product)
    }

    pub fn delete(&self, ctx: &RequestContext, product: &Product) -> CoreResult<()> {
        self.storer
            .delete(ctx, product)
            .map_err(|err| CoreError::from_repo("products.delete", err))?;

        info!(
            "event=product_delete module=product_core status=ok product_id={}",
            product.product_id
        );
        Ok(())
    }

    pub fn query(
        &self,
        ctx: &RequestContext,
        filter: &ProductFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> CoreResult<Vec<Product>> {
        filter.validate().map_err(CoreError::Validation)?;
        self.storer
            .query(ctx, filter, order_by, page)
            .map_err(|err| CoreError::from_repo("products.query", err))
    }

    pub fn count(&self, ctx: &RequestContext, filter: &ProductFilter) -> CoreResult<usize> {
        filter.validate().map_err(CoreError::Validation)?;
        self.storer
            .count(ctx, filter)
            .map_err(|err| CoreError::from_repo("products.count", err))
    }

    pub fn query_by_id(&self, ctx: &RequestContext, product_id: ProductId) -> CoreResult<Product> {
        self.storer
            .query_by_id(ctx, product_id)
            .map_err(|err| CoreError::from_repo("products.query_by_id", err))
    }

    pub fn query_by_user_id(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
    ) -> CoreResult<Vec<Product>> {
        self.storer
            .query_by_user_id(ctx, user_id)
            .map_err(|err| CoreError::from_repo("products.query_by_user_id", err))
    }

    /// Builds a core whose storer runs on the connection carried by `tx`.
    /// Owner lookups keep using this core's `UserLookup`.
    pub fn rebind_to_transaction<'tx>(
        &self,
        tx: &'tx dyn TransactionHandle,
    ) -> CoreResult<ProductCore<'a, Box<dyn ProductStorer + 'tx>>> {
        let storer = self
            .storer
            .execute_under_transaction(tx)
            .map_err(|err| CoreError::from_repo("products.execute_under_transaction", err))?;

        Ok(ProductCore {
            storer,
            users: self.users,
            clock: Arc::clone(&self.clock),
        })
    }
}
