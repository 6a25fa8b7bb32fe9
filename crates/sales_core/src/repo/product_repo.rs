//! Product storer contract and SQLite implementation.

use super::sql::{millis, page_binds, parse_millis, parse_uuid, SqlResultExt, WhereClause};
use super::{rebind_connection, RepoError, RepoResult};
use crate::context::RequestContext;
use crate::db::tx::TransactionHandle;
use crate::model::order::OrderBy;
use crate::model::page::Page;
use crate::model::product::{
    Product, ProductFilter, ProductId, ORDER_BY_COST, ORDER_BY_NAME, ORDER_BY_PRODUCT_ID,
    ORDER_BY_QUANTITY, ORDER_BY_USER_ID,
};
use crate::model::user::UserId;
use log::debug;
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;

const PRODUCT_SELECT_SQL: &str = "SELECT
    product_id,
    user_id,
    name,
    cost,
    quantity,
    date_created,
    date_updated
FROM products";

static ORDER_BY_FIELDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (ORDER_BY_PRODUCT_ID, "product_id"),
        (ORDER_BY_NAME, "name"),
        (ORDER_BY_COST, "cost"),
        (ORDER_BY_QUANTITY, "quantity"),
        (ORDER_BY_USER_ID, "user_id"),
    ])
});

pub trait ProductStorer {
    fn create(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()>;
    fn update(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()>;
    fn delete(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()>;
    fn query(
        &self,
        ctx: &RequestContext,
        filter: &ProductFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> RepoResult<Vec<Product>>;
    fn count(&self, ctx: &RequestContext, filter: &ProductFilter) -> RepoResult<usize>;
    fn query_by_id(&self, ctx: &RequestContext, product_id: ProductId) -> RepoResult<Product>;
    fn query_by_user_id(&self, ctx: &RequestContext, user_id: UserId)
        -> RepoResult<Vec<Product>>;
    fn execute_under_transaction<'tx>(
        &self,
        tx: &'tx dyn TransactionHandle,
    ) -> RepoResult<Box<dyn ProductStorer + 'tx>>;
}

impl<S: ProductStorer + ?Sized> ProductStorer for Box<S> {
    fn create(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()> {
        (**self).create(ctx, product)
    }
    fn update(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()> {
        (**self).update(ctx, product)
    }
    fn delete(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()> {
        (**self).delete(ctx, product)
    }
    fn query(
        &self,
        ctx: &RequestContext,
        filter: &ProductFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> RepoResult<Vec<Product>> {
        (**self).query(ctx, filter, order_by, page)
    }
    fn count(&self, ctx: &RequestContext, filter: &ProductFilter) -> RepoResult<usize> {
        (**self).count(ctx, filter)
    }
    fn query_by_id(&self, ctx: &RequestContext, product_id: ProductId) -> RepoResult<Product> {
        (**self).query_by_id(ctx, product_id)
    }
    fn query_by_user_id(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
    ) -> RepoResult<Vec<Product>> {
        (**self).query_by_user_id(ctx, user_id)
    }
    fn execute_under_transaction<'tx>(
        &self,
        tx: &'tx dyn TransactionHandle,
    ) -> RepoResult<Box<dyn ProductStorer + 'tx>> {
        (**self).execute_under_transaction(tx)
    }
}

/// SQLite-backed product store.
pub struct SqliteProductStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProductStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn select(&self, op: &'static str, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<Product>> {
        let mut stmt = self.conn.prepare(sql).op(op)?;
        let mut rows = stmt.query(params_from_iter(binds)).op(op)?;
        let mut products = Vec::new();
        while let Some(row) = rows.next().op(op)? {
            products.push(parse_product_row(row)?);
        }
        Ok(products)
    }
}

impl ProductStorer for SqliteProductStore<'_> {
    fn create(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()> {
        ctx.check()?;

        self.conn
            .execute(
                "INSERT INTO products (
                    product_id,
                    user_id,
                    name,
                    cost,
                    quantity,
                    date_created,
                    date_updated
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    product.product_id.to_string(),
                    product.user_id.to_string(),
                    product.name.as_str(),
                    product.cost,
                    product.quantity,
                    millis(product.date_created),
                    millis(product.date_updated),
                ],
            )
            .op("products.create")?;

        debug!(
            "event=product_store_create module=repo status=ok product_id={}",
            product.product_id
        );
        Ok(())
    }

    fn update(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()> {
        ctx.check()?;

        let changed = self
            .conn
            .execute(
                "UPDATE products
                 SET
                    name = ?1,
                    cost = ?2,
                    quantity = ?3,
                    date_updated = ?4
                 WHERE product_id = ?5;",
                params![
                    product.name.as_str(),
                    product.cost,
                    product.quantity,
                    millis(product.date_updated),
                    product.product_id.to_string(),
                ],
            )
            .op("products.update")?;

        if changed == 0 {
            return Err(not_found(product.product_id));
        }
        Ok(())
    }

    fn delete(&self, ctx: &RequestContext, product: &Product) -> RepoResult<()> {
        ctx.check()?;

        let changed = self
            .conn
            .execute(
                "DELETE FROM products WHERE product_id = ?1;",
                [product.product_id.to_string()],
            )
            .op("products.delete")?;

        if changed == 0 {
            return Err(not_found(product.product_id));
        }
        Ok(())
    }

    fn query(
        &self,
        ctx: &RequestContext,
        filter: &ProductFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> RepoResult<Vec<Product>> {
        let order_clause = order_by.to_sql_clause(&ORDER_BY_FIELDS)?;
        ctx.check()?;

        let clause = filter_clause(filter);
        let sql = format!(
            "{PRODUCT_SELECT_SQL} WHERE 1 = 1{}{order_clause} LIMIT ? OFFSET ?",
            clause.sql()
        );
        let (limit, offset) = page_binds(page)?;
        let mut binds = clause.into_binds();
        binds.push(limit);
        binds.push(offset);

        self.select("products.query", &sql, binds)
    }

    fn count(&self, ctx: &RequestContext, filter: &ProductFilter) -> RepoResult<usize> {
        ctx.check()?;

        let clause = filter_clause(filter);
        let sql = format!("SELECT COUNT(1) FROM products WHERE 1 = 1{}", clause.sql());
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(clause.into_binds()), |row| row.get(0))
            .op("products.count")?;

        usize::try_from(count).map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
    }

    fn query_by_id(&self, ctx: &RequestContext, product_id: ProductId) -> RepoResult<Product> {
        ctx.check()?;

        let mut stmt = self
            .conn
            .prepare(&format!("{PRODUCT_SELECT_SQL} WHERE product_id = ?1;"))
            .op("products.query_by_id")?;
        let product = stmt
            .query_row([product_id.to_string()], |row| Ok(parse_product_row(row)))
            .optional()
            .op("products.query_by_id")?;

        product.unwrap_or_else(|| Err(not_found(product_id)))
    }

    fn query_by_user_id(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
    ) -> RepoResult<Vec<Product>> {
        ctx.check()?;

        self.select(
            "products.query_by_user_id",
            &format!("{PRODUCT_SELECT_SQL} WHERE user_id = ?1 ORDER BY date_created ASC;"),
            vec![Value::Text(user_id.to_string())],
        )
    }

    fn execute_under_transaction<'tx>(
        &self,
        tx: &'tx dyn TransactionHandle,
    ) -> RepoResult<Box<dyn ProductStorer + 'tx>> {
        let conn = rebind_connection(tx)?;
        Ok(Box::new(SqliteProductStore::new(conn)))
    }
}

fn not_found(product_id: ProductId) -> RepoError {
    RepoError::NotFound {
        entity: "product",
        key: product_id.to_string(),
    }
}

fn filter_clause(filter: &ProductFilter) -> WhereClause {
    let mut clause = WhereClause::default();
    if let Some(product_id) = filter.product_id {
        clause.push("product_id = ?", Value::Text(product_id.to_string()));
    }
    if let Some(name) = &filter.name {
        clause.push_contains("name", name);
    }
    if let Some(cost) = filter.cost {
        clause.push("cost = ?", Value::Real(cost));
    }
    if let Some(quantity) = filter.quantity {
        clause.push("quantity = ?", Value::Integer(i64::from(quantity)));
    }
    clause
}

fn parse_product_row(row: &Row<'_>) -> RepoResult<Product> {
    let product_id_text: String = row.get("product_id")?;
    let user_id_text: String = row.get("user_id")?;
    let quantity: i64 = row.get("quantity")?;

    Ok(Product {
        product_id: parse_uuid(&product_id_text, "products.product_id")?,
        user_id: parse_uuid(&user_id_text, "products.user_id")?,
        name: row.get("name")?,
        cost: row.get("cost")?,
        quantity: u32::try_from(quantity).map_err(|_| {
            RepoError::InvalidData(format!("invalid quantity `{quantity}` in products.quantity"))
        })?,
        date_created: parse_millis(row.get("date_created")?, "products.date_created")?,
        date_updated: parse_millis(row.get("date_updated")?, "products.date_updated")?,
    })
}
