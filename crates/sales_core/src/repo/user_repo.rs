//! User storer contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the `UserStorer` capability shared by stores and decorators.
//! - Persist users in the `users` table.
//!
//! # Invariants
//! - `update`/`delete` report `NotFound` when no row matched.
//! - Read paths reject invalid persisted state instead of masking it.

use super::sql::{
    bool_to_int, int_to_bool, millis, page_binds, parse_millis, parse_uuid, placeholders,
    SqlResultExt, WhereClause,
};
use super::{rebind_connection, RepoError, RepoResult};
use crate::context::RequestContext;
use crate::db::tx::TransactionHandle;
use crate::model::order::OrderBy;
use crate::model::page::Page;
use crate::model::role::{join_role_list, parse_role_list};
use crate::model::user::{
    Email, User, UserFilter, UserId, ORDER_BY_DATE_CREATED, ORDER_BY_EMAIL, ORDER_BY_ENABLED,
    ORDER_BY_ID, ORDER_BY_NAME,
};
use log::debug;
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::Arc;

const USER_SELECT_SQL: &str = "SELECT
    user_id,
    name,
    email,
    roles,
    password_hash,
    department,
    enabled,
    date_created,
    date_updated
FROM users";

static ORDER_BY_FIELDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (ORDER_BY_ID, "user_id"),
        (ORDER_BY_NAME, "name"),
        (ORDER_BY_EMAIL, "email"),
        (ORDER_BY_ENABLED, "enabled"),
        (ORDER_BY_DATE_CREATED, "date_created"),
    ])
});

/// Persistence capability for users.
///
/// Implemented by the SQLite store and by decorators wrapping any other
/// `UserStorer`.
pub trait UserStorer {
    fn create(&self, ctx: &RequestContext, user: &User) -> RepoResult<()>;
    fn update(&self, ctx: &RequestContext, user: &User) -> RepoResult<()>;
    fn delete(&self, ctx: &RequestContext, user: &User) -> RepoResult<()>;
    fn query(
        &self,
        ctx: &RequestContext,
        filter: &UserFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> RepoResult<Vec<User>>;
    fn count(&self, ctx: &RequestContext, filter: &UserFilter) -> RepoResult<usize>;
    fn query_by_id(&self, ctx: &RequestContext, user_id: UserId) -> RepoResult<User>;
    /// Returns the users that exist; missing ids are skipped silently.
    fn query_by_ids(&self, ctx: &RequestContext, user_ids: &[UserId]) -> RepoResult<Vec<User>>;
    fn query_by_email(&self, ctx: &RequestContext, email: &Email) -> RepoResult<User>;

    /// Builds a storer whose operations run on the connection carried by
    /// `tx`. Decorators delegate to the storer they wrap.
    fn execute_under_transaction<'tx>(
        &self,
        tx: &'tx dyn TransactionHandle,
    ) -> RepoResult<Box<dyn UserStorer + 'tx>>;

    /// Drops cached copies of `users` after they were written through a
    /// storer built by `execute_under_transaction`. No-op for uncached
    /// storers.
    fn invalidate_cached(&self, _users: &[User]) {}
}

macro_rules! forward_user_storer {
    ($($ptr:ident),+) => {$(
        impl<S: UserStorer + ?Sized> UserStorer for $ptr<S> {
            fn create(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
                (**self).create(ctx, user)
            }
            fn update(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
                (**self).update(ctx, user)
            }
            fn delete(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
                (**self).delete(ctx, user)
            }
            fn query(
                &self,
                ctx: &RequestContext,
                filter: &UserFilter,
                order_by: &OrderBy,
                page: Page,
            ) -> RepoResult<Vec<User>> {
                (**self).query(ctx, filter, order_by, page)
            }
            fn count(&self, ctx: &RequestContext, filter: &UserFilter) -> RepoResult<usize> {
                (**self).count(ctx, filter)
            }
            fn query_by_id(&self, ctx: &RequestContext, user_id: UserId) -> RepoResult<User> {
                (**self).query_by_id(ctx, user_id)
            }
            fn query_by_ids(
                &self,
                ctx: &RequestContext,
                user_ids: &[UserId],
            ) -> RepoResult<Vec<User>> {
                (**self).query_by_ids(ctx, user_ids)
            }
            fn query_by_email(&self, ctx: &RequestContext, email: &Email) -> RepoResult<User> {
                (**self).query_by_email(ctx, email)
            }
            fn execute_under_transaction<'tx>(
                &self,
                tx: &'tx dyn TransactionHandle,
            ) -> RepoResult<Box<dyn UserStorer + 'tx>> {
                (**self).execute_under_transaction(tx)
            }
            fn invalidate_cached(&self, users: &[User]) {
                (**self).invalidate_cached(users)
            }
        }
    )+};
}

forward_user_storer!(Box, Arc);

/// SQLite-backed user store.
pub struct SqliteUserStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserStorer for SqliteUserStore<'_> {
    fn create(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        ctx.check()?;

        self.conn
            .execute(
                "INSERT INTO users (
                    user_id,
                    name,
                    email,
                    roles,
                    password_hash,
                    department,
                    enabled,
                    date_created,
                    date_updated
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
                params![
                    user.user_id.to_string(),
                    user.name.as_str(),
                    user.email.as_str(),
                    join_role_list(&user.roles),
                    user.password_hash.as_slice(),
                    user.department.as_deref(),
                    bool_to_int(user.enabled),
                    millis(user.date_created),
                    millis(user.date_updated),
                ],
            )
            .op("users.create")?;

        debug!(
            "event=user_store_create module=repo status=ok user_id={}",
            user.user_id
        );
        Ok(())
    }

    fn update(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        ctx.check()?;

        let changed = self
            .conn
            .execute(
                "UPDATE users
                 SET
                    name = ?1,
                    email = ?2,
                    roles = ?3,
                    password_hash = ?4,
                    department = ?5,
                    enabled = ?6,
                    date_updated = ?7
                 WHERE user_id = ?8;",
                params![
                    user.name.as_str(),
                    user.email.as_str(),
                    join_role_list(&user.roles),
                    user.password_hash.as_slice(),
                    user.department.as_deref(),
                    bool_to_int(user.enabled),
                    millis(user.date_updated),
                    user.user_id.to_string(),
                ],
            )
            .op("users.update")?;

        if changed == 0 {
            return Err(not_found(user.user_id.to_string()));
        }

        debug!(
            "event=user_store_update module=repo status=ok user_id={}",
            user.user_id
        );
        Ok(())
    }

    fn delete(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        ctx.check()?;

        let changed = self
            .conn
            .execute(
                "DELETE FROM users WHERE user_id = ?1;",
                [user.user_id.to_string()],
            )
            .op("users.delete")?;

        if changed == 0 {
            return Err(not_found(user.user_id.to_string()));
        }

        debug!(
            "event=user_store_delete module=repo status=ok user_id={}",
            user.user_id
        );
        Ok(())
    }

    fn query(
        &self,
        ctx: &RequestContext,
        filter: &UserFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> RepoResult<Vec<User>> {
        let order_clause = order_by.to_sql_clause(&ORDER_BY_FIELDS)?;
        ctx.check()?;

        let clause = filter_clause(filter);
        let sql = format!(
            "{USER_SELECT_SQL} WHERE 1 = 1{}{order_clause} LIMIT ? OFFSET ?",
            clause.sql()
        );
        let (limit, offset) = page_binds(page)?;
        let mut binds = clause.into_binds();
        binds.push(limit);
        binds.push(offset);

        let mut stmt = self.conn.prepare(&sql).op("users.query")?;
        let mut rows = stmt.query(params_from_iter(binds)).op("users.query")?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().op("users.query")? {
            users.push(parse_user_row(row)?);
        }

        Ok(users)
    }

    fn count(&self, ctx: &RequestContext, filter: &UserFilter) -> RepoResult<usize> {
        ctx.check()?;

        let clause = filter_clause(filter);
        let sql = format!("SELECT COUNT(1) FROM users WHERE 1 = 1{}", clause.sql());
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(clause.into_binds()), |row| row.get(0))
            .op("users.count")?;

        usize::try_from(count).map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
    }

    fn query_by_id(&self, ctx: &RequestContext, user_id: UserId) -> RepoResult<User> {
        ctx.check()?;

        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE user_id = ?1;"))
            .op("users.query_by_id")?;
        let user = stmt
            .query_row([user_id.to_string()], |row| Ok(parse_user_row(row)))
            .optional()
            .op("users.query_by_id")?;

        match user {
            Some(user) => user,
            None => Err(not_found(user_id.to_string())),
        }
    }

    fn query_by_ids(&self, ctx: &RequestContext, user_ids: &[UserId]) -> RepoResult<Vec<User>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        ctx.check()?;

        let sql = format!(
            "{USER_SELECT_SQL} WHERE user_id IN ({}) ORDER BY user_id ASC;",
            placeholders(user_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql).op("users.query_by_ids")?;
        let mut rows = stmt
            .query(params_from_iter(user_ids.iter().map(|id| id.to_string())))
            .op("users.query_by_ids")?;
        let mut users = Vec::with_capacity(user_ids.len());
        while let Some(row) = rows.next().op("users.query_by_ids")? {
            users.push(parse_user_row(row)?);
        }

        Ok(users)
    }

    fn query_by_email(&self, ctx: &RequestContext, email: &Email) -> RepoResult<User> {
        ctx.check()?;

        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE email = ?1;"))
            .op("users.query_by_email")?;
        let user = stmt
            .query_row([email.as_str()], |row| Ok(parse_user_row(row)))
            .optional()
            .op("users.query_by_email")?;

        match user {
            Some(user) => user,
            None => Err(not_found(email.to_string())),
        }
    }

    fn execute_under_transaction<'tx>(
        &self,
        tx: &'tx dyn TransactionHandle,
    ) -> RepoResult<Box<dyn UserStorer + 'tx>> {
        let conn = rebind_connection(tx)?;
        Ok(Box::new(SqliteUserStore::new(conn)))
    }
}

fn not_found(key: String) -> RepoError {
    RepoError::NotFound {
        entity: "user",
        key,
    }
}

fn filter_clause(filter: &UserFilter) -> WhereClause {
    let mut clause = WhereClause::default();
    if let Some(user_id) = filter.user_id {
        clause.push("user_id = ?", Value::Text(user_id.to_string()));
    }
    if let Some(name) = &filter.name {
        clause.push_contains("name", name);
    }
    if let Some(email) = &filter.email {
        clause.push("email = ?", Value::Text(email.to_string()));
    }
    if let Some(start) = filter.start_created_date {
        clause.push("date_created >= ?", Value::Integer(millis(start)));
    }
    if let Some(end) = filter.end_created_date {
        clause.push("date_created <= ?", Value::Integer(millis(end)));
    }
    clause
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let user_id_text: String = row.get("user_id")?;
    let email_text: String = row.get("email")?;
    let roles_text: String = row.get("roles")?;

    let email = Email::parse(&email_text).map_err(|err| {
        RepoError::InvalidData(format!("{err} in users.email"))
    })?;
    let roles = parse_role_list(&roles_text)
        .map_err(|err| RepoError::InvalidData(format!("{err} in users.roles")))?;

    Ok(User {
        user_id: parse_uuid(&user_id_text, "users.user_id")?,
        name: row.get("name")?,
        email,
        roles,
        password_hash: row.get("password_hash")?,
        department: row.get("department")?,
        enabled: int_to_bool(row.get("enabled")?, "users.enabled")?,
        date_created: parse_millis(row.get("date_created")?, "users.date_created")?,
        date_updated: parse_millis(row.get("date_updated")?, "users.date_updated")?,
    })
}
