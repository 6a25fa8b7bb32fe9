//! Read-only storer over the `view_user_summary` aggregate.

use super::sql::{page_binds, parse_uuid, SqlResultExt, WhereClause};
use super::{RepoError, RepoResult};
use crate::context::RequestContext;
use crate::model::order::OrderBy;
use crate::model::page::Page;
use crate::model::user_summary::{
    UserSummary, UserSummaryFilter, ORDER_BY_USER_ID, ORDER_BY_USER_NAME,
};
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::collections::HashMap;

static ORDER_BY_FIELDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (ORDER_BY_USER_ID, "user_id"),
        (ORDER_BY_USER_NAME, "user_name"),
    ])
});

pub trait UserSummaryStorer {
    fn query(
        &self,
        ctx: &RequestContext,
        filter: &UserSummaryFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> RepoResult<Vec<UserSummary>>;
    fn count(&self, ctx: &RequestContext, filter: &UserSummaryFilter) -> RepoResult<usize>;
}

pub struct SqliteUserSummaryStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserSummaryStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserSummaryStorer for SqliteUserSummaryStore<'_> {
    fn query(
        &self,
        ctx: &RequestContext,
        filter: &UserSummaryFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> RepoResult<Vec<UserSummary>> {
        let order_clause = order_by.to_sql_clause(&ORDER_BY_FIELDS)?;
        ctx.check()?;

        let clause = filter_clause(filter);
        let sql = format!(
            "SELECT user_id, user_name, total_count, total_cost
             FROM view_user_summary
             WHERE 1 = 1{}{order_clause} LIMIT ? OFFSET ?",
            clause.sql()
        );
        let (limit, offset) = page_binds(page)?;
        let mut binds = clause.into_binds();
        binds.push(limit);
        binds.push(offset);

        let mut stmt = self.conn.prepare(&sql).op("user_summary.query")?;
        let mut rows = stmt
            .query(params_from_iter(binds))
            .op("user_summary.query")?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next().op("user_summary.query")? {
            summaries.push(parse_summary_row(row)?);
        }

        Ok(summaries)
    }

    fn count(&self, ctx: &RequestContext, filter: &UserSummaryFilter) -> RepoResult<usize> {
        ctx.check()?;

        let clause = filter_clause(filter);
        let sql = format!(
            "SELECT COUNT(1) FROM view_user_summary WHERE 1 = 1{}",
            clause.sql()
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(clause.into_binds()), |row| row.get(0))
            .op("user_summary.count")?;

        usize::try_from(count).map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
    }
}

fn filter_clause(filter: &UserSummaryFilter) -> WhereClause {
    let mut clause = WhereClause::default();
    if let Some(user_id) = filter.user_id {
        clause.push("user_id = ?", Value::Text(user_id.to_string()));
    }
    if let Some(user_name) = &filter.user_name {
        clause.push_contains("user_name", user_name);
    }
    clause
}

fn parse_summary_row(row: &Row<'_>) -> RepoResult<UserSummary> {
    let user_id_text: String = row.get("user_id")?;
    let total_count: i64 = row.get("total_count")?;

    Ok(UserSummary {
        user_id: parse_uuid(&user_id_text, "view_user_summary.user_id")?,
        user_name: row.get("user_name")?,
        total_count: u64::try_from(total_count).map_err(|_| {
            RepoError::InvalidData(format!("negative total_count `{total_count}`"))
        })?,
        total_cost: row.get("total_cost")?,
    })
}
