//! Read-only user summary core.

use super::{CoreError, CoreResult};
use crate::context::RequestContext;
use crate::model::order::OrderBy;
use crate::model::page::Page;
use crate::model::user_summary::{UserSummary, UserSummaryFilter};
use crate::repo::user_summary_repo::UserSummaryStorer;

pub struct UserSummaryCore<S> {
    storer: S,
}

impl<S: UserSummaryStorer> UserSummaryCore<S> {
    pub fn new(storer: S) -> Self {
        Self { storer }
    }

    pub fn query(
        &self,
        ctx: &RequestContext,
        filter: &UserSummaryFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> CoreResult<Vec<UserSummary>> {
        filter.validate().map_err(CoreError::Validation)?;
        self.storer
            .query(ctx, filter, order_by, page)
            .map_err(|err| CoreError::from_repo("user_summary.query", err))
    }

    pub fn count(&self, ctx: &RequestContext, filter: &UserSummaryFilter) -> CoreResult<usize> {
        filter.validate().map_err(CoreError::Validation)?;
        self.storer
            .count(ctx, filter)
            .map_err(|err| CoreError::from_repo("user_summary.count", err))
    }
}
