//! User core.
//!
//! # Responsibility
//! - Own user business rules: validation, password hashing, identifier and
//!   timestamp assignment, partial updates.
//! - Emit `UserCreated`/`UserUpdated` events after successful writes.
//! - Rebind onto a request-scoped transaction without touching the cache.
//!
//! # Invariants
//! - `user_id` and `date_created` never change after `create`.
//! - `date_updated` strictly increases on every successful `update`.
//! - A rebound core defers its events and records the users it wrote; both
//!   are handed back with `take_pending_commit`. After commit the caller
//!   passes them to `publish_committed` on the surrounding core, which
//!   invalidates cached copies before publishing.

use super::{next_update_stamp, CoreError, CoreResult, EventOutlet};
use crate::clock::{truncate_to_millis, Clock};
use crate::context::RequestContext;
use crate::db::tx::TransactionHandle;
use crate::event::{DomainEvent, EventSink};
use crate::hash::SecretHasher;
use crate::model::order::OrderBy;
use crate::model::page::Page;
use crate::model::user::{
    created_event, Email, NewUser, UpdateEventProjection, UpdateUser, User, UserFilter, UserId,
};
use crate::repo::user_repo::UserStorer;
use log::{info, warn};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Read access to users for cores of other entities.
pub trait UserLookup {
    fn lookup_user(&self, ctx: &RequestContext, user_id: UserId) -> CoreResult<User>;
}

/// What a rebound core leaves for the surrounding core once its
/// transaction has committed.
#[derive(Debug, Default)]
pub struct PendingCommit {
    events: Vec<DomainEvent>,
    written: Vec<User>,
}

impl PendingCommit {
    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Every user state the transaction wrote or replaced.
    pub fn written(&self) -> &[User] {
        &self.written
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.written.is_empty()
    }
}

/// User façade over any `UserStorer` composition.
pub struct UserCore<S> {
    storer: S,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn SecretHasher>,
    events: EventOutlet,
    projection: UpdateEventProjection,
    /// Set on rebound cores only.
    written: Option<Mutex<Vec<User>>>,
}

impl<S: UserStorer> UserCore<S> {
    /// Creates a core that does not publish events.
    pub fn new(storer: S, clock: Arc<dyn Clock>, hasher: Arc<dyn SecretHasher>) -> Self {
        Self {
            storer,
            clock,
            hasher,
            events: EventOutlet::Disabled,
            projection: UpdateEventProjection::default(),
            written: None,
        }
    }

    /// Publishes events to `sink` right after each successful write.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = EventOutlet::Immediate(sink);
        self
    }

    pub fn with_projection(mut self, projection: UpdateEventProjection) -> Self {
        self.projection = projection;
        self
    }

    pub fn storer(&self) -> &S {
        &self.storer
    }

    pub fn create(&self, ctx: &RequestContext, new_user: NewUser) -> CoreResult<User> {
        new_user.validate().map_err(CoreError::Validation)?;
        let password_hash = self.hasher.hash(&new_user.password)?;
        let now = truncate_to_millis(self.clock.now());

        let user = User {
            user_id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            roles: new_user.roles,
            password_hash,
            department: new_user.department,
            enabled: true,
            date_created: now,
            date_updated: now,
        };

        if let Err(err) = self.storer.create(ctx, &user) {
            warn!("event=user_create module=user_core status=error error={err}");
            return Err(CoreError::from_repo("users.create", err));
        }

        info!(
            "event=user_create module=user_core status=ok user_id={}",
            user.user_id
        );
        self.record_written(&[&user]);
        self.events.emit(created_event(user.user_id));
        Ok(user)
    }

    /// Applies the fields present in `update` onto `current` and persists
    /// the result.
    pub fn update(
        &self,
        ctx: &RequestContext,
        current: &User,
        update: UpdateUser,
    ) -> CoreResult<User> {
        update.validate().map_err(CoreError::Validation)?;

        let mut user = current.clone();
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        if let Some(roles) = &update.roles {
            user.roles = roles.clone();
        }
        if let Some(department) = &update.department {
            user.department = Some(department.clone());
        }
        if let Some(password) = &update.password {
            user.password_hash = self.hasher.hash(password)?;
        }
        if let Some(enabled) = update.enabled {
            user.enabled = enabled;
        }
        user.date_updated = next_update_stamp(self.clock.as_ref(), current.date_updated);

        if let Err(err) = self.storer.update(ctx, &user) {
            warn!(
                "event=user_update module=user_core status=error user_id={} error={err}",
                user.user_id
            );
            return Err(CoreError::from_repo("users.update", err));
        }

        info!(
            "event=user_update module=user_core status=ok user_id={}",
            user.user_id
        );
        self.record_written(&[current, &user]);
        self.events
            .emit(update.updated_event(user.user_id, self.projection));
        Ok(user)
    }

    pub fn delete(&self, ctx: &RequestContext, user: &User) -> CoreResult<()> {
        if let Err(err) = self.storer.delete(ctx, user) {
            warn!(
                "event=user_delete module=user_core status=error user_id={} error={err}",
                user.user_id
            );
            return Err(CoreError::from_repo("users.delete", err));
        }

        info!(
            "event=user_delete module=user_core status=ok user_id={}",
            user.user_id
        );
        self.record_written(&[user]);
        Ok(())
    }

    pub fn query(
        &self,
        ctx: &RequestContext,
        filter: &UserFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> CoreResult<Vec<User>> {
        filter.validate().map_err(CoreError::Validation)?;
        self.storer
            .query(ctx, filter, order_by, page)
            .map_err(|err| CoreError::from_repo("users.query", err))
    }

    pub fn count(&self, ctx: &RequestContext, filter: &UserFilter) -> CoreResult<usize> {
        filter.validate().map_err(CoreError::Validation)?;
        self.storer
            .count(ctx, filter)
            .map_err(|err| CoreError::from_repo("users.count", err))
    }

    pub fn query_by_id(&self, ctx: &RequestContext, user_id: UserId) -> CoreResult<User> {
        self.storer
            .query_by_id(ctx, user_id)
            .map_err(|err| CoreError::from_repo("users.query_by_id", err))
    }

    pub fn query_by_ids(&self, ctx: &RequestContext, user_ids: &[UserId]) -> CoreResult<Vec<User>> {
        self.storer
            .query_by_ids(ctx, user_ids)
            .map_err(|err| CoreError::from_repo("users.query_by_ids", err))
    }

    pub fn query_by_email(&self, ctx: &RequestContext, email: &Email) -> CoreResult<User> {
        self.storer
            .query_by_email(ctx, email)
            .map_err(|err| CoreError::from_repo("users.query_by_email", err))
    }

    /// Verifies `password` for the user registered under `email`.
    ///
    /// Wrong passwords and disabled users both fail with
    /// `AuthenticationFailure`.
    pub fn authenticate(
        &self,
        ctx: &RequestContext,
        email: &Email,
        password: &str,
    ) -> CoreResult<User> {
        let user = self.query_by_email(ctx, email)?;

        if !self.hasher.verify(password, &user.password_hash)? {
            warn!(
                "event=user_authenticate module=user_core status=error user_id={} reason=password",
                user.user_id
            );
            return Err(CoreError::AuthenticationFailure);
        }
        if !user.enabled {
            warn!(
                "event=user_authenticate module=user_core status=error user_id={} reason=disabled",
                user.user_id
            );
            return Err(CoreError::AuthenticationFailure);
        }

        Ok(user)
    }

    /// Builds a core whose storer runs on the connection carried by `tx`.
    ///
    /// The new core bypasses any cache in this core's storer. It holds its
    /// events and the users it wrote until `take_pending_commit` is called.
    pub fn rebind_to_transaction<'tx>(
        &self,
        tx: &'tx dyn TransactionHandle,
    ) -> CoreResult<UserCore<Box<dyn UserStorer + 'tx>>> {
        let storer = self
            .storer
            .execute_under_transaction(tx)
            .map_err(|err| CoreError::from_repo("users.execute_under_transaction", err))?;

        Ok(UserCore {
            storer,
            clock: Arc::clone(&self.clock),
            hasher: Arc::clone(&self.hasher),
            events: EventOutlet::deferred(),
            projection: self.projection,
            written: Some(Mutex::new(Vec::new())),
        })
    }

    /// Drains what a rebound core produced so far. Call it inside the
    /// transaction closure and return the result alongside the commit.
    pub fn take_pending_commit(&self) -> PendingCommit {
        let written = match &self.written {
            Some(written) => {
                std::mem::take(&mut *written.lock().unwrap_or_else(|p| p.into_inner()))
            }
            None => Vec::new(),
        };
        PendingCommit {
            events: self.events.take(),
            written,
        }
    }

    /// Completes a committed transaction of a rebound core: drops cached
    /// copies of the users it wrote, then publishes its events.
    pub fn publish_committed(&self, pending: PendingCommit) {
        if !pending.written.is_empty() {
            self.storer.invalidate_cached(&pending.written);
            info!(
                "event=user_commit module=user_core status=ok invalidated={} events={}",
                pending.written.len(),
                pending.events.len()
            );
        }
        self.events.publish_all(pending.events);
    }

    fn record_written(&self, users: &[&User]) {
        if let Some(written) = &self.written {
            written
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .extend(users.iter().map(|user| (*user).clone()));
        }
    }
}

impl<S: UserStorer> UserLookup for UserCore<S> {
    fn lookup_user(&self, ctx: &RequestContext, user_id: UserId) -> CoreResult<User> {
        self.query_by_id(ctx, user_id)
    }
}
