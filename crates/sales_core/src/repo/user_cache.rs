//! Read-through cache decorator for user storers.
//!
//! # Responsibility
//! - Serve point lookups (`query_by_id`, `query_by_email`) from a
//!   process-wide, time-bounded cache shared by every decorator instance.
//! - Keep the cache coherent with writes made through the decorator.
//!
//! # Invariants
//! - A user is indexed under every unique key it is reachable by
//!   (`id:<uuid>` and `email:<address>`); writes populate or evict all of
//!   them in one critical section.
//! - The cache is mutated only after the backing call succeeded.
//! - Backing I/O never runs while the cache lock is held.
//! - Expired entries are never returned; they are evicted when detected.
//! - Transactional storers bypass the cache entirely; the users they wrote
//!   are invalidated through `invalidate_cached` once the transaction
//!   commits.
//! - A read-through fill never replaces an entry written, or an eviction
//!   made, after the fill's backing read began.

use super::user_repo::UserStorer;
use super::RepoResult;
use crate::clock::Clock;
use crate::context::RequestContext;
use crate::db::tx::TransactionHandle;
use crate::model::order::OrderBy;
use crate::model::page::Page;
use crate::model::user::{Email, User, UserFilter, UserId};
use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Default time-to-live for cached users.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    user: User,
    inserted_at: DateTime<Utc>,
    ttl: TimeDelta,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.inserted_at) > self.ttl
    }
}

/// Shared cache state for users.
///
/// Constructed once per process and handed to every `CachedUserStore` that
/// should observe the same entries.
pub struct UserCache {
    state: RwLock<CacheState>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Bumped on every eviction; read-through fills that began before an
    /// eviction are dropped.
    evictions: u64,
}

/// Eviction count observed before a read-through backing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FillTicket(u64);

impl UserCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    /// Number of live keys, expired or not (two per cached user).
    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().entries.is_empty()
    }

    /// Whether `user_id` currently has an entry, without expiry handling.
    pub fn contains_id(&self, user_id: UserId) -> bool {
        self.read_state().entries.contains_key(&id_key(user_id))
    }

    /// Whether `email` currently has an entry, without expiry handling.
    pub fn contains_email(&self, email: &Email) -> bool {
        self.read_state().entries.contains_key(&email_key(email))
    }

    /// Drops every key `user` may be cached under: its id, its email, and
    /// the email of the cached copy when that differs.
    pub fn invalidate(&self, user: &User) {
        let mut state = self.write_state();
        state.evictions += 1;
        if let Some(previous) = state.entries.remove(&id_key(user.user_id)) {
            state.entries.remove(&email_key(&previous.user.email));
        }
        state.entries.remove(&email_key(&user.email));
        debug!(
            "event=cache_evict module=user_cache status=ok user_id={}",
            user.user_id
        );
    }

    /// Removes every expired entry; returns the number of keys removed.
    ///
    /// Expiry is otherwise detected lazily on read, so callers with many
    /// short-lived keys can run this periodically.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.write_state();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();
        debug!("event=cache_purge module=user_cache status=ok removed={removed}");
        removed
    }

    pub fn clear(&self) {
        let mut state = self.write_state();
        state.evictions += 1;
        state.entries.clear();
    }

    fn read(&self, key: &str) -> Option<User> {
        let now = self.clock.now();
        {
            let state = self.read_state();
            match state.entries.get(key) {
                None => {
                    debug!("event=cache_miss module=user_cache status=ok key={key}");
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    debug!("event=cache_hit module=user_cache status=ok key={key}");
                    return Some(entry.user.clone());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a writer may have refreshed the key
        // between the two lock acquisitions.
        let mut state = self.write_state();
        if state
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now))
        {
            state.entries.remove(key);
            debug!("event=cache_expire module=user_cache status=ok key={key}");
        }
        None
    }

    /// Stores `user` after a successful write through the decorator.
    fn write(&self, user: &User) {
        let entry = self.entry_for(user);
        let mut state = self.write_state();
        insert_entry(&mut state.entries, entry);
        debug!(
            "event=cache_write module=user_cache status=ok user_id={}",
            user.user_id
        );
    }

    fn fill_ticket(&self) -> FillTicket {
        FillTicket(self.read_state().evictions)
    }

    /// Stores `user` loaded by a read-through miss, unless the cache changed
    /// for it since `ticket` was taken.
    fn fill(&self, user: &User, ticket: FillTicket) {
        let entry = self.entry_for(user);
        let now = entry.inserted_at;
        let mut state = self.write_state();

        let fresh = |key: &str| {
            state
                .entries
                .get(key)
                .is_some_and(|existing| !existing.is_expired(now))
        };
        let superseded = state.evictions != ticket.0
            || fresh(&id_key(user.user_id))
            || fresh(&email_key(&user.email));
        if superseded {
            debug!(
                "event=cache_fill module=user_cache status=skipped user_id={}",
                user.user_id
            );
            return;
        }

        insert_entry(&mut state.entries, entry);
        debug!(
            "event=cache_fill module=user_cache status=ok user_id={}",
            user.user_id
        );
    }

    fn entry_for(&self, user: &User) -> CacheEntry {
        CacheEntry {
            user: user.clone(),
            inserted_at: self.clock.now(),
            ttl: self.ttl,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}

/// Indexes `entry` under both keys, dropping the key of a previous email.
fn insert_entry(entries: &mut HashMap<String, CacheEntry>, entry: CacheEntry) {
    let by_id = id_key(entry.user.user_id);
    let by_email = email_key(&entry.user.email);
    let stale_email = entries
        .get(&by_id)
        .filter(|previous| previous.user.email != entry.user.email)
        .map(|previous| email_key(&previous.user.email));
    if let Some(stale_email) = stale_email {
        entries.remove(&stale_email);
    }
    entries.insert(by_id, entry.clone());
    entries.insert(by_email, entry);
}

fn id_key(user_id: UserId) -> String {
    format!("id:{user_id}")
}

fn email_key(email: &Email) -> String {
    format!("email:{email}")
}

/// `UserStorer` decorator that fronts `S` with a shared `UserCache`.
pub struct CachedUserStore<S> {
    storer: S,
    cache: Arc<UserCache>,
}

impl<S: UserStorer> CachedUserStore<S> {
    pub fn new(storer: S, cache: Arc<UserCache>) -> Self {
        Self { storer, cache }
    }

    pub fn cache(&self) -> &Arc<UserCache> {
        &self.cache
    }
}

impl<S: UserStorer> UserStorer for CachedUserStore<S> {
    fn create(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        self.storer.create(ctx, user)?;
        self.cache.write(user);
        Ok(())
    }

    fn update(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        self.storer.update(ctx, user)?;
        self.cache.write(user);
        Ok(())
    }

    fn delete(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        self.storer.delete(ctx, user)?;
        self.cache.invalidate(user);
        Ok(())
    }

    fn query(
        &self,
        ctx: &RequestContext,
        filter: &UserFilter,
        order_by: &OrderBy,
        page: Page,
    ) -> RepoResult<Vec<User>> {
        self.storer.query(ctx, filter, order_by, page)
    }

    fn count(&self, ctx: &RequestContext, filter: &UserFilter) -> RepoResult<usize> {
        self.storer.count(ctx, filter)
    }

    fn query_by_id(&self, ctx: &RequestContext, user_id: UserId) -> RepoResult<User> {
        let ticket = self.cache.fill_ticket();
        if let Some(user) = self.cache.read(&id_key(user_id)) {
            return Ok(user);
        }

        let user = self.storer.query_by_id(ctx, user_id)?;
        self.cache.fill(&user, ticket);
        Ok(user)
    }

    fn query_by_ids(&self, ctx: &RequestContext, user_ids: &[UserId]) -> RepoResult<Vec<User>> {
        self.storer.query_by_ids(ctx, user_ids)
    }

    fn query_by_email(&self, ctx: &RequestContext, email: &Email) -> RepoResult<User> {
        let ticket = self.cache.fill_ticket();
        if let Some(user) = self.cache.read(&email_key(email)) {
            return Ok(user);
        }

        let user = self.storer.query_by_email(ctx, email)?;
        self.cache.fill(&user, ticket);
        Ok(user)
    }

    fn execute_under_transaction<'tx>(
        &self,
        tx: &'tx dyn TransactionHandle,
    ) -> RepoResult<Box<dyn UserStorer + 'tx>> {
        self.storer.execute_under_transaction(tx)
    }

    fn invalidate_cached(&self, users: &[User]) {
        for user in users {
            self.cache.invalidate(user);
        }
        self.storer.invalidate_cached(users);
    }
}
