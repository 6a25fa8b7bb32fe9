#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sales_core::db::tx::TransactionHandle;
use sales_core::model::order::OrderBy;
use sales_core::model::page::Page;
use sales_core::{
    Argon2Hasher, DomainEvent, Email, EventSink, ManualClock, NewUser, RepoError, RepoResult,
    RequestContext, Role, User, UserFilter, UserStorer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const PASSWORD: &str = "gophers";

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(epoch()))
}

pub fn fast_hasher() -> Arc<Argon2Hasher> {
    Arc::new(Argon2Hasher::insecure_fast().unwrap())
}

pub fn email(value: &str) -> Email {
    Email::parse(value).unwrap()
}

pub fn new_user(name: &str, address: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: email(address),
        roles: vec![Role::User],
        department: None,
        password: PASSWORD.to_string(),
        password_confirm: PASSWORD.to_string(),
    }
}

pub fn user(name: &str, address: &str) -> User {
    User {
        user_id: Uuid::new_v4(),
        name: name.to_string(),
        email: email(address),
        roles: vec![Role::User],
        password_hash: b"not-a-real-hash".to_vec(),
        department: None,
        enabled: true,
        date_created: epoch(),
        date_updated: epoch(),
    }
}

/// Backing-call counters of a `CountingUserStore`.
#[derive(Debug, Default)]
pub struct Calls {
    pub create: AtomicUsize,
    pub update: AtomicUsize,
    pub delete: AtomicUsize,
    pub query_by_id: AtomicUsize,
    pub query_by_email: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory `UserStorer` that counts every call reaching it.
#[derive(Default)]
pub struct CountingUserStore {
    users: Mutex<HashMap<Uuid, User>>,
    pub calls: Calls,
    fail_writes: AtomicBool,
}

impl CountingUserStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every following write fail with a backing error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self, user_id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }

    fn write_gate(&self, ctx: &RequestContext, counter: &AtomicUsize) -> RepoResult<()> {
        ctx.check()?;
        counter.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::InvalidData("injected write failure".to_string()));
        }
        Ok(())
    }

    fn not_found(key: String) -> RepoError {
        RepoError::NotFound {
            entity: "user",
            key,
        }
    }
}

impl UserStorer for CountingUserStore {
    fn create(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        self.write_gate(ctx, &self.calls.create)?;
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|existing| existing.user_id == user.user_id || existing.email == user.email)
        {
            return Err(RepoError::DuplicateKey {
                detail: format!("users.email {}", user.email),
            });
        }
        users.insert(user.user_id, user.clone());
        Ok(())
    }

    fn update(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        self.write_gate(ctx, &self.calls.update)?;
        let mut users = self.users.lock().unwrap();
        match users.get_mut(&user.user_id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(Self::not_found(user.user_id.to_string())),
        }
    }

    fn delete(&self, ctx: &RequestContext, user: &User) -> RepoResult<()> {
        self.write_gate(ctx, &self.calls.delete)?;
        match self.users.lock().unwrap().remove(&user.user_id) {
            Some(_) => Ok(()),
            None => Err(Self::not_found(user.user_id.to_string())),
        }
    }

    fn query(
        &self,
        ctx: &RequestContext,
        _filter: &UserFilter,
        _order_by: &OrderBy,
        _page: Page,
    ) -> RepoResult<Vec<User>> {
        ctx.check()?;
        Ok(self.users.lock().unwrap().values().cloned().collect())
    }

    fn count(&self, ctx: &RequestContext, _filter: &UserFilter) -> RepoResult<usize> {
        ctx.check()?;
        Ok(self.users.lock().unwrap().len())
    }

    fn query_by_id(&self, ctx: &RequestContext, user_id: Uuid) -> RepoResult<User> {
        ctx.check()?;
        self.calls.query_by_id.fetch_add(1, Ordering::SeqCst);
        self.stored(user_id)
            .ok_or_else(|| Self::not_found(user_id.to_string()))
    }

    fn query_by_ids(&self, ctx: &RequestContext, user_ids: &[Uuid]) -> RepoResult<Vec<User>> {
        ctx.check()?;
        let users = self.users.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect())
    }

    fn query_by_email(&self, ctx: &RequestContext, email: &Email) -> RepoResult<User> {
        ctx.check()?;
        self.calls.query_by_email.fetch_add(1, Ordering::SeqCst);
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|user| &user.email == email)
            .cloned()
            .ok_or_else(|| Self::not_found(email.to_string()))
    }

    fn execute_under_transaction<'tx>(
        &self,
        _tx: &'tx dyn TransactionHandle,
    ) -> RepoResult<Box<dyn UserStorer + 'tx>> {
        Err(RepoError::InvalidTransactionHandle)
    }
}

/// `EventSink` that keeps every published event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Handle that carries no SQLite connection.
pub struct ForeignHandle;

impl TransactionHandle for ForeignHandle {
    fn sqlite_connection(&self) -> Option<&rusqlite::Connection> {
        None
    }
}
