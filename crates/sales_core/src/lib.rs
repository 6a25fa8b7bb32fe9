//! Composable data-access layer for the sales domain.
//!
//! Entity cores sit on top of storer compositions (SQLite store, shared
//! read-through cache, transaction rebinding) and emit domain events for
//! committed writes.

pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod event;
pub mod hash;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use context::{ContextError, RequestContext};
pub use db::tx::{execute_in_transaction, TransactionHandle};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use event::{DomainEvent, EventCore, EventSink};
pub use hash::{Argon2Hasher, HashError, SecretHasher};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::order::{Direction, OrderBy};
pub use model::page::Page;
pub use model::product::{NewProduct, Product, ProductFilter, UpdateProduct};
pub use model::role::Role;
pub use model::user::{Email, NewUser, UpdateEventProjection, UpdateUser, User, UserFilter};
pub use model::user_summary::{UserSummary, UserSummaryFilter};
pub use repo::product_repo::{ProductStorer, SqliteProductStore};
pub use repo::user_cache::{CachedUserStore, UserCache};
pub use repo::user_repo::{SqliteUserStore, UserStorer};
pub use repo::user_summary_repo::{SqliteUserSummaryStore, UserSummaryStorer};
pub use repo::{RepoError, RepoResult};
pub use rusqlite::Connection;
pub use service::product_service::ProductCore;
pub use service::user_service::{PendingCommit, UserCore, UserLookup};
pub use service::user_summary_service::UserSummaryCore;
pub use service::{CoreError, CoreResult};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
