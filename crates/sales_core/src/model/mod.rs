//! Domain model for the sales entities.
//!
//! # Responsibility
//! - Define plain records (`User`, `Product`, `UserSummary`) and their
//!   create/update descriptors.
//! - Define query shapes shared by storers and cores (`OrderBy`, `Page`).
//!
//! # Invariants
//! - Identity keys are assigned by entity cores, never by callers or stores.
//! - Closed value sets (`Role`, `Direction`) are validated at parse time.

pub mod order;
pub mod page;
pub mod product;
pub mod role;
pub mod user;
pub mod user_summary;
