//! User domain model.
//!
//! # Responsibility
//! - Define the `User` record and its create/update descriptors.
//! - Define the validated `Email` secondary key and the user query filter.
//! - Build the `UserCreated`/`UserUpdated` domain events.
//!
//! # Invariants
//! - `user_id` is assigned once by `UserCore::create` and never changes.
//! - `email` is unique across users and always in normalized form.
//! - `UpdateUser` fields set to `None` leave the current value untouched.

use crate::event::DomainEvent;
use crate::model::role::Role;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

pub type UserId = Uuid;

pub const EVENT_SOURCE: &str = "user";
pub const EVENT_CREATED: &str = "UserCreated";
pub const EVENT_UPDATED: &str = "UserUpdated";

pub const ORDER_BY_ID: &str = "user_id";
pub const ORDER_BY_NAME: &str = "name";
pub const ORDER_BY_EMAIL: &str = "email";
pub const ORDER_BY_ENABLED: &str = "enabled";
pub const ORDER_BY_DATE_CREATED: &str = "date_created";

const MIN_FILTER_NAME_CHARS: usize = 3;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid email address `{0}`")]
pub struct InvalidEmail(pub String);

/// Normalized e-mail address used as the user's secondary unique key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(value: &str) -> Result<Self, InvalidEmail> {
        let normalized = value.trim().to_lowercase();
        if !EMAIL_RE.is_match(&normalized) {
            return Err(InvalidEmail(value.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = InvalidEmail;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: UserId,
    pub name: String,
    pub email: Email,
    pub roles: Vec<Role>,
    pub password_hash: Vec<u8>,
    pub department: Option<String>,
    pub enabled: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub roles: Vec<Role>,
    pub department: Option<String>,
    pub password: String,
    pub password_confirm: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.roles.is_empty() {
            return Err("at least one role is required".to_string());
        }
        if self.password.is_empty() {
            return Err("password must not be empty".to_string());
        }
        if self.password != self.password_confirm {
            return Err("password and confirmation do not match".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<Email>,
    pub roles: Option<Vec<Role>>,
    pub department: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
    pub enabled: Option<bool>,
}

impl UpdateUser {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("name must not be empty".to_string());
            }
        }
        if let Some(roles) = &self.roles {
            if roles.is_empty() {
                return Err("at least one role is required".to_string());
            }
        }
        if let Some(password) = &self.password {
            if password.is_empty() {
                return Err("password must not be empty".to_string());
            }
            if self.password_confirm.as_deref() != Some(password.as_str()) {
                return Err("password and confirmation do not match".to_string());
            }
        }
        Ok(())
    }

    /// Builds the `UserUpdated` event for `user_id`.
    ///
    /// `projection` selects which changed fields are carried; the password is
    /// never part of the payload.
    pub fn updated_event(
        &self,
        user_id: UserId,
        projection: UpdateEventProjection,
    ) -> Result<DomainEvent, serde_json::Error> {
        let params = match projection {
            UpdateEventProjection::EnablementOnly => UserUpdatedParams {
                user_id,
                enabled: self.enabled,
                ..UserUpdatedParams::new(user_id)
            },
            UpdateEventProjection::AllChanged => UserUpdatedParams {
                user_id,
                name: self.name.clone(),
                email: self.email.clone(),
                roles: self.roles.clone(),
                department: self.department.clone(),
                enabled: self.enabled,
            },
        };
        DomainEvent::new(EVENT_SOURCE, EVENT_UPDATED, &params)
    }
}

/// Which changed fields a `UserUpdated` event carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateEventProjection {
    /// Only the enablement status.
    #[default]
    EnablementOnly,
    /// Every changed field except secrets.
    AllChanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreatedParams {
    #[serde(rename = "userID")]
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdatedParams {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<Email>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub roles: Option<Vec<Role>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub enabled: Option<bool>,
}

impl UserUpdatedParams {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            name: None,
            email: None,
            roles: None,
            department: None,
            enabled: None,
        }
    }
}

pub fn created_event(user_id: UserId) -> Result<DomainEvent, serde_json::Error> {
    DomainEvent::new(EVENT_SOURCE, EVENT_CREATED, &UserCreatedParams { user_id })
}

/// Optional-field query filter; all fields absent matches every user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub user_id: Option<UserId>,
    /// Substring match on `name`.
    pub name: Option<String>,
    pub email: Option<Email>,
    pub start_created_date: Option<DateTime<Utc>>,
    pub end_created_date: Option<DateTime<Utc>>,
}

impl UserFilter {
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: Email) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_start_created_date(mut self, start: DateTime<Utc>) -> Self {
        self.start_created_date = Some(start);
        self
    }

    pub fn with_end_created_date(mut self, end: DateTime<Utc>) -> Self {
        self.end_created_date = Some(end);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            if name.chars().count() < MIN_FILTER_NAME_CHARS {
                return Err(format!(
                    "name filter must have at least {MIN_FILTER_NAME_CHARS} characters"
                ));
            }
        }
        if let (Some(start), Some(end)) = (self.start_created_date, self.end_created_date) {
            if start > end {
                return Err("start_created_date is after end_created_date".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Email, NewUser, UpdateEventProjection, UpdateUser, UserFilter};
    use crate::model::role::Role;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn email_is_normalized_and_validated() {
        let email = Email::parse("  Bill@Example.COM ").expect("valid email");
        assert_eq!(email.as_str(), "bill@example.com");
        assert!(Email::parse("not-an-email").is_err());
        assert!(Email::parse("a b@x.com").is_err());
        assert!(Email::parse("a@nodot").is_err());
    }

    #[test]
    fn empty_filter_is_valid() {
        assert!(UserFilter::default().validate().is_ok());
    }

    #[test]
    fn filter_rejects_short_name_and_inverted_range() {
        assert!(UserFilter::default().with_name("ab").validate().is_err());
        assert!(UserFilter::default().with_name("abc").validate().is_ok());

        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).single().expect("valid timestamp");
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid timestamp");
        let filter = UserFilter::default()
            .with_start_created_date(start)
            .with_end_created_date(end);
        assert!(filter.validate().is_err());
    }

    #[test]
    fn new_user_requires_matching_password() {
        let new_user = NewUser {
            name: "Bill".to_string(),
            email: Email::parse("bill@example.com").expect("valid email"),
            roles: vec![Role::User],
            department: None,
            password: "secret".to_string(),
            password_confirm: "other".to_string(),
        };
        assert!(new_user.validate().is_err());
    }

    #[test]
    fn enablement_projection_omits_other_fields() {
        let update = UpdateUser {
            name: Some("Renamed".to_string()),
            enabled: Some(false),
            ..UpdateUser::default()
        };
        let user_id = Uuid::new_v4();

        let narrow = update
            .updated_event(user_id, UpdateEventProjection::EnablementOnly)
            .expect("encode event")
            .params_json()
            .expect("decode params");
        assert_eq!(narrow["enabled"], false);
        assert!(narrow.get("name").is_none());
        assert_eq!(narrow["userID"], user_id.to_string());

        let full = update
            .updated_event(user_id, UpdateEventProjection::AllChanged)
            .expect("encode event")
            .params_json()
            .expect("decode params");
        assert_eq!(full["name"], "Renamed");
        assert_eq!(full["enabled"], false);
    }
}
