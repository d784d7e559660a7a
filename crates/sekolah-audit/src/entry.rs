//! Audit entry types

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub(crate) const ANONYMOUS_ID: &str = "anonymous";
pub(crate) const UNKNOWN_NAME: &str = "Unknown";
pub(crate) const GUEST_ROLE: &str = "guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Login,
    Logout,
    DataAccess,
    AdminAction,
}

impl AuditAction {
    pub const ALL: [AuditAction; 4] = [
        AuditAction::Login,
        AuditAction::Logout,
        AuditAction::DataAccess,
        AuditAction::AdminAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::DataAccess => "DATA_ACCESS",
            AuditAction::AdminAction => "ADMIN_ACTION",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown audit action `{}`", s))
    }
}

/// Who performed an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl AuditActor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_ID, UNKNOWN_NAME, GUEST_ROLE)
    }

    /// Build from a user record. Missing fields fall back to the anonymous
    /// actor's values; numeric ids are rendered as text.
    pub fn from_user(user: Option<&Map<String, Value>>) -> Self {
        let Some(user) = user else {
            return Self::anonymous();
        };

        let text = |field: &str| match user.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self {
            id: text("id").unwrap_or_else(|| ANONYMOUS_ID.to_string()),
            name: text("name").unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            role: text("role").unwrap_or_else(|| GUEST_ROLE.to_string()),
        }
    }
}

impl Default for AuditActor {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub description: String,
    pub actor: AuditActor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, description: impl Into<String>, actor: AuditActor) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action,
            description: description.into(),
            actor,
            metadata: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Fixed-width UTC form, so stored timestamps compare correctly as text
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Criteria for [`crate::AuditTrail::entries`]. Unset fields match anything;
/// time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.user_id.as_deref().map_or(true, |id| entry.actor.id == id)
            && self.action.map_or(true, |action| entry.action == action)
            && self.start.map_or(true, |start| entry.timestamp >= start)
            && self.end.map_or(true, |end| entry.timestamp <= end)
    }
}
