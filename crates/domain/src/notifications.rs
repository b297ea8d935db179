//! Notification and push subscription types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Escalation level for checkout reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// 5-minute warning before the planned checkout.
    Light,
    /// Checkout time reached.
    Strong,
    /// 10+ minutes past the planned checkout.
    Overdue,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Light => "light",
            NotificationLevel::Strong => "strong",
            NotificationLevel::Overdue => "overdue",
        }
    }
}

/// Message delivered over the live channel and as a push payload. Clients
/// dedupe on `id`; delivery is at-least-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub message_type: String,
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
    pub session_id: Uuid,
    pub action_url: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable web-push subscription. Deactivated after three consecutive
/// delivery failures.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub active: bool,
    pub failure_count: i32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Web-push key material supplied by the browser.
#[derive(Debug, Deserialize, Validate)]
pub struct PushKeys {
    #[validate(length(min = 1))]
    pub p256dh: String,
    #[validate(length(min = 1))]
    pub auth: String,
}

/// Register or refresh a push subscription.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterPushRequest {
    #[validate(length(min = 1, max = 2000))]
    pub endpoint: String,
    #[validate(nested)]
    pub keys: PushKeys,
    #[validate(length(max = 500))]
    pub user_agent: Option<String>,
    #[validate(length(max = 50))]
    pub device_type: Option<String>,
}

/// Deactivate a push subscription by endpoint.
#[derive(Debug, Deserialize, Validate)]
pub struct UnregisterPushRequest {
    #[validate(length(min = 1, max = 2000))]
    pub endpoint: String,
}
