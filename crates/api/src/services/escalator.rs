//! Checkout notification escalator.
//!
//! A periodic scan over active sessions emits at most one of LIGHT, STRONG or
//! OVERDUE per session per deadline epoch. Flags are delivery intent and are
//! committed before the send, so delivery is at-least-once and clients dedupe
//! on the notification id.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use cadence_domain::{NotificationLevel, NotificationMessage, WorkSession};
use cadence_storage::SessionRepository;

use crate::services::delivery::{LiveChannels, PushDelivery};

/// LIGHT fires within this window before the deadline.
pub const WARN_WINDOW: Duration = Duration::minutes(5);
/// OVERDUE fires (and the session is marked unresponsive) this long past the
/// deadline.
pub const UNRESPONSIVE_AFTER: Duration = Duration::minutes(10);

/// Decide which escalation level, if any, a session needs at `now`.
pub fn classify(session: &WorkSession, now: DateTime<Utc>) -> Option<NotificationLevel> {
    let deadline = session.planned_checkout_at;

    if deadline <= now - UNRESPONSIVE_AFTER {
        return (!session.notification_overdue_sent).then_some(NotificationLevel::Overdue);
    }
    if deadline <= now {
        return (!session.notification_checkout_sent).then_some(NotificationLevel::Strong);
    }
    if deadline <= now + WARN_WINDOW && !session.notification_5min_sent {
        return Some(NotificationLevel::Light);
    }
    None
}

/// Build the wire message for one escalation.
pub fn build_message(
    level: NotificationLevel,
    session_id: Uuid,
    task_title: Option<&str>,
    now: DateTime<Utc>,
) -> NotificationMessage {
    let task = task_title.unwrap_or("your task");
    let (title, body) = match level {
        NotificationLevel::Light => (
            "Checkout in 5 minutes".to_string(),
            format!("Checkout time is coming up. Wrap up your work on {task}."),
        ),
        NotificationLevel::Strong => (
            "Checkout time".to_string(),
            format!("It is time to check out. Reflect on your work on {task}."),
        ),
        NotificationLevel::Overdue => (
            "Session overdue".to_string(),
            "Your session is past its planned checkout. Please check out now.".to_string(),
        ),
    };

    NotificationMessage {
        id: Uuid::new_v4(),
        message_type: "notification".to_string(),
        level,
        title,
        body,
        session_id,
        action_url: "/runner".to_string(),
        timestamp: now,
    }
}

#[derive(Clone)]
pub struct Escalator {
    sessions: SessionRepository,
    live_channels: Arc<LiveChannels>,
    push: PushDelivery,
}

impl Escalator {
    pub fn new(
        sessions: SessionRepository,
        live_channels: Arc<LiveChannels>,
        push: PushDelivery,
    ) -> Self {
        Self {
            sessions,
            live_channels,
            push,
        }
    }

    /// One scan: classify every active session and deliver what is due.
    pub async fn tick(&self) {
        let rows = match self.sessions.active_with_task_titles().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("escalator scan failed: {}", e);
                return;
            }
        };

        let now = Utc::now();
        for row in rows {
            let Some(level) = classify(&row.session, now) else {
                continue;
            };
            self.escalate(&row.session, &row.task_title, level, now)
                .await;
        }
    }

    async fn escalate(
        &self,
        session: &WorkSession,
        task_title: &str,
        level: NotificationLevel,
        now: DateTime<Utc>,
    ) {
        // Commit intent before sending; a crash after this point means the
        // level is considered sent and will not repeat within this epoch.
        if let Err(e) = self.sessions.mark_level_sent(session.id, level, now).await {
            tracing::error!(session_id = %session.id, "failed to mark notification flag: {}", e);
            return;
        }
        if level == NotificationLevel::Overdue {
            match self.sessions.mark_unresponsive(session.id, now).await {
                Ok(true) => {
                    tracing::info!(session_id = %session.id, "session marked unresponsive")
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(session_id = %session.id, "failed to mark unresponsive: {}", e)
                }
            }
        }

        let message = build_message(level, session.id, Some(task_title), now);
        let live_sent = self.live_channels.send_to_user(session.user_id, &message);

        // LIGHT is advisory: live channel only. STRONG and OVERDUE always
        // fan out to push as well.
        let push_sent = match level {
            NotificationLevel::Light => 0,
            NotificationLevel::Strong | NotificationLevel::Overdue => {
                self.push.send_to_user(session.user_id, &message).await
            }
        };

        tracing::info!(
            session_id = %session.id,
            level = level.as_str(),
            live_sent,
            push_sent,
            "checkout notification escalated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(deadline: DateTime<Utc>) -> WorkSession {
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap();
        WorkSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            started_at: now - Duration::hours(1),
            planned_checkout_at: deadline,
            planned_outcome: None,
            paused_at: None,
            total_paused_seconds: 0,
            ended_at: None,
            checkout_type: None,
            decision: None,
            continue_reason: None,
            kpt_keep: None,
            kpt_problem: None,
            kpt_try: None,
            remaining_estimate_hours: None,
            snooze_count: 0,
            last_snooze_at: None,
            notification_5min_sent: false,
            notification_checkout_sent: false,
            notification_overdue_sent: false,
            marked_unresponsive_at: None,
            created_at: now - Duration::hours(1),
            updated_at: now - Duration::hours(1),
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, m, 0).unwrap()
    }

    #[test]
    fn light_fires_inside_the_warning_window() {
        let s = session(at(12, 3));
        assert_eq!(classify(&s, at(12, 0)), Some(NotificationLevel::Light));
    }

    #[test]
    fn nothing_fires_before_the_warning_window() {
        let s = session(at(12, 10));
        assert_eq!(classify(&s, at(12, 0)), None);
    }

    #[test]
    fn strong_fires_at_the_deadline() {
        let s = session(at(12, 0));
        assert_eq!(classify(&s, at(12, 0)), Some(NotificationLevel::Strong));
    }

    #[test]
    fn strong_takes_priority_over_light_when_past_deadline() {
        let s = session(at(11, 58));
        assert_eq!(classify(&s, at(12, 0)), Some(NotificationLevel::Strong));
    }

    #[test]
    fn overdue_fires_ten_minutes_past_deadline() {
        let s = session(at(11, 49));
        assert_eq!(classify(&s, at(12, 0)), Some(NotificationLevel::Overdue));
    }

    #[test]
    fn each_level_fires_at_most_once_per_epoch() {
        let mut s = session(at(11, 49));
        s.notification_overdue_sent = true;
        assert_eq!(classify(&s, at(12, 0)), None);

        let mut s = session(at(11, 58));
        s.notification_checkout_sent = true;
        assert_eq!(classify(&s, at(12, 0)), None);

        let mut s = session(at(12, 3));
        s.notification_5min_sent = true;
        assert_eq!(classify(&s, at(12, 0)), None);
    }

    #[test]
    fn snooze_reset_restarts_the_escalation() {
        // LIGHT already sent for the old deadline; a snooze clears the flags
        // and moves the deadline, so LIGHT fires again 3 minutes before the
        // new one.
        let mut s = session(at(12, 0));
        s.notification_5min_sent = true;
        assert_eq!(classify(&s, at(11, 57)), None);

        s.planned_checkout_at = at(12, 5);
        s.notification_5min_sent = false;
        s.notification_checkout_sent = false;
        s.notification_overdue_sent = false;
        assert_eq!(classify(&s, at(12, 2)), Some(NotificationLevel::Light));
    }

    #[test]
    fn overdue_session_with_flag_sent_never_regresses_to_strong() {
        let mut s = session(at(11, 45));
        s.notification_overdue_sent = true;
        // 15 minutes past deadline, overdue already sent: silence, not STRONG.
        assert_eq!(classify(&s, at(12, 0)), None);
    }
}
