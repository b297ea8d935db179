//! Delivery fabric: live client channels and durable web push.
//!
//! The live registry is a concurrent map keyed by user, so sends never hold a
//! global lock across users. Push delivery tracks per-subscription failure
//! counts and deactivates after three consecutive failures.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use cadence_domain::{NotificationMessage, PushSubscription};
use cadence_storage::PushRepository;

/// One live client connection: messages queued here are forwarded to the
/// socket by its writer task.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    sender: UnboundedSender<String>,
}

impl ClientHandle {
    pub fn new(id: Uuid, sender: UnboundedSender<String>) -> Self {
        Self { id, sender }
    }
}

/// Process-wide registry of live client sessions keyed by user.
#[derive(Default)]
pub struct LiveChannels {
    channels: DashMap<Uuid, Vec<ClientHandle>>,
}

impl LiveChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: Uuid, handle: ClientHandle) {
        self.channels.entry(user_id).or_default().push(handle);
        tracing::info!(user_id = %user_id, "live channel registered");
    }

    pub fn deregister(&self, user_id: Uuid, handle_id: Uuid) {
        if let Some(mut entry) = self.channels.get_mut(&user_id) {
            entry.retain(|h| h.id != handle_id);
            let empty = entry.is_empty();
            drop(entry);
            if empty {
                self.channels.remove_if(&user_id, |_, handles| handles.is_empty());
            }
            tracing::info!(user_id = %user_id, "live channel deregistered");
        }
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.channels.get(&user_id).map(|h| h.len()).unwrap_or(0)
    }

    /// Send to every live handle of one user, dropping handles whose client
    /// side is gone. Returns the number of successful sends.
    pub fn send_to_user(&self, user_id: Uuid, message: &NotificationMessage) -> usize {
        let Ok(payload) = serde_json::to_string(message) else {
            return 0;
        };
        let Some(mut entry) = self.channels.get_mut(&user_id) else {
            return 0;
        };

        let mut sent = 0;
        entry.retain(|handle| match handle.sender.send(payload.clone()) {
            Ok(()) => {
                sent += 1;
                true
            }
            Err(_) => {
                tracing::warn!(user_id = %user_id, "dropping dead live channel");
                false
            }
        });
        sent
    }

    /// Send to every connected user. Returns total successful sends.
    pub fn broadcast(&self, message: &NotificationMessage) -> usize {
        let users: Vec<Uuid> = self.channels.iter().map(|e| *e.key()).collect();
        users
            .into_iter()
            .map(|user_id| self.send_to_user(user_id, message))
            .sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push transport error: {0}")]
    Transport(String),
    #[error("push endpoint rejected the payload: {0}")]
    Rejected(String),
}

/// Outbound web-push transport. The HTTP adapter lives behind this seam so
/// delivery policy stays independent of the wire protocol.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &str,
    ) -> Result<(), PushError>;
}

/// Web-push over HTTP POST to the subscription endpoint.
pub struct WebPushTransport {
    client: reqwest::Client,
    vapid_subject: String,
}

impl WebPushTransport {
    pub fn new(vapid_subject: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            vapid_subject: vapid_subject.to_string(),
        }
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &str,
    ) -> Result<(), PushError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", "60")
            .header("Urgency", "high")
            .header("X-Push-Subject", &self.vapid_subject)
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PushError::Rejected(response.status().to_string()))
        }
    }
}

/// Durable push delivery with failure-count deactivation.
#[derive(Clone)]
pub struct PushDelivery {
    repo: PushRepository,
    transport: Option<Arc<dyn PushTransport>>,
}

impl PushDelivery {
    pub fn new(repo: PushRepository, transport: Option<Arc<dyn PushTransport>>) -> Self {
        Self { repo, transport }
    }

    /// Deliver to every active subscription of the user. Returns the number
    /// of successful sends. Failures increment the per-subscription counter;
    /// the third consecutive failure deactivates the row.
    pub async fn send_to_user(&self, user_id: Uuid, message: &NotificationMessage) -> usize {
        let Some(transport) = &self.transport else {
            tracing::debug!("push transport disabled, skipping push delivery");
            return 0;
        };

        let subscriptions = match self.repo.active_for_user(user_id).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(user_id = %user_id, "failed to load push subscriptions: {}", e);
                return 0;
            }
        };
        if subscriptions.is_empty() {
            return 0;
        }

        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("failed to serialize push payload: {}", e);
                return 0;
            }
        };

        let mut sent = 0;
        for subscription in &subscriptions {
            match transport.deliver(subscription, &payload).await {
                Ok(()) => {
                    if let Err(e) = self.repo.record_success(subscription.id, Utc::now()).await {
                        tracing::error!("failed to record push success: {}", e);
                    }
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        "push delivery failed: {}",
                        e
                    );
                    match self.repo.record_failure(subscription.id).await {
                        Ok((failures, active)) if !active => {
                            tracing::warn!(
                                subscription_id = %subscription.id,
                                failures,
                                "deactivated push subscription after repeated failures"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!("failed to record push failure: {}", e),
                    }
                }
            }
        }
        sent
    }
}
