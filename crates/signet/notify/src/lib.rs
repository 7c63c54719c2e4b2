//! Notification boundary.
//!
//! The lifecycle controller emits a notification after a transition
//! commits; delivery mechanics live behind [`NotificationDispatcher`]. A
//! delivery failure is the dispatcher's to report and the caller's to log,
//! never grounds to roll a committed transition back.

#![deny(unsafe_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signet_types::{ContractId, Party};
use std::sync::RwLock;
use thiserror::Error;

/// A message to one party, carrying a deep link into the workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub contract_id: ContractId,
    pub party: Party,
    pub link: String,
}

/// Trait for notification delivery adapters.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Deterministic in-memory dispatcher used for tests and webhook-less
/// deployments.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: RwLock<Vec<Notification>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, in order.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .write()
            .map_err(|_| NotifyError::DeliveryFailed("notification log lock poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

/// Webhook dispatcher: POSTs each notification as JSON to one endpoint.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookDispatcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&notification)
            .send()
            .await
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;
        response
            .error_for_status()
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;
        Ok(())
    }
}

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}
