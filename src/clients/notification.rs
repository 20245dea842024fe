//! # Notification Client
//!
//! Best-effort dispatch to the notification service. A notification outage
//! must never fail the business operation that triggered it, so the fallback
//! is a success-shaped receipt reporting zero notifications processed.

use super::transport::HttpTransport;
use crate::constants::dependencies;
use crate::context::CallContext;
use crate::resilience::{FallbackValue, InvocationError, ResilientInvoker, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub event: String,
    pub recipient_ids: Vec<i64>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub processed: u32,
}

impl FallbackValue for NotificationReceipt {
    fn empty_default() -> Self {
        Self { processed: 0 }
    }

    fn no_op_success() -> Option<Self> {
        Some(Self { processed: 0 })
    }
}

#[async_trait]
pub trait NotificationApi: Send + Sync + Debug {
    async fn send(&self, request: &NotificationRequest) -> Result<NotificationReceipt, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    transport: HttpTransport,
}

impl HttpNotificationApi {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn send(&self, request: &NotificationRequest) -> Result<NotificationReceipt, TransportError> {
        self.transport.post_json("notifications", request).await
    }
}

#[derive(Debug, Clone)]
pub struct NotificationClient {
    invoker: ResilientInvoker,
    api: Arc<dyn NotificationApi>,
}

impl NotificationClient {
    pub fn new(invoker: ResilientInvoker, api: Arc<dyn NotificationApi>) -> Self {
        Self { invoker, api }
    }

    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        request: NotificationRequest,
    ) -> Result<NotificationReceipt, InvocationError> {
        let api = Arc::clone(&self.api);
        let request = Arc::new(request);
        // Every dispatch is distinct; never share an in-flight call
        let key = Uuid::new_v4();

        self.invoker
            .call(ctx, dependencies::NOTIFICATION, key, move || {
                let api = Arc::clone(&api);
                let request = Arc::clone(&request);
                async move { api.send(&request).await }
            })
            .await
    }
}
