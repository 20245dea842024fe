//! # User Directory Client
//!
//! Visibility preferences from the user-management service. These govern who
//! may see a user's recipes and profile, so an outage must never widen
//! access: the fallback marks every field [`Visibility::Private`].

use super::transport::HttpTransport;
use crate::constants::dependencies;
use crate::context::CallContext;
use crate::resilience::{FallbackValue, InvocationError, ResilientInvoker, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Ordered from most to least permissive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    FollowersOnly,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPreferences {
    pub user_id: i64,
    pub profile: Visibility,
    pub recipes: Visibility,
    pub collections: Visibility,
    pub followers: Visibility,
}

impl VisibilityPreferences {
    /// Every field at its most restrictive value
    pub fn all_private(user_id: i64) -> Self {
        Self {
            user_id,
            profile: Visibility::Private,
            recipes: Visibility::Private,
            collections: Visibility::Private,
            followers: Visibility::Private,
        }
    }

    pub fn is_fully_private(&self) -> bool {
        [self.profile, self.recipes, self.collections, self.followers]
            .iter()
            .all(|v| *v == Visibility::Private)
    }
}

impl FallbackValue for VisibilityPreferences {
    fn empty_default() -> Self {
        Self::all_private(0)
    }

    fn restrictive_default() -> Option<Self> {
        Some(Self::all_private(0))
    }
}

#[async_trait]
pub trait UserDirectoryApi: Send + Sync + Debug {
    async fn fetch_visibility_preferences(
        &self,
        user_id: i64,
    ) -> Result<VisibilityPreferences, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpUserDirectoryApi {
    transport: HttpTransport,
}

impl HttpUserDirectoryApi {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl UserDirectoryApi for HttpUserDirectoryApi {
    async fn fetch_visibility_preferences(
        &self,
        user_id: i64,
    ) -> Result<VisibilityPreferences, TransportError> {
        self.transport
            .get_json(&format!("users/{user_id}/preferences/visibility"))
            .await
    }
}

#[derive(Debug, Clone)]
pub struct UserDirectoryClient {
    invoker: ResilientInvoker,
    api: Arc<dyn UserDirectoryApi>,
}

impl UserDirectoryClient {
    pub fn new(invoker: ResilientInvoker, api: Arc<dyn UserDirectoryApi>) -> Self {
        Self { invoker, api }
    }

    pub async fn visibility_preferences(
        &self,
        ctx: &CallContext,
        user_id: i64,
    ) -> Result<VisibilityPreferences, InvocationError> {
        let api = Arc::clone(&self.api);
        let resolved = self
            .invoker
            .call_detailed(ctx, dependencies::USER_DIRECTORY, user_id, move || {
                let api = Arc::clone(&api);
                async move { api.fetch_visibility_preferences(user_id).await }
            })
            .await?;

        let mut preferences = resolved.value;
        if preferences.user_id == 0 {
            preferences.user_id = user_id;
        }
        Ok(preferences)
    }
}
