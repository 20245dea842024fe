//! # Recipe Pricing Client
//!
//! Ingredient pricing for a recipe, fetched from the pricing scraper. Pricing
//! is non-sensitive aggregate data: when the scraper is unavailable callers
//! get an empty, zero-cost result and keep working with missing prices.

use super::transport::HttpTransport;
use crate::constants::dependencies;
use crate::context::CallContext;
use crate::resilience::{
    FallbackValue, InvocationError, Resolved, ResilientInvoker, TransportError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Price of one ingredient line, in cents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientPrice {
    pub ingredient_id: i64,
    pub name: String,
    pub price_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipePricing {
    pub recipe_id: i64,
    pub ingredients: Vec<IngredientPrice>,
    pub total_cost_cents: u64,
}

impl RecipePricing {
    pub fn is_priced(&self) -> bool {
        !self.ingredients.is_empty()
    }
}

impl FallbackValue for RecipePricing {
    fn empty_default() -> Self {
        Self {
            recipe_id: 0,
            ingredients: Vec::new(),
            total_cost_cents: 0,
        }
    }
}

/// Raw pricing operation; implementations report transport failures only
#[async_trait]
pub trait PricingApi: Send + Sync + Debug {
    async fn fetch_recipe_pricing(&self, recipe_id: i64) -> Result<RecipePricing, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpPricingApi {
    transport: HttpTransport,
}

impl HttpPricingApi {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl PricingApi for HttpPricingApi {
    async fn fetch_recipe_pricing(&self, recipe_id: i64) -> Result<RecipePricing, TransportError> {
        self.transport
            .get_json(&format!("recipes/{recipe_id}/pricing"))
            .await
    }
}

#[derive(Debug, Clone)]
pub struct PricingClient {
    invoker: ResilientInvoker,
    api: Arc<dyn PricingApi>,
}

impl PricingClient {
    pub fn new(invoker: ResilientInvoker, api: Arc<dyn PricingApi>) -> Self {
        Self { invoker, api }
    }

    pub async fn recipe_pricing(
        &self,
        ctx: &CallContext,
        recipe_id: i64,
    ) -> Result<RecipePricing, InvocationError> {
        self.recipe_pricing_detailed(ctx, recipe_id)
            .await
            .map(|resolved| resolved.value)
    }

    /// Pricing plus whether it came from cache, a live call or the fallback
    pub async fn recipe_pricing_detailed(
        &self,
        ctx: &CallContext,
        recipe_id: i64,
    ) -> Result<Resolved<RecipePricing>, InvocationError> {
        let api = Arc::clone(&self.api);
        let mut resolved = self
            .invoker
            .call_detailed(ctx, dependencies::PRICING_SCRAPER, recipe_id, move || {
                let api = Arc::clone(&api);
                async move { api.fetch_recipe_pricing(recipe_id).await }
            })
            .await?;

        if resolved.is_fallback() {
            resolved.value.recipe_id = recipe_id;
        }
        Ok(resolved)
    }
}
