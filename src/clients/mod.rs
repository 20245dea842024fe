//! # Typed Dependency Clients
//!
//! Business-facing wrappers over the recipe backend's outbound services. Each
//! client pairs a raw API trait (one request, transport errors only) with the
//! shared [`ResilientInvoker`](crate::resilience::ResilientInvoker), which adds
//! every resilience behavior.

pub mod notification;
pub mod pricing;
pub mod transport;
pub mod user_directory;

pub use notification::{
    HttpNotificationApi, NotificationApi, NotificationClient, NotificationReceipt,
    NotificationRequest,
};
pub use pricing::{HttpPricingApi, IngredientPrice, PricingApi, PricingClient, RecipePricing};
pub use transport::HttpTransport;
pub use user_directory::{
    HttpUserDirectoryApi, UserDirectoryApi, UserDirectoryClient, Visibility,
    VisibilityPreferences,
};
