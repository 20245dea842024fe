//! # Fallback Resolution
//!
//! Supplies a locally computed value when the call path gives up. The strategy
//! is chosen per dependency from a closed set, according to how sensitive the
//! data is:
//!
//! - [`FallbackStrategy::EmptyDefault`]: non-sensitive aggregate data; an empty
//!   or zero value lets the caller continue degraded.
//! - [`FallbackStrategy::RestrictiveDefault`]: privacy-relevant data; the most
//!   restrictive value, so an outage never widens access.
//! - [`FallbackStrategy::NoOpSuccess`]: best-effort side effects; a
//!   success-shaped value reporting that nothing was processed.
//!
//! Value types describe their defaults through [`FallbackValue`]. A type that
//! has no restrictive or no-op shape resolves to its empty default instead.

use super::outcome::{CallKey, DependencyName, FallbackReason};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    #[default]
    EmptyDefault,
    RestrictiveDefault,
    NoOpSuccess,
}

impl FallbackStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackStrategy::EmptyDefault => "empty_default",
            FallbackStrategy::RestrictiveDefault => "restrictive_default",
            FallbackStrategy::NoOpSuccess => "no_op_success",
        }
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default values a type can stand in with when its dependency is unavailable
pub trait FallbackValue: Sized {
    /// The documented empty value; always constructible
    fn empty_default() -> Self;

    /// The most restrictive value, when the type has access semantics
    fn restrictive_default() -> Option<Self> {
        None
    }

    /// A success-shaped value reporting zero work done
    fn no_op_success() -> Option<Self> {
        None
    }
}

/// Stateless strategy dispatch
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackResolver;

impl FallbackResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve<V: FallbackValue>(
        &self,
        dependency: &DependencyName,
        key: &CallKey,
        strategy: FallbackStrategy,
        reason: FallbackReason,
    ) -> V {
        let shaped = match strategy {
            FallbackStrategy::EmptyDefault => return V::empty_default(),
            FallbackStrategy::RestrictiveDefault => V::restrictive_default(),
            FallbackStrategy::NoOpSuccess => V::no_op_success(),
        };

        shaped.unwrap_or_else(|| {
            warn!(
                dependency = %dependency,
                key = %key,
                strategy = %strategy,
                reason = %reason,
                value_type = std::any::type_name::<V>(),
                "Value type has no shaped fallback - using empty default"
            );
            V::empty_default()
        })
    }
}

impl FallbackValue for () {
    fn empty_default() -> Self {}

    fn no_op_success() -> Option<Self> {
        Some(())
    }
}

impl<T> FallbackValue for Option<T> {
    fn empty_default() -> Self {
        None
    }
}

impl<T> FallbackValue for Vec<T> {
    fn empty_default() -> Self {
        Vec::new()
    }

    fn restrictive_default() -> Option<Self> {
        Some(Vec::new())
    }
}

impl<K, V, S: Default> FallbackValue for HashMap<K, V, S> {
    fn empty_default() -> Self {
        HashMap::default()
    }
}

impl<K, V> FallbackValue for BTreeMap<K, V> {
    fn empty_default() -> Self {
        BTreeMap::new()
    }
}

impl FallbackValue for String {
    fn empty_default() -> Self {
        String::new()
    }
}

impl FallbackValue for bool {
    fn empty_default() -> Self {
        false
    }

    /// `false` denies whatever the flag would have granted
    fn restrictive_default() -> Option<Self> {
        Some(false)
    }
}

macro_rules! zero_fallback {
    ($($ty:ty),*) => {
        $(
            impl FallbackValue for $ty {
                fn empty_default() -> Self {
                    0 as $ty
                }
            }
        )*
    };
}

zero_fallback!(u8, u16, u32, u64, usize, i32, i64, f64);
