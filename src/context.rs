//! # Call Context
//!
//! Explicit per-call context carried through the resilient call chain.
//! Replaces ambient thread-local correlation data: every span and log line
//! emitted on behalf of a call reads its correlation ID from here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Correlation ID propagated from the inbound request (or freshly minted)
    pub correlation_id: Uuid,

    /// Optional label for the business operation issuing the call
    pub operation: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            operation: None,
        }
    }

    pub fn with_correlation_id(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            operation: None,
        }
    }

    pub fn for_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_contexts_get_distinct_ids() {
        assert_ne!(CallContext::new().correlation_id, CallContext::new().correlation_id);
    }

    #[test]
    fn test_correlation_id_is_preserved() {
        let id = Uuid::new_v4();
        let ctx = CallContext::with_correlation_id(id).for_operation("price_recipe");
        assert_eq!(ctx.correlation_id, id);
        assert_eq!(ctx.operation.as_deref(), Some("price_recipe"));
    }
}
