//! Request-scoped call context threaded through every fabric operation.

use uuid::Uuid;

/// Context for a single request as it moves through the fabric.
///
/// Every envelope is processed under a context; background tasks mint a
/// fresh administrative context per run.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlates log lines across components for one request.
    pub request_id: Uuid,
    /// Administrative contexts may touch the catalog without a tenant.
    pub is_admin: bool,
}

impl RequestContext {
    /// Creates a context for an ordinary caller-initiated request.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            is_admin: false,
        }
    }

    /// Creates an administrative context for background maintenance.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            is_admin: true,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
