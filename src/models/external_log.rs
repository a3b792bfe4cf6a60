//! Audit record of outbound bank gateway calls.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Maps to the `external_logs` table. Append-only.
///
/// Tracks every gateway call, including the request sent, the response or
/// error received, and how long it took.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExternalLog {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    /// Gateway operation name, e.g. "do_payment"
    pub operation: String,
    pub request: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub latency_ms: i64,
    pub is_success: bool,
    pub created_at: DateTime<Utc>,
}

impl ExternalLog {
    pub fn new(
        job_id: Option<Uuid>,
        operation: &str,
        request: serde_json::Value,
        response: Option<serde_json::Value>,
        latency_ms: i64,
        is_success: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            operation: operation.to_string(),
            request,
            response,
            latency_ms,
            is_success,
            created_at,
        }
    }
}
