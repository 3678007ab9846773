//! Public telemetry endpoints: visit recording and fingerprint submission.
//!
//! Both are bypass paths: the server reads them in plaintext and they
//! must stay low-latency, so bodies are never wrapped in an envelope
//! even when a key is cached.

use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::transport::ApiClient;

/// A page visit to record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Visit {
    /// Visited URL (required by the server).
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stay_duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Record a visit.
pub async fn record_visit(client: &ApiClient, visit: &Visit) -> Result<(), ApiError> {
    let _: Value = client.post("/visit", visit).await?;
    Ok(())
}

/// Submit a collected browser fingerprint payload.
///
/// The collection heuristics live with the embedding UI; this only ships
/// whatever it produced.
pub async fn submit_fingerprint(client: &ApiClient, payload: &Value) -> Result<(), ApiError> {
    let _: Value = client.post("/fingerprint", payload).await?;
    Ok(())
}
