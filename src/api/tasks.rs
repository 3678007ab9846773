//! Crawler task endpoints (read side).
//!
//! The REST listing seeds the monitor's task list; live updates then
//! arrive over the realtime channel and reconcile into the same
//! [`TaskRecord`] shape.

use serde::Deserialize;

use crate::error::ApiError;
use crate::realtime::TaskRecord;
use crate::transport::ApiClient;

/// Optional listing filters.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Status filter (`running` / `completed` / `failed`).
    pub status: Option<String>,
    pub task_id: Option<String>,
}

/// Paged task listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskPage {
    #[serde(default)]
    pub items: Vec<TaskRecord>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
    #[serde(default)]
    pub total_pages: i64,
}

/// List crawler tasks.
pub async fn list(client: &ApiClient, query: &TaskQuery) -> Result<TaskPage, ApiError> {
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(page) = query.page {
        params.push(("page", page.to_string()));
    }
    if let Some(page_size) = query.page_size {
        params.push(("page_size", page_size.to_string()));
    }
    if let Some(status) = &query.status {
        params.push(("status", status.clone()));
    }
    if let Some(task_id) = &query.task_id {
        params.push(("task_id", task_id.clone()));
    }

    let borrowed: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    client.get_with_query("/admin/crawler/tasks", &borrowed).await
}

/// Fetch one task by its `task_id`.
pub async fn get(client: &ApiClient, task_id: &str) -> Result<TaskRecord, ApiError> {
    client.get(&format!("/admin/crawler/tasks/{task_id}")).await
}
