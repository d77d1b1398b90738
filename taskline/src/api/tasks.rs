//! Task document CRUD bindings.

use taskline_core::document::{CreateDocument, DocumentList};
use taskline_core::task::{Task, TaskDraft, TaskId, TaskPatch};

use super::{ApiError, Backend, take_json, take_ok};

/// Task store seam.
///
/// The live-feed orchestrator and the CLI are generic over this trait;
/// [`Backend`] is the production implementation.
pub trait TasksApi: Send + Sync {
    /// Create a task; the store assigns id and creation timestamp.
    fn create_task(
        &self,
        draft: &TaskDraft,
    ) -> impl std::future::Future<Output = Result<Task, ApiError>> + Send;

    /// The `limit` most recently created tasks, newest first.
    fn recent_tasks(
        &self,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Every task, newest first.
    fn all_tasks(&self) -> impl std::future::Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Apply a partial update and return the stored result.
    fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, ApiError>> + Send;

    /// Delete a task.
    fn delete_task(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;
}

impl TasksApi for Backend {
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let body = CreateDocument::with_unique_id(draft.clone());
        let response = self
            .decorate(self.http.post(self.api_url(&self.tasks_path())).json(&body))
            .send()
            .await?;
        take_json(response).await
    }

    async fn recent_tasks(&self, limit: usize) -> Result<Vec<Task>, ApiError> {
        self.list_tasks(Some(limit)).await
    }

    async fn all_tasks(&self) -> Result<Vec<Task>, ApiError> {
        self.list_tasks(None).await
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        let body = serde_json::json!({ "data": patch });
        let path = format!("{}/{id}", self.tasks_path());
        let response = self
            .decorate(self.http.patch(self.api_url(&path)).json(&body))
            .send()
            .await?;
        take_json(response).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ApiError> {
        let path = format!("{}/{id}", self.tasks_path());
        let response = self
            .decorate(self.http.delete(self.api_url(&path)))
            .send()
            .await?;
        take_ok(response).await
    }
}

impl Backend {
    /// Shared list call behind the recent/all variants. Always ordered by
    /// creation time descending; `limit: None` fetches everything.
    async fn list_tasks(&self, limit: Option<usize>) -> Result<Vec<Task>, ApiError> {
        let mut request = self
            .http
            .get(self.api_url(&self.tasks_path()))
            .query(&[("order", "desc")]);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit.to_string())]);
        }
        let response = self.decorate(request).send().await?;
        let list: DocumentList<Task> = take_json(response).await?;
        Ok(list.documents)
    }
}
