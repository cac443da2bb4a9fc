use crate::error::RenderError;
use crate::generation::Generation;
use async_trait::async_trait;
use derive_more::Display;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Produces display markup for a content block.
///
/// Renderers only turn a payload into markup. Caching, cancellation and
/// applying the result to the document are the task manager's business.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, payload: &Value) -> Result<String, RenderError>;

    /// Whether results may be stored in (and served from) the render cache.
    fn cacheable(&self) -> bool {
        true
    }
}

/// Shared handle to a renderer implementation.
pub type RendererHandle = Arc<dyn Renderer>;

/// Opaque placeholder token, unique per task manager.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);
impl TaskId {
    pub(crate) fn new(epoch: u64, sequence: u64) -> Self {
        Self(format!("folio-render-{epoch}-{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// State a task is registered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialStatus {
    /// The payload is complete; the task can render as soon as the batch runs.
    Ready,
    /// Something (a download, a lookup) must finish first; the task waits
    /// for its [`TaskResolver`].
    Fetching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskStatus {
    Ready,
    Fetching,
    Errored(String),
}

type Completion = Result<(), String>;

/// Completion signal for a task registered as [`InitialStatus::Fetching`].
///
/// Consumed by resolving; dropping it unresolved errors the task.
#[derive(Debug)]
pub struct TaskResolver {
    sender: oneshot::Sender<Completion>,
}
impl TaskResolver {
    /// The task can render now.
    pub fn ready(self) {
        // The receiver is gone when the task was already discarded by
        // `abort()` or `reset()`; nobody is waiting for this anymore.
        let _ = self.sender.send(Ok(()));
    }

    /// The task can't render; `message` is shown in its error marker.
    pub fn fail(self, message: impl Into<String>) {
        let _ = self.sender.send(Err(message.into()));
    }
}

/// What [`create_task`](crate::AsyncTaskManager::create_task) hands back to
/// the caller.
#[derive(Debug)]
pub struct CreatedTask {
    pub id: TaskId,
    pub source_hash: String,
    /// Element to insert into the document where the artifact will go.
    pub placeholder: String,
    /// Present for [`InitialStatus::Fetching`] tasks only.
    pub resolver: Option<TaskResolver>,
    /// Generation the task was bound to.
    pub generation: Arc<Generation>,
}

/// A registered render task. Discarded after one batch, whatever happened.
pub(crate) struct RenderTask {
    pub(crate) id: TaskId,
    pub(crate) kind: String,
    pub(crate) payload: Value,
    pub(crate) source_hash: String,
    pub(crate) status: TaskStatus,
    pub(crate) completion: Option<oneshot::Receiver<Completion>>,
    pub(crate) generation: Arc<Generation>,
    pub(crate) renderer: RendererHandle,
}

impl RenderTask {
    pub(crate) fn new(
        id: TaskId,
        kind: String,
        payload: Value,
        source_hash: String,
        renderer: RendererHandle,
        generation: Arc<Generation>,
        initial: InitialStatus,
    ) -> (Self, Option<TaskResolver>) {
        let (status, completion, resolver) = match initial {
            InitialStatus::Ready => (TaskStatus::Ready, None, None),
            InitialStatus::Fetching => {
                let (sender, receiver) = oneshot::channel();
                (TaskStatus::Fetching, Some(receiver), Some(TaskResolver { sender }))
            },
        };
        let task = Self {
            id,
            kind,
            payload,
            source_hash,
            status,
            completion,
            generation,
            renderer,
        };
        (task, resolver)
    }

    /// Wait for a fetching task to be resolved, returning its settled
    /// status, or `None` if the task's generation is cancelled first.
    pub(crate) async fn settle(&mut self) -> Option<TaskStatus> {
        if self.status != TaskStatus::Fetching {
            return Some(self.status.clone());
        }
        let Some(completion) = self.completion.take() else {
            return Some(TaskStatus::Errored("task has no completion signal".to_string()));
        };
        let resolved = tokio::select! {
            biased;
            () = self.generation.cancelled() => return None,
            resolved = completion => resolved,
        };
        self.status = match resolved {
            Ok(Ok(())) => TaskStatus::Ready,
            Ok(Err(message)) => TaskStatus::Errored(message),
            Err(_) => TaskStatus::Errored("fetch was abandoned before completing".to_string()),
        };
        Some(self.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Echo;

    #[async_trait]
    impl Renderer for Echo {
        async fn render(&self, payload: &Value) -> Result<String, RenderError> {
            match payload.get("code").and_then(Value::as_str) {
                Some(code) => Ok(code.to_string()),
                None => exn::bail!(ErrorKind::InvalidPayload("code")),
            }
        }
    }

    fn new_task(initial: InitialStatus) -> (RenderTask, Option<TaskResolver>, Arc<Generation>) {
        let generation = Generation::new(1);
        let (task, resolver) = RenderTask::new(
            TaskId::new(1, 0),
            "mermaid".to_string(),
            serde_json::json!({"code": "graph A-->B"}),
            "hash".to_string(),
            Arc::new(Echo),
            Arc::clone(&generation),
            initial,
        );
        (task, resolver, generation)
    }

    #[test]
    fn test_task_id_format() {
        assert_eq!(TaskId::new(4, 2).as_str(), "folio-render-4-2");
        assert_eq!(TaskId::new(4, 2).to_string(), "folio-render-4-2");
    }

    #[tokio::test]
    async fn test_ready_task_settles_immediately() {
        let (mut task, resolver, _generation) = new_task(InitialStatus::Ready);
        assert!(resolver.is_none());
        assert_eq!(task.settle().await, Some(TaskStatus::Ready));
        assert_eq!(task.renderer.render(&task.payload).await.unwrap(), "graph A-->B");
    }

    #[tokio::test]
    async fn test_resolver_transitions() {
        let (mut task, resolver, _generation) = new_task(InitialStatus::Fetching);
        resolver.unwrap().ready();
        assert_eq!(task.settle().await, Some(TaskStatus::Ready));

        let (mut task, resolver, _generation) = new_task(InitialStatus::Fetching);
        resolver.unwrap().fail("404 Not Found");
        assert_eq!(task.settle().await, Some(TaskStatus::Errored("404 Not Found".to_string())));

        let (mut task, resolver, _generation) = new_task(InitialStatus::Fetching);
        drop(resolver);
        assert!(matches!(task.settle().await, Some(TaskStatus::Errored(_))));
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_pending_fetch() {
        let (mut task, _resolver, generation) = new_task(InitialStatus::Fetching);
        generation.cancel();
        assert_eq!(task.settle().await, None);
    }
}
