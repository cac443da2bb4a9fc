use crate::config::PipelineConfig;
use crate::document::Document;
use crate::generation::Generation;
use crate::markup::{error_markup, placeholder_markup};
use crate::reconcile::{PlaceholderReconciler, Reconciliation};
use crate::task::{CreatedTask, InitialStatus, RenderTask, RendererHandle, TaskId, TaskStatus};
use folio_cache::{RenderCache, VisualConfig, canonicalize, digest, source_hash};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;

/// Emitted by [`process_all_with_progress`](AsyncTaskManager::process_all_with_progress)
/// once per task that settled without being cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub id: TaskId,
    /// Tasks settled so far in this batch, this one included.
    pub done: usize,
    /// Tasks drained into this batch.
    pub total: usize,
}

/// What happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// `false` when the batch's generation was aborted before it finished.
    pub completed: bool,
    /// Results painted onto their placeholders.
    pub applied: usize,
    /// Results discarded because the placeholder was gone or now stood for
    /// different content.
    pub rejected: usize,
    /// Tasks that failed and got an error marker (if their placeholder was
    /// still theirs).
    pub errored: usize,
    /// Tasks dropped silently because their generation was cancelled.
    pub abandoned: usize,
    /// Results served from the render cache instead of the renderer.
    pub cache_hits: usize,
    /// Errored tasks whose renderer reported a transient failure; running
    /// the cycle again may render them.
    pub retryable: usize,
}

enum Outcome {
    Rendered { markup: String, cached: bool },
    Errored { message: String, retryable: bool },
    Abandoned,
}

struct State {
    generation: Arc<Generation>,
    queue: Vec<RenderTask>,
    next_sequence: u64,
    visual: Option<VisualConfig>,
}

/// Generation-scoped queue of pending render tasks.
///
/// One render cycle is `reset()`, any number of `create_task()` calls while
/// the document is built, then `process_all()` once the placeholders are in
/// the document. Every task is bound to the [`Generation`] that was current
/// when it was created; `abort()` cancels that generation, so its tasks stop
/// producing side effects at their next checkpoint while a newer cycle's
/// tasks carry on untouched.
///
/// Cycles on one manager must be run one after the other. `abort()` (like
/// every other method) only needs `&self`, so it can be called while a
/// batch is in flight.
pub struct AsyncTaskManager {
    state: Mutex<State>,
    cache: Option<RenderCache>,
    reconciler: PlaceholderReconciler,
    error_label: String,
}

impl AsyncTaskManager {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            state: Mutex::new(State {
                generation: Generation::new(0),
                queue: Vec::new(),
                next_sequence: 0,
                visual: config.visual,
            }),
            cache: None,
            reconciler: PlaceholderReconciler,
            error_label: config.error_label,
        }
    }

    /// Consult (and fill) `cache` before calling renderers.
    pub fn with_cache(mut self, cache: RenderCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Every method leaves the state consistent before it can panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new render cycle: an empty queue and a fresh, uncancelled
    /// generation. Tasks of the previous cycle that are already in flight
    /// keep running; their results are re-validated when applied.
    pub fn reset(&self) {
        let mut state = self.state();
        let epoch = state.generation.epoch() + 1;
        let discarded = state.queue.len();
        state.queue.clear();
        state.generation = Generation::new(epoch);
        tracing::debug!(epoch, discarded, "Render cycle started");
    }

    /// Cancel the current generation and discard its pending tasks.
    ///
    /// Doesn't reach into running work: in-flight tasks observe the
    /// cancellation at their next checkpoint and stop silently.
    pub fn abort(&self) {
        let mut state = self.state();
        state.generation.cancel();
        let discarded = state.queue.len();
        state.queue.clear();
        tracing::debug!(epoch = state.generation.epoch(), discarded, "Render cycle aborted");
    }

    pub fn is_aborted(&self) -> bool {
        self.state().generation.is_cancelled()
    }

    pub fn pending_count(&self) -> usize {
        self.state().queue.len()
    }

    pub fn current_epoch(&self) -> u64 {
        self.state().generation.epoch()
    }

    /// The generation new tasks are currently bound to.
    pub fn generation(&self) -> Arc<Generation> {
        Arc::clone(&self.state().generation)
    }

    /// Change the visual settings folded into cache keys from now on.
    pub fn set_visual_config(&self, visual: Option<VisualConfig>) {
        self.state().visual = visual;
    }

    /// Register a task under the current generation.
    ///
    /// The returned placeholder markup carries the task id and the payload's
    /// source hash; insert it into the document where the artifact belongs.
    pub fn create_task(
        &self,
        kind: impl Into<String>,
        payload: Value,
        renderer: RendererHandle,
        initial: InitialStatus,
    ) -> CreatedTask {
        let kind = kind.into();
        let source_hash = source_hash(&kind, &payload);
        let mut state = self.state();
        let generation = Arc::clone(&state.generation);
        let id = TaskId::new(generation.epoch(), state.next_sequence);
        state.next_sequence += 1;
        let placeholder = placeholder_markup(id.as_str(), &source_hash, &kind);
        let (task, resolver) = RenderTask::new(
            id.clone(),
            kind,
            payload,
            source_hash.clone(),
            renderer,
            Arc::clone(&generation),
            initial,
        );
        tracing::trace!(id = %task.id, kind = task.kind, "Render task registered");
        state.queue.push(task);
        CreatedTask {
            id,
            source_hash,
            placeholder,
            resolver,
            generation,
        }
    }

    /// Run every pending task and apply the results to `document`.
    pub async fn process_all<D: Document>(&self, document: &mut D) -> BatchReport {
        self.process_all_with_progress(document, |_| {}).await
    }

    /// Run every pending task concurrently and apply each result to
    /// `document` as soon as it settles, in completion order.
    ///
    /// `on_progress` is called once per task that wasn't cancelled.
    #[instrument("process render tasks", skip_all)]
    pub async fn process_all_with_progress<D, F>(&self, document: &mut D, mut on_progress: F) -> BatchReport
    where
        D: Document,
        F: FnMut(Progress),
    {
        let (generation, tasks, visual) = {
            let mut state = self.state();
            (Arc::clone(&state.generation), std::mem::take(&mut state.queue), state.visual.clone())
        };
        let total = tasks.len();
        tracing::debug!(epoch = generation.epoch(), total, "Processing render tasks");

        let mut report = BatchReport::default();
        let mut done = 0;
        let mut processing: FuturesUnordered<_> =
            tasks.into_iter().map(|task| self.run(task, visual.as_ref())).collect();
        while let Some((task, outcome)) = processing.next().await {
            // Last checkpoint before the document is touched.
            if task.generation.is_cancelled() {
                tracing::trace!(id = %task.id, "Render task abandoned before applying");
                report.abandoned += 1;
                continue;
            }
            match outcome {
                Outcome::Abandoned => {
                    report.abandoned += 1;
                    continue;
                },
                Outcome::Rendered { markup, cached } => {
                    report.cache_hits += usize::from(cached);
                    match self.apply(document, &task, &markup) {
                        Reconciliation::Applied => report.applied += 1,
                        Reconciliation::Rejected | Reconciliation::Missing => report.rejected += 1,
                    }
                },
                Outcome::Errored { message, retryable } => {
                    report.errored += 1;
                    report.retryable += usize::from(retryable);
                    let markup = error_markup(&self.error_label, &message, &task.kind);
                    self.apply(document, &task, &markup);
                },
            }
            done += 1;
            on_progress(Progress {
                id: task.id.clone(),
                done,
                total,
            });
        }
        report.completed = !generation.is_cancelled();
        tracing::debug!(epoch = generation.epoch(), ?report, "Render tasks processed");
        report
    }

    fn apply<D: Document>(&self, document: &mut D, task: &RenderTask, markup: &str) -> Reconciliation {
        self.reconciler.apply(document, task.id.as_str(), markup, &task.kind, &task.source_hash)
    }

    async fn run(&self, mut task: RenderTask, visual: Option<&VisualConfig>) -> (RenderTask, Outcome) {
        if task.generation.is_cancelled() {
            return (task, Outcome::Abandoned);
        }
        let outcome = match task.settle().await {
            None => Outcome::Abandoned,
            Some(_) if task.generation.is_cancelled() => Outcome::Abandoned,
            Some(TaskStatus::Errored(message)) => Outcome::Errored { message, retryable: false },
            Some(TaskStatus::Ready | TaskStatus::Fetching) => self.render(&task, visual).await,
        };
        (task, outcome)
    }

    async fn render(&self, task: &RenderTask, visual: Option<&VisualConfig>) -> Outcome {
        let cache = self.cache.as_ref().filter(|_| task.renderer.cacheable());
        let key = cache.map(|_| digest(&task.kind, &canonicalize(&task.payload), visual));
        if let (Some(cache), Some(key)) = (cache, &key)
            && let Some(bytes) = cache.get(key).await
        {
            match String::from_utf8(bytes) {
                Ok(markup) => return Outcome::Rendered { markup, cached: true },
                Err(_) => {
                    tracing::warn!(key, kind = task.kind, "Cached render is not valid UTF-8; rendering again");
                    cache.delete(key).await;
                },
            }
        }
        if task.generation.is_cancelled() {
            return Outcome::Abandoned;
        }
        let rendered = tokio::select! {
            biased;
            () = task.generation.cancelled() => return Outcome::Abandoned,
            rendered = task.renderer.render(&task.payload) => rendered,
        };
        match rendered {
            Ok(markup) => {
                if let (Some(cache), Some(key)) = (cache, key)
                    && !task.generation.is_cancelled()
                {
                    cache.set(key, markup.as_bytes(), task.kind.as_str()).await;
                }
                Outcome::Rendered { markup, cached: false }
            },
            Err(e) => {
                let retryable = e.is_retryable();
                tracing::debug!(id = %task.id, kind = task.kind, retryable, error = ?e, "Renderer failed");
                Outcome::Errored { message: (*e).to_string(), retryable }
            },
        }
    }
}

impl Default for AsyncTaskManager {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use crate::error::{ErrorKind, RenderError};
    use crate::task::Renderer;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for Counting {
        async fn render(&self, payload: &Value) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("<svg>{}</svg>", payload["code"].as_str().unwrap_or_default()))
        }
    }

    struct Failing;

    #[async_trait]
    impl Renderer for Failing {
        async fn render(&self, _payload: &Value) -> Result<String, RenderError> {
            exn::bail!(ErrorKind::Render("Parse error on line 1".to_string()))
        }
    }

    struct Offline;

    #[async_trait]
    impl Renderer for Offline {
        async fn render(&self, _payload: &Value) -> Result<String, RenderError> {
            exn::bail!(ErrorKind::Unavailable)
        }
    }

    fn register(
        manager: &AsyncTaskManager,
        doc: &mut MemoryDocument,
        renderer: RendererHandle,
        code: &str,
    ) -> CreatedTask {
        let created = manager.create_task("mermaid", json!({ "code": code }), renderer, InitialStatus::Ready);
        doc.insert_placeholder(created.id.as_str(), &created.source_hash);
        created
    }

    #[tokio::test]
    async fn test_create_task_binds_current_generation() {
        let manager = AsyncTaskManager::default();
        manager.reset();
        let renderer = Arc::new(Counting::default());
        let created = manager.create_task("mermaid", json!({"code": "a"}), renderer, InitialStatus::Ready);
        assert_eq!(created.generation.epoch(), 1);
        assert_eq!(created.source_hash, source_hash("mermaid", &json!({"code": "a"})));
        assert!(created.placeholder.contains(created.id.as_str()));
        assert!(created.resolver.is_none());
        assert_eq!(manager.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_process_all_applies_results() {
        let manager = AsyncTaskManager::default();
        let mut doc = MemoryDocument::new();
        let renderer: RendererHandle = Arc::new(Counting::default());
        register(&manager, &mut doc, renderer.clone(), "a");
        register(&manager, &mut doc, renderer, "b");
        let mut progress = vec![];
        let report = manager.process_all_with_progress(&mut doc, |p| progress.push(p.done)).await;
        assert!(report.completed);
        assert_eq!(report.applied, 2);
        assert_eq!(progress, vec![1, 2]);
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(doc.mutations().len(), 2);
    }

    #[tokio::test]
    async fn test_renderer_failure_renders_error_marker() {
        let manager = AsyncTaskManager::new(PipelineConfig {
            error_label: "Diagram error:".to_string(),
            visual: None,
        });
        let mut doc = MemoryDocument::new();
        let failing = register(&manager, &mut doc, Arc::new(Failing), "a");
        let fine = register(&manager, &mut doc, Arc::new(Counting::default()), "b");
        let report = manager.process_all(&mut doc).await;
        assert_eq!(report.errored, 1);
        assert_eq!(report.retryable, 0);
        assert_eq!(report.applied, 1);
        let failing_node = doc.find_by_id(failing.id.as_str()).unwrap();
        let content = doc.content(failing_node).unwrap();
        assert!(content.contains("<strong>Diagram error:</strong> Parse error on line 1"));
        let fine_node = doc.find_by_id(fine.id.as_str()).unwrap();
        assert_eq!(doc.content(fine_node), Some("<svg>b</svg>"));
    }

    #[tokio::test]
    async fn test_unavailable_renderer_is_reported_as_retryable() {
        let manager = AsyncTaskManager::default();
        let mut doc = MemoryDocument::new();
        let offline = register(&manager, &mut doc, Arc::new(Offline), "a");
        register(&manager, &mut doc, Arc::new(Failing), "b");
        let report = manager.process_all(&mut doc).await;
        assert_eq!(report.errored, 2);
        assert_eq!(report.retryable, 1);
        let node = doc.find_by_id(offline.id.as_str()).unwrap();
        assert!(doc.content(node).unwrap().contains("renderer unavailable"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_renderer() {
        let cache = RenderCache::memory_only(Default::default()).unwrap();
        let manager = AsyncTaskManager::default().with_cache(cache.clone());
        let renderer = Arc::new(Counting::default());

        let mut doc = MemoryDocument::new();
        register(&manager, &mut doc, renderer.clone(), "a");
        let first = manager.process_all(&mut doc).await;
        assert_eq!(first.cache_hits, 0);

        manager.reset();
        let mut doc = MemoryDocument::new();
        register(&manager, &mut doc, renderer.clone(), "a");
        let second = manager.process_all(&mut doc).await;
        assert_eq!(second.cache_hits, 1);
        assert_eq!(second.applied, 1);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(doc.mutations()[0].markup, "<svg>a</svg>");
    }

    #[tokio::test]
    async fn test_visual_config_changes_cache_key() {
        let cache = RenderCache::memory_only(Default::default()).unwrap();
        let manager = AsyncTaskManager::default().with_cache(cache);
        let renderer = Arc::new(Counting::default());
        let mut doc = MemoryDocument::new();
        register(&manager, &mut doc, renderer.clone(), "a");
        manager.process_all(&mut doc).await;

        manager.set_visual_config(Some(VisualConfig::new("Inter", 14.0)));
        manager.reset();
        let mut doc = MemoryDocument::new();
        register(&manager, &mut doc, renderer.clone(), "a");
        let report = manager.process_all(&mut doc).await;
        assert_eq!(report.cache_hits, 0);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abort_discards_queue() {
        let manager = AsyncTaskManager::default();
        let mut doc = MemoryDocument::new();
        register(&manager, &mut doc, Arc::new(Counting::default()), "a");
        manager.abort();
        assert!(manager.is_aborted());
        assert_eq!(manager.pending_count(), 0);
        let report = manager.process_all(&mut doc).await;
        assert!(!report.completed);
        assert!(doc.mutations().is_empty());
        manager.reset();
        assert!(!manager.is_aborted());
        assert_eq!(manager.current_epoch(), 1);
    }
}
